//! # yomicache - Cache de fichiers à durée de vie limitée
//!
//! Les mirrors téléchargent des images (couvertures, pages de chapitres) qui
//! doivent être exposées au client sous une URL locale. Cette crate dépose ces
//! fichiers dans un répertoire dédié et les supprime automatiquement à
//! l'expiration de leur durée de vie.
//!
//! ## Architecture
//!
//! ```text
//! yomicache
//!     ├── server.rs     - FileServer : écriture, timers d'éviction, lecture
//!     ├── sanitize.rs   - Nettoyage des noms de fichiers
//!     ├── key.rs        - Noms stables dérivés des URLs, types MIME
//!     ├── config_ext.rs - Construction depuis yomiconfig (feature "yomiconfig")
//!     └── router.rs     - Route GET /files/{filename} (feature "server")
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use std::path::Path;
//! use yomicache::{filename_from_url, FileServer};
//!
//! #[tokio::main]
//! async fn main() -> yomicache::Result<()> {
//!     let files = FileServer::new(Some(Path::new("/var/lib/yomi")), "files")?;
//!
//!     let name = filename_from_url("http://komga:25600/api/v1/books/7/pages/1", "jpg");
//!     let handle = files.serve(b"...", &name, None).await;
//!     println!("Servi sous {}", handle);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod key;
pub mod sanitize;
pub mod server;

#[cfg(feature = "yomiconfig")]
pub mod config_ext;

#[cfg(feature = "server")]
pub mod router;

pub use error::{CacheError, Result};
pub use key::{content_type_for, extension_for, filename_from_url};
pub use sanitize::{sanitize_filename, strip_handle_prefix};
pub use server::{FileServer, DEFAULT_LIFETIME};

#[cfg(feature = "yomiconfig")]
pub use config_ext::FileServerConfigExt;

#[cfg(feature = "server")]
pub use router::file_router;
