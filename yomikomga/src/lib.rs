//! # yomikomga - Mirror Komga pour Yomi
//!
//! Cette crate implémente le contrat [`yomisource::Mirror`] pour un serveur
//! [Komga](https://komga.org) auto-hébergé.
//!
//! ## Vue d'ensemble
//!
//! `yomikomga` permet :
//! - La recherche de séries (avec couverture et dernier chapitre paru)
//! - La fiche d'une série et la liste de ses chapitres
//! - Le téléchargement des pages d'un chapitre, une à une
//! - Les recommandations (toutes les séries du serveur)
//! - Retrouver la série d'une URL de chapitre
//!
//! Les images sont déposées dans le cache de fichiers (`yomicache`) ou, si
//! l'option `cache` est désactivée, renvoyées en URL `data:`.
//!
//! ## Structure des modules
//!
//! ```text
//! yomikomga/
//! ├── src/
//! │   ├── lib.rs          # Module principal (ce fichier)
//! │   ├── mirror.rs       # Implémentation de Mirror
//! │   ├── api.rs          # Client HTTP bas-niveau
//! │   ├── models.rs       # Réponses de l'API
//! │   ├── options.rs      # Réglages et identifiants
//! │   ├── urls.rs         # Formes d'URL reconnues
//! │   ├── config_ext.rs   # Intégration yomiconfig
//! │   └── error.rs        # Gestion des erreurs
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use yomikomga::{Komga, KomgaOptions};
//! use yomisource::{run, Mirror, Operation, OperationContext, Request};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = KomgaOptions {
//!         login: Some("admin@example.org".into()),
//!         password: Some("secret".into()),
//!         host: Some("localhost".into()),
//!         port: Some(25600),
//!         ..Default::default()
//!     };
//!     let komga: Arc<dyn Mirror> = Arc::new(Komga::new(options, None)?);
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let ctx = OperationContext::new(1, "komga", Operation::Search, tx, None);
//!     run(komga, Request::Search { query: "berserk".into() }, &ctx).await;
//!
//!     while let Ok(envelope) = rx.try_recv() {
//!         println!("{}", serde_json::to_string(&envelope)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config_ext;
pub mod error;
pub mod mirror;
pub mod models;
pub mod options;
pub mod urls;

pub use config_ext::KomgaConfigExt;
pub use error::{KomgaError, Result};
pub use mirror::{Komga, NAME, WAIT_TIME};
pub use options::{Credentials, KomgaOptions, Protocol};
