//! Taxonomie des erreurs remontées par les mirrors

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Catégorie d'erreur transportée dans les événements envoyés au client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Identifiants requis absents ou vides, aucun appel réseau n'a eu lieu
    CredentialsError,
    /// L'URL ne correspond pas aux formes attendues par le mirror
    InvalidLinkError,
    /// Échec réseau ou de décodage sur un élément ou une page
    FetchError,
    /// Échec non catégorisé (panique de l'adapter, opération inconnue)
    UnknownOperationError,
    /// Écriture dans le cache de fichiers impossible
    CacheWriteError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::CredentialsError => "CredentialsError",
            ErrorKind::InvalidLinkError => "InvalidLinkError",
            ErrorKind::FetchError => "FetchError",
            ErrorKind::UnknownOperationError => "UnknownOperationError",
            ErrorKind::CacheWriteError => "CacheWriteError",
        };
        f.write_str(name)
    }
}

/// Error types for mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("missing credentials: {0}")]
    Credentials(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("cache write failed: {0}")]
    CacheWrite(String),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("unknown mirror: {0}")]
    UnknownMirror(String),

    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Catégorie transmise au client pour cette erreur
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::Credentials(_) => ErrorKind::CredentialsError,
            MirrorError::InvalidLink(_) => ErrorKind::InvalidLinkError,
            MirrorError::Fetch(_) => ErrorKind::FetchError,
            MirrorError::CacheWrite(_) => ErrorKind::CacheWriteError,
            MirrorError::Settings(_) | MirrorError::UnknownMirror(_) | MirrorError::Other(_) => {
                ErrorKind::UnknownOperationError
            }
        }
    }
}
