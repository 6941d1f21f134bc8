//! Erreurs du cache de fichiers

use std::path::PathBuf;
use thiserror::Error;

/// Type Result personnalisé pour yomicache
pub type Result<T> = std::result::Result<T, CacheError>;

/// Erreurs possibles du cache de fichiers
#[derive(Error, Debug)]
pub enum CacheError {
    /// Aucun répertoire de base n'a été configuré
    #[error("no base directory configured for the file cache")]
    MissingBaseDir,

    /// Construction hors d'un runtime tokio (les timers d'éviction en ont besoin)
    #[error("the file cache must be created from within a tokio runtime")]
    NoRuntime,

    /// Le répertoire servi n'a pas pu être préparé
    #[error("cannot prepare cache directory {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nom de fichier vide une fois nettoyé
    #[error("invalid cache filename: {0:?}")]
    InvalidFilename(String),

    /// Écriture du fichier impossible
    #[error("cannot write cached file {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}
