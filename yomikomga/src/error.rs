//! Gestion des erreurs pour le mirror Komga

use thiserror::Error;
use yomisource::MirrorError;

/// Type Result personnalisé pour yomikomga
pub type Result<T> = std::result::Result<T, KomgaError>;

/// Erreurs possibles lors des appels à un serveur Komga
#[derive(Error, Debug)]
pub enum KomgaError {
    /// Login, mot de passe, hôte ou port absent
    #[error("no credentials")]
    MissingCredentials,

    /// URL qui ne correspond à aucune forme connue
    #[error("not a Komga {expected} page: {url}")]
    InvalidLink { expected: &'static str, url: String },

    /// Identifiants refusés par le serveur
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Ressource non trouvée (série, livre, page)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Erreur HTTP
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Erreur de l'API Komga
    #[error("Komga API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// Image téléchargée mais non déposée dans le cache de fichiers
    #[error("Cache error: {0}")]
    Cache(#[from] yomicache::CacheError),
}

impl KomgaError {
    /// Crée une erreur API depuis un code de statut HTTP et un message
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }
}

impl From<KomgaError> for MirrorError {
    fn from(err: KomgaError) -> Self {
        match err {
            KomgaError::MissingCredentials => MirrorError::Credentials(err.to_string()),
            KomgaError::InvalidLink { .. } => MirrorError::InvalidLink(err.to_string()),
            KomgaError::Cache(_) => MirrorError::CacheWrite(err.to_string()),
            other => MirrorError::Fetch(other.to_string()),
        }
    }
}
