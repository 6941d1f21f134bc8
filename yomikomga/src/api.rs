//! Couche d'accès à l'API REST Komga
//!
//! Ce module fournit une interface bas-niveau pour communiquer avec un serveur
//! Komga (`{protocol}://{host}:{port}/api/v1`) en authentification basique.

use crate::error::{KomgaError, Result};
use crate::options::Credentials;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Délai maximal d'un appel ; un dépassement devient une `FetchError` ordinaire
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Construit le client HTTP partagé par les appels d'un mirror
pub fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("yomi/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Client API bas-niveau pour un serveur Komga
pub struct KomgaApi {
    client: Client,
    credentials: Credentials,
}

/// Image téléchargée
#[derive(Debug, Clone)]
pub struct Image {
    pub url: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl KomgaApi {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// URL absolue d'un chemin de l'API
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    /// Effectue une requête GET JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        debug!("GET {} with {} params", url, params.len());

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.login, Some(&self.credentials.password))
            .query(params)
            .send()
            .await?;
        let text = Self::check_status(response).await?.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse response from {}: {}", url, e);
            KomgaError::JsonParse(e)
        })
    }

    /// Télécharge une image (couverture ou page)
    pub async fn image(&self, path: &str) -> Result<Image> {
        let url = self.url(path);
        debug!("GET {} (image)", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.login, Some(&self.credentials.password))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(Image {
            url,
            content_type,
            bytes,
        })
    }

    /// Traite le statut HTTP
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        debug!("Response status: {}", status);

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        warn!("API error ({}): {}", status.as_u16(), error_text);
        Err(KomgaError::from_status_code(status.as_u16(), error_text))
    }
}
