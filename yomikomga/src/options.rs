//! Réglages d'un mirror Komga

use crate::error::{KomgaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocole de connexion au serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// Réglages modifiables du mirror
///
/// Sérialisés tels quels dans la section `mirrors.komga` de la configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KomgaOptions {
    pub enabled: bool,
    pub cache: bool,
    pub login: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Protocol,
}

impl Default for KomgaOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            cache: true,
            login: None,
            password: None,
            host: None,
            port: None,
            protocol: Protocol::Http,
        }
    }
}

/// Identifiants validés, prêts pour un appel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    pub base_url: String,
}

impl KomgaOptions {
    /// Vérifie que tous les champs requis sont présents et non vides
    pub fn credentials(&self) -> Result<Credentials> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

        let (Some(login), Some(password), Some(host), Some(port)) = (
            non_empty(&self.login),
            non_empty(&self.password),
            non_empty(&self.host),
            self.port,
        ) else {
            return Err(KomgaError::MissingCredentials);
        };

        Ok(Credentials {
            login,
            password,
            base_url: format!("{}://{}:{}/api/v1", self.protocol, host, port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> KomgaOptions {
        KomgaOptions {
            login: Some("admin".into()),
            password: Some("secret".into()),
            host: Some("komga.local".into()),
            port: Some(25600),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentials_build_base_url() {
        let creds = configured().credentials().unwrap();
        assert_eq!(creds.base_url, "http://komga.local:25600/api/v1");
        assert_eq!(creds.login, "admin");

        let https = KomgaOptions {
            protocol: Protocol::Https,
            ..configured()
        };
        assert_eq!(
            https.credentials().unwrap().base_url,
            "https://komga.local:25600/api/v1"
        );
    }

    #[test]
    fn test_missing_or_empty_fields_are_rejected() {
        assert!(KomgaOptions::default().credentials().is_err());

        let empty_login = KomgaOptions {
            login: Some(String::new()),
            ..configured()
        };
        assert!(matches!(
            empty_login.credentials(),
            Err(KomgaError::MissingCredentials)
        ));

        let no_port = KomgaOptions {
            port: None,
            ..configured()
        };
        assert!(no_port.credentials().is_err());
    }

    #[test]
    fn test_protocol_serialization() {
        let value = serde_json::to_value(configured()).unwrap();
        assert_eq!(value["protocol"], "http");
        assert_eq!(value["port"], 25600);
    }
}
