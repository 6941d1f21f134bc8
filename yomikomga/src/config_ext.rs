//! Extension pour intégrer la configuration Komga dans yomiconfig
//!
//! Les réglages sont stockés dans la section `mirrors.komga` :
//!
//! ```yaml
//! mirrors:
//!   komga:
//!     enabled: true
//!     cache: true
//!     login: admin@example.org
//!     password: secret
//!     host: komga.local
//!     port: 25600
//!     protocol: http
//! ```

use crate::mirror::{Komga, NAME};
use crate::options::KomgaOptions;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use yomicache::FileServer;
use yomiconfig::Config;
use yomisource::merge_settings;

/// Trait d'extension pour gérer la configuration Komga dans yomiconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use yomiconfig::get_config;
/// use yomikomga::KomgaConfigExt;
///
/// let config = get_config();
/// let options = config.get_komga_options()?;
/// println!("Komga host: {:?}", options.host);
/// ```
pub trait KomgaConfigExt {
    /// Récupère les réglages Komga
    ///
    /// Les clés absentes de la configuration prennent leur valeur par défaut.
    fn get_komga_options(&self) -> Result<KomgaOptions>;

    /// Enregistre les réglages Komga
    fn set_komga_options(&self, options: &KomgaOptions) -> Result<()>;

    /// Crée le mirror Komga à partir de la configuration
    fn create_komga_mirror(&self, files: Option<Arc<FileServer>>) -> Result<Arc<Komga>>;
}

impl KomgaConfigExt for Config {
    fn get_komga_options(&self) -> Result<KomgaOptions> {
        match self.get_mirror_settings(NAME)? {
            Value::Object(map) => Ok(merge_settings(&KomgaOptions::default(), &map)?),
            _ => Ok(KomgaOptions::default()),
        }
    }

    fn set_komga_options(&self, options: &KomgaOptions) -> Result<()> {
        match serde_json::to_value(options)? {
            Value::Object(map) => self.merge_mirror_settings(NAME, &map),
            _ => Ok(()),
        }
    }

    fn create_komga_mirror(&self, files: Option<Arc<FileServer>>) -> Result<Arc<Komga>> {
        let options = self.get_komga_options()?;
        Ok(Arc::new(Komga::new(options, files)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_options_roundtrip_through_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let defaults = config.get_komga_options().unwrap();
        assert!(defaults.enabled);
        assert!(defaults.login.is_none());

        let options = KomgaOptions {
            login: Some("admin".into()),
            password: Some("secret".into()),
            host: Some("komga.local".into()),
            port: Some(25600),
            ..KomgaOptions::default()
        };
        config.set_komga_options(&options).unwrap();

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_komga_options().unwrap(), options);
    }
}
