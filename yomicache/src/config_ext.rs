//! Extension pour construire le serveur de fichiers depuis yomiconfig
//!
//! Ce module fournit le trait `FileServerConfigExt` qui lit dans la
//! configuration la racine des données utilisateur, le sous-répertoire servi
//! et la durée de vie par défaut.

use crate::FileServer;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use yomiconfig::Config;

/// Trait d'extension pour créer un [`FileServer`] configuré
///
/// # Exemple
///
/// ```rust,ignore
/// use yomiconfig::get_config;
/// use yomicache::FileServerConfigExt;
///
/// let config = get_config();
/// let files = config.create_file_server()?;
/// ```
pub trait FileServerConfigExt {
    /// Durée de vie par défaut des fichiers servis
    fn get_file_lifetime(&self) -> Result<Duration>;

    /// Crée le serveur de fichiers à partir de la configuration
    ///
    /// Échoue si aucune racine de données n'est configurée
    /// (`host.user_data` ou `YOMI_USER_DATA`).
    fn create_file_server(&self) -> Result<Arc<FileServer>>;
}

impl FileServerConfigExt for Config {
    fn get_file_lifetime(&self) -> Result<Duration> {
        let secs = self.get_cache_lifetime_secs()?;
        Ok(Duration::from_secs(secs as u64))
    }

    fn create_file_server(&self) -> Result<Arc<FileServer>> {
        let base_dir = self.get_user_data_dir();
        let folder = self.get_cache_folder()?;
        let lifetime = self.get_file_lifetime()?;
        let server = FileServer::with_lifetime(base_dir.as_deref(), &folder, lifetime)?;
        Ok(Arc::new(server))
    }
}
