//! # yomiconfig
//!
//! Configuration YAML de Yomi : où placer le cache de fichiers, combien de
//! temps garder les images, sur quel port les servir, et les réglages de
//! chaque mirror (identifiants Komga notamment).
//!
//! Le document est construit au premier accès à partir du YAML intégré
//! (`yomi.yaml`), complété par `<config_dir>/config.yaml` puis par les
//! variables `YOMI_CONFIG__SECTION__CLE=valeur`. Le résultat fusionné est
//! réécrit sur disque pour que l'utilisateur voie toutes les clés
//! disponibles.
//!
//! Les réglages d'un mirror ne sont jamais remplacés en bloc : un patch ne
//! modifie que les clés qu'il contient.
//!
//! ## Usage
//!
//! ```no_run
//! use yomiconfig::get_config;
//!
//! let config = get_config();
//! let lifetime = config.get_cache_lifetime_secs()?;
//! let komga = config.get_mirror_settings("komga")?;
//!
//! config.set_log_min_level("DEBUG".to_string())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::info;

const DEFAULT_CONFIG: &str = include_str!("yomi.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Yomi configuration"));
}

const ENV_CONFIG_DIR: &str = "YOMI_CONFIG";
const ENV_PREFIX: &str = "YOMI_CONFIG__";
/// Variable d'environnement de repli pour la racine des données utilisateur
pub const ENV_USER_DATA: &str = "YOMI_USER_DATA";

// Valeurs utilisées quand la clé est absente ou mal typée
const DEFAULT_CACHE_FOLDER: &str = "files";
const DEFAULT_CACHE_LIFETIME_SECS: usize = 60 * 60 * 24;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_HTTP_PORT: usize = 4444;

/// Getter/setter d'un entier ; la valeur par défaut couvre les clés absentes
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or_default() as usize),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Getter/setter d'une chaîne ; une chaîne vide vaut la valeur par défaut
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.is_empty() => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Document de configuration partagé par tout le processus
///
/// Chaque écriture (`set_value`, `merge_mirror_settings`, les setters) est
/// immédiatement sauvegardée dans `config.yaml`.
///
/// ```no_run
/// let config = yomiconfig::get_config();
/// let port = config.get_http_port()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Premier répertoire candidat : argument, `YOMI_CONFIG`, `./.yomi`, `~/.yomi`
    ///
    /// `./.yomi` est retenu par défaut quand aucun n'existe encore.
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }
        if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory taken from env");
            return from_env;
        }

        let local = PathBuf::from(".yomi");
        let home = home_dir().map(|home| home.join(".yomi"));
        [Some(local.clone()), home]
            .into_iter()
            .flatten()
            .find(|candidate| candidate.is_dir())
            .unwrap_or(local)
            .to_string_lossy()
            .into_owned()
    }

    /// Crée le répertoire si besoin et vérifie qu'on peut y écrire
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("Le chemin spécifié n'est pas un répertoire"));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Répertoire de configuration retenu, créé et vérifié en écriture
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))
            .map_err(|e| anyhow!("Impossible de valider le répertoire {}: {}", dir_path, e))?;
        Ok(dir_path)
    }

    /// Charge la configuration depuis `directory` (ou le premier candidat si vide)
    ///
    /// YAML intégré, puis `config.yaml`, puis variables d'environnement ; le
    /// document fusionné est réécrit aussitôt.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // Merger avec la config par défaut
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Répertoire contenant `config.yaml`
    pub fn dir(&self) -> &str {
        &self.config_dir
    }

    /// Écrit le document courant dans `config.yaml`
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Écrit une valeur (`&["host", "cache", "folder"]`) puis sauvegarde
    ///
    /// Les sections intermédiaires manquantes sont créées.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Lit la valeur à un chemin de clés ; erreur si une section manque
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Récupère la racine des données utilisateur
    ///
    /// Ordre de résolution : `host.user_data` dans le YAML, puis la variable
    /// d'environnement `YOMI_USER_DATA`. Retourne `None` si aucune n'est
    /// renseignée : le cache de fichiers refuse alors de se construire.
    pub fn get_user_data_dir(&self) -> Option<PathBuf> {
        match self.get_value(&["host", "user_data"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => return Some(PathBuf::from(s)),
            _ => {}
        }
        env::var(ENV_USER_DATA)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Définit la racine des données utilisateur
    pub fn set_user_data_dir(&self, directory: &Path) -> Result<()> {
        self.set_value(
            &["host", "user_data"],
            Value::String(directory.to_string_lossy().to_string()),
        )
    }

    impl_string_config!(
        get_cache_folder,
        set_cache_folder,
        &["host", "cache", "folder"],
        DEFAULT_CACHE_FOLDER
    );

    impl_usize_config!(
        get_cache_lifetime_secs,
        set_cache_lifetime_secs,
        &["host", "cache", "lifetime_secs"],
        DEFAULT_CACHE_LIFETIME_SECS
    );

    impl_usize_config!(
        get_http_port,
        set_http_port,
        &["host", "http_port"],
        DEFAULT_HTTP_PORT
    );

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    /// Récupère les réglages d'un mirror sous forme JSON
    ///
    /// Retourne un objet vide si le mirror n'a jamais été configuré.
    pub fn get_mirror_settings(&self, mirror: &str) -> Result<serde_json::Value> {
        match self.get_value(&["mirrors", mirror]) {
            Ok(value @ Value::Mapping(_)) => Ok(serde_json::to_value(value)?),
            _ => Ok(serde_json::Value::Object(serde_json::Map::new())),
        }
    }

    /// Fusionne un patch dans les réglages d'un mirror
    ///
    /// Seules les clés présentes dans le patch sont écrites, les autres
    /// réglages du mirror sont conservés.
    pub fn merge_mirror_settings(
        &self,
        mirror: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        for (key, value) in patch {
            let yaml: Value = serde_yaml::to_value(value)?;
            Self::set_value_internal(&mut data, &["mirrors", mirror, key.as_str()], yaml)?;
        }
        drop(data);
        self.save()
    }
}

/// Configuration du processus, chargée au premier appel
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Fusion récursive : les sections se complètent, le reste est remplacé
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_are_loaded() {
        let (_dir, config) = temp_config();
        assert_eq!(config.get_cache_folder().unwrap(), "files");
        assert_eq!(config.get_cache_lifetime_secs().unwrap(), 86400);
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
        assert_eq!(config.get_http_port().unwrap(), 4444);
    }

    #[test]
    fn test_config_file_is_written_back() {
        let (dir, _config) = temp_config();
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_external_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "host:\n  cache:\n    lifetime_secs: 60\n",
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get_cache_lifetime_secs().unwrap(), 60);
        // les autres clés par défaut sont toujours là
        assert_eq!(config.get_cache_folder().unwrap(), "files");
    }

    #[test]
    fn test_user_data_from_config() {
        let (dir, config) = temp_config();
        config.set_user_data_dir(dir.path()).unwrap();
        assert_eq!(config.get_user_data_dir(), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_mirror_settings_are_merged() {
        let (_dir, config) = temp_config();

        let mut patch = serde_json::Map::new();
        patch.insert("login".into(), serde_json::json!("admin"));
        patch.insert("port".into(), serde_json::json!(25600));
        config.merge_mirror_settings("komga", &patch).unwrap();

        let settings = config.get_mirror_settings("komga").unwrap();
        assert_eq!(settings["login"], "admin");
        assert_eq!(settings["port"], 25600);
        // non présent dans le patch : conservé
        assert_eq!(settings["protocol"], "http");
        assert_eq!(settings["enabled"], true);
    }

    #[test]
    fn test_unknown_mirror_has_empty_settings() {
        let (_dir, config) = temp_config();
        let settings = config.get_mirror_settings("nope").unwrap();
        assert!(settings.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_env_override_is_applied() {
        env::set_var("YOMI_CONFIG__TESTING__ENV_OVERRIDE", "42");
        let (_dir, config) = temp_config();
        let value = config.get_value(&["testing", "env_override"]).unwrap();
        assert_eq!(value, Value::Number(Number::from(42u64)));
    }

    #[test]
    fn test_get_value_missing_path() {
        let (_dir, config) = temp_config();
        assert!(config.get_value(&["host", "does_not_exist"]).is_err());
    }
}
