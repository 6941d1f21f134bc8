//! Identité et réglages d'un mirror

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Notes indicatives d'un mirror (affichées par le client)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MirrorMeta {
    pub speed: f32,
    pub quality: f32,
    pub popularity: f32,
}

/// Identité immuable d'un mirror
#[derive(Debug, Clone)]
pub struct MirrorDescriptor {
    /// Identifiant unique, préfixe de tous les ids émis par le mirror
    pub name: String,
    pub display_name: String,
    /// Langues supportées ; la première sert de langue par défaut
    pub langs: Vec<String>,
    /// Délai minimal entre le début de deux appels sortants
    pub wait_time: Duration,
    pub meta: MirrorMeta,
}

impl MirrorDescriptor {
    /// Vue publique embarquée dans les résultats
    pub fn info(&self) -> MirrorInfo {
        MirrorInfo {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            langs: self.langs.clone(),
            meta: self.meta,
        }
    }

    /// Langue par défaut du mirror
    pub fn default_lang(&self) -> &str {
        self.langs.first().map(String::as_str).unwrap_or(DEFAULT_LANG)
    }
}

/// Langue utilisée quand la source n'en déclare aucune
pub const DEFAULT_LANG: &str = "xx";

/// Informations du mirror jointes à chaque résultat de recherche
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorInfo {
    pub name: String,
    pub display_name: String,
    pub langs: Vec<String>,
    pub meta: MirrorMeta,
}

/// Réglages communs à tous les mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorOptions {
    pub enabled: bool,
    /// Les images passent par le cache de fichiers (sinon elles sont inlinées)
    pub cache: bool,
}

/// Fusionne un patch dans des réglages typés
///
/// Les clés présentes dans le patch écrasent les valeurs courantes, les autres
/// sont conservées. Échoue si le résultat ne respecte plus le type `T`.
pub fn merge_settings<T>(current: &T, patch: &Map<String, Value>) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(current)?;
    if let Value::Object(map) = &mut value {
        for (key, v) in patch {
            map.insert(key.clone(), v.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Construit l'identifiant `mirror/lang/path` d'une série
pub fn qualified_id(mirror: &str, lang: &str, path: &str) -> String {
    format!("{}/{}{}", mirror, lang, path)
}

/// Normalise une langue vide en [`DEFAULT_LANG`]
pub fn lang_or_default(lang: Option<&str>) -> String {
    match lang {
        Some(l) if !l.is_empty() => l.to_string(),
        _ => DEFAULT_LANG.to_string(),
    }
}
