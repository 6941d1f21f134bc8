//! Registre des mirrors disponibles

use crate::descriptor::MirrorInfo;
use crate::error::{MirrorError, Result};
use crate::mirror::Mirror;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Registre des mirrors, indexé par nom
///
/// Enregistrer un mirror sous un nom déjà pris remplace l'ancien.
#[derive(Default)]
pub struct MirrorRegistry {
    mirrors: RwLock<BTreeMap<String, Arc<dyn Mirror>>>,
}

impl MirrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mirror: Arc<dyn Mirror>) {
        let name = mirror.name().to_string();
        info!(mirror = %name, "Registering mirror");
        self.mirrors.write().unwrap().insert(name, mirror);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Mirror>> {
        self.mirrors.read().unwrap().get(name).cloned()
    }

    /// Tous les mirrors, triés par nom
    pub fn list(&self) -> Vec<Arc<dyn Mirror>> {
        self.mirrors.read().unwrap().values().cloned().collect()
    }

    /// Mirrors dont l'option `enabled` est active
    pub fn enabled(&self) -> Vec<Arc<dyn Mirror>> {
        self.list().into_iter().filter(|m| m.is_enabled()).collect()
    }

    pub fn infos(&self) -> Vec<MirrorInfo> {
        self.list().iter().map(|m| m.info()).collect()
    }

    /// Fusionne un patch dans les réglages d'un mirror
    pub fn change_settings(&self, name: &str, patch: &Map<String, Value>) -> Result<()> {
        let mirror = self
            .get(name)
            .ok_or_else(|| MirrorError::UnknownMirror(name.to_string()))?;
        mirror.change_settings(patch)?;
        info!(mirror = %name, keys = patch.len(), "Mirror settings updated");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mirrors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
