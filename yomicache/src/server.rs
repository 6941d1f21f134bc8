//! Serveur de fichiers à durée de vie limitée
//!
//! Un [`FileServer`] possède un répertoire (`<base>/.cache/<folder>`) et y
//! dépose les binaires téléchargés par les mirrors. Chaque fichier est exposé
//! sous un handle `/files/<filename>` et supprimé à l'expiration de son timer.
//!
//! Le registre des timers n'est jamais persisté : à la construction, le
//! répertoire est vidé de ses fichiers réguliers pour repartir d'un état
//! cohérent après un arrêt brutal.
//!
//! Les accès disque passent par `tokio::fs`. Seule la construction, appelée
//! une fois au démarrage, travaille de façon synchrone.

use crate::error::{CacheError, Result};
use crate::sanitize::{sanitize_filename, strip_handle_prefix};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Durée de vie par défaut d'un fichier servi (24 heures)
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24);

/// Timer d'éviction d'un fichier
struct Timer {
    id: u64,
    deadline: Instant,
    handle: AbortHandle,
}

struct Inner {
    folder: PathBuf,
    default_lifetime: Duration,
    runtime: Handle,
    /// Au plus un timer par nom de fichier
    timers: Mutex<HashMap<String, Timer>>,
    /// Verrou par nom de fichier : serve/renew/delete/expire sont sérialisés par fichier
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    next_timer_id: AtomicU64,
}

/// Cache de fichiers TTL exposant des handles `/files/<filename>`
///
/// Une instance gère un seul répertoire, pour toute la durée du processus.
/// Elle est construite explicitement au démarrage puis partagée via `Arc`.
///
/// # Exemple
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::time::Duration;
/// use yomicache::FileServer;
///
/// # async fn example() -> yomicache::Result<()> {
/// let server = FileServer::new(Some(Path::new("/var/lib/yomi")), "files")?;
/// let handle = server.serve(b"...", "cover.png", None).await;
/// assert_eq!(handle, "/files/cover.png");
///
/// server.renew("cover.png", Some(Duration::from_secs(60))).await;
/// let bytes = server.get(&handle).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FileServer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileServer")
            .field("folder", &self.inner.folder)
            .field("default_lifetime", &self.inner.default_lifetime)
            .finish()
    }
}

impl FileServer {
    /// Crée le serveur de fichiers avec la durée de vie par défaut (24h)
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Racine des données utilisateur ; `None` ou vide est refusé
    /// * `folder` - Sous-répertoire servi, relatif à `<base_dir>/.cache`
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingBaseDir`] avant tout accès disque si `base_dir` est absent
    /// - [`CacheError::NoRuntime`] hors d'un runtime tokio
    /// - [`CacheError::Setup`] si le répertoire ne peut pas être créé
    pub fn new(base_dir: Option<&Path>, folder: &str) -> Result<Self> {
        Self::with_lifetime(base_dir, folder, DEFAULT_LIFETIME)
    }

    /// Crée le serveur de fichiers avec une durée de vie par défaut spécifique
    pub fn with_lifetime(
        base_dir: Option<&Path>,
        folder: &str,
        default_lifetime: Duration,
    ) -> Result<Self> {
        let base_dir = match base_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => return Err(CacheError::MissingBaseDir),
        };
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let folder = base_dir.join(".cache").join(folder);
        let inner = Arc::new(Inner {
            folder,
            default_lifetime,
            runtime,
            timers: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(0),
        });

        inner.setup()?;
        inner.empty();

        Ok(Self { inner })
    }

    /// Répertoire servi
    pub fn folder(&self) -> &Path {
        &self.inner.folder
    }

    /// Durée de vie appliquée quand aucune n'est précisée
    pub fn default_lifetime(&self) -> Duration {
        self.inner.default_lifetime
    }

    /// Handle public d'un nom de fichier
    pub fn handle_for(filename: &str) -> String {
        format!("/files/{}", filename)
    }

    /// Sert des données sous un nom de fichier
    ///
    /// Si le fichier existe déjà, seul son timer est réarmé (le contenu n'est
    /// pas réécrit : le nom est une clé stable pour un contenu identique).
    /// Sinon les données sont écrites et un timer est programmé.
    ///
    /// Le handle est toujours retourné, même si l'écriture échoue : l'échec
    /// est journalisé comme `CacheWriteError` pour ne pas interrompre le flux
    /// de résultats. Utiliser [`FileServer::try_serve`] pour l'observer.
    pub async fn serve(&self, data: &[u8], filename: &str, lifetime: Option<Duration>) -> String {
        match self.try_serve(data, filename, lifetime).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(filename = %filename, error = %e, "CacheWriteError, returning handle anyway");
                Self::handle_for(&sanitize_filename(filename))
            }
        }
    }

    /// Variante de [`FileServer::serve`] qui remonte les erreurs d'écriture
    pub async fn try_serve(
        &self,
        data: &[u8],
        filename: &str,
        lifetime: Option<Duration>,
    ) -> Result<String> {
        let key = sanitize_filename(filename);
        if key.is_empty() {
            return Err(CacheError::InvalidFilename(filename.to_string()));
        }
        let lifetime = lifetime.unwrap_or(self.inner.default_lifetime);

        let _lock = self.inner.lock_key(&key).await;
        let path = self.inner.folder.join(&key);
        if is_file(&path).await {
            debug!(filename = %key, "File already served, renewing its lifetime");
        } else {
            self.inner.write_file(&key, &path, data).await?;
        }
        self.inner.arm_timer(&key, lifetime);
        Ok(Self::handle_for(&key))
    }

    /// Réarme le timer d'un fichier sans toucher à son contenu
    ///
    /// Retourne `false` si le fichier n'existe pas ; un éventuel timer
    /// orphelin pour ce nom est alors supprimé.
    pub async fn renew(&self, filename: &str, lifetime: Option<Duration>) -> bool {
        let key = sanitize_filename(strip_handle_prefix(filename));
        if key.is_empty() {
            return false;
        }
        let lifetime = lifetime.unwrap_or(self.inner.default_lifetime);

        let _lock = self.inner.lock_key(&key).await;
        if is_file(&self.inner.folder.join(&key)).await {
            self.inner.arm_timer(&key, lifetime);
            true
        } else {
            self.inner.disarm_timer(&key);
            false
        }
    }

    /// Supprime un fichier et son timer
    ///
    /// Retourne `true` si un fichier a effectivement été supprimé. Un fichier
    /// déjà absent n'est pas une erreur.
    pub async fn delete(&self, filename: &str) -> bool {
        let key = sanitize_filename(strip_handle_prefix(filename));
        if key.is_empty() {
            return false;
        }
        let _lock = self.inner.lock_key(&key).await;
        self.inner.disarm_timer(&key);
        self.inner.remove_file(&key).await
    }

    /// Lit un fichier servi
    ///
    /// Accepte un nom nu, un handle `/files/x` ou une URL complète. Le nom est
    /// nettoyé avant d'être résolu dans le répertoire servi ; l'absence est
    /// signalée par `None`.
    pub async fn get(&self, filename: &str) -> Option<Vec<u8>> {
        let key = sanitize_filename(strip_handle_prefix(filename));
        if key.is_empty() {
            return None;
        }
        let path = self.inner.folder.join(&key);
        if !is_file(&path).await {
            return None;
        }
        tokio::fs::read(&path).await.ok()
    }

    /// Nombre de timers actifs
    pub fn timer_count(&self) -> usize {
        lock(&self.inner.timers).len()
    }

    /// Échéance du timer d'un fichier, s'il en a un
    pub fn expires_at(&self, filename: &str) -> Option<Instant> {
        let key = sanitize_filename(strip_handle_prefix(filename));
        lock(&self.inner.timers).get(&key).map(|t| t.deadline)
    }
}

impl Inner {
    fn setup(&self) -> Result<()> {
        fs::create_dir_all(&self.folder).map_err(|source| CacheError::Setup {
            path: self.folder.clone(),
            source,
        })
    }

    /// Vide le répertoire servi de ses fichiers réguliers (les liens symboliques sont conservés)
    fn empty(&self) {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(folder = %self.folder.display(), error = %e, "Cannot list cache folder");
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if meta.file_type().is_symlink() || !meta.is_file() {
                continue;
            }
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        info!(folder = %self.folder.display(), removed, "Cache folder emptied");
    }

    /// Prend le verrou propre à `key`
    ///
    /// L'entrée de la table est retirée à la libération si personne d'autre
    /// n'attend ce verrou.
    async fn lock_key(&self, key: &str) -> KeyLock<'_> {
        let slot = lock(&self.locks)
            .entry(key.to_string())
            .or_default()
            .clone();
        let guard = slot.clone().lock_owned().await;
        KeyLock {
            inner: self,
            key: key.to_string(),
            slot,
            guard: Some(guard),
        }
    }

    async fn write_file(&self, key: &str, path: &Path, data: &[u8]) -> Result<()> {
        // écriture dans un fichier temporaire puis renommage : pas de fichier à moitié écrit
        let partial = self.folder.join(format!(".{}.part", key));
        let written = match tokio::fs::write(&partial, data).await {
            Ok(()) => tokio::fs::rename(&partial, path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(CacheError::Write {
                filename: key.to_string(),
                source,
            });
        }
        debug!(filename = %key, bytes = data.len(), "File written to cache");
        Ok(())
    }

    /// Remplace le timer de `key` ; l'ancien est annulé avant d'armer le nouveau
    ///
    /// L'échéance est fixée ici, pas au premier réveil de la tâche.
    fn arm_timer(self: &Arc<Self>, key: &str, lifetime: Duration) {
        let deadline = Instant::now() + lifetime;
        let mut timers = lock(&self.timers);
        if let Some(previous) = timers.remove(key) {
            previous.handle.abort();
        }

        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(self);
        let name = key.to_string();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&name, id).await;
            }
        });

        timers.insert(
            key.to_string(),
            Timer {
                id,
                deadline,
                handle: task.abort_handle(),
            },
        );
    }

    fn disarm_timer(&self, key: &str) {
        if let Some(timer) = lock(&self.timers).remove(key) {
            timer.handle.abort();
        }
    }

    /// Appelé par un timer arrivé à échéance
    async fn expire(&self, key: &str, id: u64) {
        let _lock = self.lock_key(key).await;
        {
            let mut timers = lock(&self.timers);
            match timers.get(key) {
                Some(timer) if timer.id == id => {
                    timers.remove(key);
                }
                // timer réarmé ou supprimé entre-temps
                _ => return,
            }
        }
        info!(filename = %key, "File's lifetime reached, removing");
        self.remove_file(key).await;
    }

    async fn remove_file(&self, key: &str) -> bool {
        match tokio::fs::remove_file(self.folder.join(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(filename = %key, error = %e, "Cannot remove cached file");
                false
            }
        }
    }
}

/// Verrou d'un nom de fichier, tenu pendant une opération
struct KeyLock<'a> {
    inner: &'a Inner,
    key: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = lock(&self.inner.locks);
        // la table et `slot` : plus aucun autre détenteur ni attente
        if Arc::strong_count(&self.slot) == 2 {
            locks.remove(&self.key);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
