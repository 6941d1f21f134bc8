//! Contrat des mirrors et exécution protégée de leurs opérations

use crate::context::OperationContext;
use crate::descriptor::{MirrorDescriptor, MirrorInfo, MirrorOptions};
use crate::error::{ErrorKind, Result};
use crate::event::Operation;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Rappel invoqué avec le nombre de pages attendues, avant le premier téléchargement
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Paramètres optionnels du téléchargement d'un chapitre
#[derive(Clone, Default)]
pub struct ChapterRequest {
    /// Ne télécharger que cette page (index à partir de 0)
    pub retry_index: Option<usize>,
    pub progress: Option<ProgressCallback>,
}

impl ChapterRequest {
    pub fn retry(index: usize) -> Self {
        Self {
            retry_index: Some(index),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }
}

impl std::fmt::Debug for ChapterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterRequest")
            .field("retry_index", &self.retry_index)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Main trait for mirrors
///
/// Un mirror traduit les opérations uniformes en appels vers une API externe.
/// Les opérations n'ont pas de valeur de retour : tout passe par le contexte
/// (résultats, erreurs typées, `done`). Chaque opération est une frontière
/// d'erreur : aucune erreur ne doit s'en échapper.
///
/// # Contrat
///
/// - Les identifiants sont vérifiés avant tout appel réseau (`CredentialsError`).
/// - `manga` et `chapter` refusent les URLs de la mauvaise forme
///   (`InvalidLinkError`) sans appel réseau.
/// - `search`, `recommend` et `chapter` se terminent toujours par `done` et
///   s'arrêtent sans erreur quand l'annulation est observée entre deux éléments.
/// - `manga` et `manga_from_chapter_url` émettent au plus un événement, sans
///   `done`. Un `manga` annulé n'émet rien : le client a déjà abandonné la
///   requête.
#[async_trait]
pub trait Mirror: Send + Sync {
    fn descriptor(&self) -> &MirrorDescriptor;

    /// Réglages communs (activation, cache)
    fn options(&self) -> MirrorOptions;

    /// Tous les réglages du mirror, identifiants compris
    fn settings(&self) -> Value;

    /// Fusionne un patch dans les réglages : les clés absentes sont conservées
    fn change_settings(&self, patch: &Map<String, Value>) -> Result<()>;

    fn is_manga_page(&self, url: &str) -> bool;

    fn is_chapter_page(&self, url: &str) -> bool;

    async fn search(&self, query: &str, ctx: &OperationContext);

    async fn manga(&self, url: &str, lang: &str, ctx: &OperationContext);

    async fn chapter(&self, url: &str, lang: &str, request: ChapterRequest, ctx: &OperationContext);

    async fn recommend(&self, ctx: &OperationContext);

    async fn manga_from_chapter_url(&self, url: &str, lang: Option<&str>, ctx: &OperationContext);

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn info(&self) -> MirrorInfo {
        self.descriptor().info()
    }

    fn is_enabled(&self) -> bool {
        self.options().enabled
    }
}

/// Opération à exécuter sur un mirror, avec ses arguments
#[derive(Debug, Clone)]
pub enum Request {
    Search { query: String },
    Manga { url: String, lang: String },
    Chapter {
        url: String,
        lang: String,
        request: ChapterRequest,
    },
    Recommend,
    MangaFromChapterUrl { url: String, lang: Option<String> },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::Search { .. } => Operation::Search,
            Request::Manga { .. } => Operation::Manga,
            Request::Chapter { .. } => Operation::Chapter,
            Request::Recommend => Operation::Recommend,
            Request::MangaFromChapterUrl { .. } => Operation::MangaFromChapterUrl,
        }
    }
}

/// Exécute une opération sur un mirror en garantissant le contrat de flux
///
/// Une panique de l'adapter est rapportée comme `UnknownOperationError` ; les
/// opérations en flux reçoivent toujours leur `done`, même après une panique.
pub async fn run(mirror: Arc<dyn Mirror>, request: Request, ctx: &OperationContext) {
    let operation = request.operation();
    debug!(mirror = %mirror.name(), operation = %operation, request_id = ctx.request_id(), "Running operation");

    let call = async {
        match &request {
            Request::Search { query } => mirror.search(query, ctx).await,
            Request::Manga { url, lang } => mirror.manga(url, lang, ctx).await,
            Request::Chapter { url, lang, request } => {
                mirror.chapter(url, lang, request.clone(), ctx).await
            }
            Request::Recommend => mirror.recommend(ctx).await,
            Request::MangaFromChapterUrl { url, lang } => {
                mirror.manga_from_chapter_url(url, lang.as_deref(), ctx).await
            }
        }
    };

    if let Err(panic) = AssertUnwindSafe(call).catch_unwind().await {
        let trace = panic_message(panic.as_ref());
        error!(mirror = %mirror.name(), operation = %operation, trace = ?trace, "Mirror operation panicked");
        ctx.error(ErrorKind::UnknownOperationError, trace);
    }

    if operation.is_streamed() {
        ctx.done();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = panic.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        panic.downcast_ref::<String>().cloned()
    }
}
