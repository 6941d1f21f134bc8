//! # yomischeduler
//!
//! Lance les opérations des mirrors en parallèle, une tâche tokio par mirror.
//!
//! Chaque requête d'un client ouvre une portée d'annulation identifiée par
//! `(session, opération, requête)` ; les mirrors reçoivent un jeton enfant de
//! cette portée. En mode headless (préchargement au démarrage), aucune portée
//! n'est créée et les mirrors s'exécutent sans jeton.
//!
//! Chaque mirror termine son propre flux par `done` : le scheduler ne
//! synthétise pas d'événement de fin global.
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new(registry);
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let dispatch = scheduler.search(Origin::session("alice"), 1, "berserk", tx);
//! // plus tard, si le client abandonne
//! scheduler.cancel("alice", Operation::Search, Some(1));
//! dispatch.join().await;
//! ```

mod scope;

pub use scope::ScopeKey;

use futures::future::join_all;
use scope::{ScopeGuard, ScopeTable};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use yomisource::{
    ChapterRequest, Event, Mirror, MirrorRegistry, Operation, OperationContext, Request,
    ResultSink, run,
};

/// Erreurs du scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown mirror: {0}")]
    UnknownMirror(String),

    #[error("mirror {0} is disabled")]
    MirrorDisabled(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Origine d'une requête
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Requête d'un client, annulable
    Session(String),
    /// Tâche interne sans client : pas de portée d'annulation
    Headless,
}

impl Origin {
    pub fn session(id: impl Into<String>) -> Self {
        Origin::Session(id.into())
    }
}

/// Requête en cours d'exécution sur un ou plusieurs mirrors
pub struct Dispatch {
    request_id: u64,
    operation: Operation,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatch {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Nombre de mirrors sollicités
    pub fn mirrors(&self) -> usize {
        self.handles.len()
    }

    /// Attend la fin de toutes les tâches de la requête
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                warn!(request_id = self.request_id, operation = %self.operation, error = %e, "Mirror task failed");
            }
        }
    }
}

pub struct Scheduler {
    registry: Arc<MirrorRegistry>,
    scopes: Arc<ScopeTable>,
}

impl Scheduler {
    pub fn new(registry: Arc<MirrorRegistry>) -> Self {
        Self {
            registry,
            scopes: Arc::new(ScopeTable::default()),
        }
    }

    pub fn registry(&self) -> &Arc<MirrorRegistry> {
        &self.registry
    }

    /// Recherche sur tous les mirrors actifs
    pub fn search(&self, origin: Origin, request_id: u64, query: &str, sink: ResultSink) -> Dispatch {
        let request = Request::Search {
            query: query.to_string(),
        };
        self.dispatch(origin, request_id, self.registry.enabled(), request, sink)
    }

    /// Recommandations de tous les mirrors actifs
    pub fn recommend(&self, origin: Origin, request_id: u64, sink: ResultSink) -> Dispatch {
        self.dispatch(origin, request_id, self.registry.enabled(), Request::Recommend, sink)
    }

    /// Fiche d'une série sur le mirror nommé
    pub fn manga(
        &self,
        origin: Origin,
        request_id: u64,
        mirror: &str,
        url: &str,
        lang: &str,
        sink: ResultSink,
    ) -> Result<Dispatch> {
        let target = self.target(mirror)?;
        let request = Request::Manga {
            url: url.to_string(),
            lang: lang.to_string(),
        };
        Ok(self.dispatch(origin, request_id, vec![target], request, sink))
    }

    /// Pages d'un chapitre sur le mirror nommé
    #[allow(clippy::too_many_arguments)]
    pub fn chapter(
        &self,
        origin: Origin,
        request_id: u64,
        mirror: &str,
        url: &str,
        lang: &str,
        options: ChapterRequest,
        sink: ResultSink,
    ) -> Result<Dispatch> {
        let target = self.target(mirror)?;
        let request = Request::Chapter {
            url: url.to_string(),
            lang: lang.to_string(),
            request: options,
        };
        Ok(self.dispatch(origin, request_id, vec![target], request, sink))
    }

    /// Cherche, sur tous les mirrors actifs, la série d'une URL de chapitre
    pub fn manga_from_chapter_url(
        &self,
        origin: Origin,
        request_id: u64,
        url: &str,
        lang: Option<&str>,
        sink: ResultSink,
    ) -> Dispatch {
        let request = Request::MangaFromChapterUrl {
            url: url.to_string(),
            lang: lang.map(str::to_string),
        };
        self.dispatch(origin, request_id, self.registry.enabled(), request, sink)
    }

    /// Lance `request` sur chacun des mirrors cibles
    pub fn dispatch(
        &self,
        origin: Origin,
        request_id: u64,
        targets: Vec<Arc<dyn Mirror>>,
        request: Request,
        sink: ResultSink,
    ) -> Dispatch {
        let operation = request.operation();

        let (token, guard) = match &origin {
            Origin::Session(session) => {
                let key = ScopeKey {
                    session: session.clone(),
                    operation,
                    request_id,
                };
                let (token, guard) = self.scopes.open(key);
                (Some(token), Some(Arc::new(guard)))
            }
            Origin::Headless => (None, None),
        };

        debug!(request_id, operation = %operation, mirrors = targets.len(), headless = token.is_none(), "Dispatching");

        let handles = targets
            .into_iter()
            .map(|mirror| {
                let ctx = OperationContext::new(
                    request_id,
                    mirror.name(),
                    operation,
                    sink.clone(),
                    token.as_ref().map(|t| t.child_token()),
                );
                let request = request.clone();
                let guard: Option<Arc<ScopeGuard>> = guard.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    run(mirror, request, &ctx).await;
                })
            })
            .collect();

        Dispatch {
            request_id,
            operation,
            handles,
        }
    }

    /// Annule les requêtes d'une session pour une opération
    ///
    /// Sans `request_id`, toutes les requêtes en cours de cette opération sont
    /// annulées. Retourne le nombre de portées annulées.
    pub fn cancel(&self, session: &str, operation: Operation, request_id: Option<u64>) -> usize {
        let count = self.scopes.cancel(session, operation, request_id);
        info!(session = %session, operation = %operation, ?request_id, count, "Cancel requested");
        count
    }

    /// Nombre de portées d'annulation ouvertes
    pub fn active_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Précharge les recommandations de tous les mirrors actifs
    ///
    /// Exécuté en mode headless ; les résultats ne sont destinés à aucun
    /// client et ne servent qu'à remplir le cache. Retourne le nombre de
    /// recommandations reçues.
    pub async fn prewarm_recommendations(&self) -> usize {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatch = self.recommend(Origin::Headless, 0, tx);
        dispatch.join().await;

        let mut received = 0;
        while let Ok(envelope) = rx.try_recv() {
            match envelope.event {
                Event::Recommend(_) => received += 1,
                Event::Error { error, trace } => {
                    warn!(mirror = %envelope.mirror, %error, ?trace, "Prewarm failed");
                }
                _ => {}
            }
        }
        info!(received, "Recommendations prewarmed");
        received
    }

    fn target(&self, name: &str) -> Result<Arc<dyn Mirror>> {
        let mirror = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownMirror(name.to_string()))?;
        if !mirror.is_enabled() {
            return Err(SchedulerError::MirrorDisabled(name.to_string()));
        }
        Ok(mirror)
    }
}
