//! Contexte d'exécution d'une opération de mirror
//!
//! Un [`OperationContext`] lie une opération à sa requête : il sait à qui
//! envoyer les événements et s'il faut s'arrêter. Le jeton d'annulation est
//! absent en mode headless.

use crate::error::{ErrorKind, MirrorError};
use crate::event::{Envelope, Event, Operation};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Canal de résultats partagé par toutes les opérations d'une session
pub type ResultSink = UnboundedSender<Envelope>;

pub struct OperationContext {
    request_id: u64,
    mirror: String,
    operation: Operation,
    sink: ResultSink,
    token: Option<CancellationToken>,
    finished: AtomicBool,
}

impl OperationContext {
    pub fn new(
        request_id: u64,
        mirror: impl Into<String>,
        operation: Operation,
        sink: ResultSink,
        token: Option<CancellationToken>,
    ) -> Self {
        Self {
            request_id,
            mirror: mirror.into(),
            operation,
            sink,
            token,
            finished: AtomicBool::new(false),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn mirror(&self) -> &str {
        &self.mirror
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Vrai en mode headless (aucune annulation possible)
    pub fn is_headless(&self) -> bool {
        self.token.is_none()
    }

    /// Vérifie si le client a abandonné la requête
    ///
    /// À appeler entre deux unités de travail : un appel réseau en cours n'est
    /// jamais interrompu.
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Envoie un événement au client
    ///
    /// Rien n'est envoyé après `done`. Un client déconnecté n'est pas une
    /// erreur pour le mirror. `Event::Done` passe par [`OperationContext::done`].
    pub fn emit(&self, event: Event) {
        if event.is_done() {
            self.done();
            return;
        }
        if self.finished.load(Ordering::Acquire) {
            debug!(mirror = %self.mirror, operation = %self.operation, "Event dropped after done");
            return;
        }
        self.send(event);
    }

    /// Envoie une erreur typée
    pub fn error(&self, kind: ErrorKind, trace: Option<String>) {
        self.emit(Event::Error { error: kind, trace });
    }

    /// Envoie une erreur de mirror avec son message en trace
    pub fn fail(&self, err: &MirrorError) {
        self.error(err.kind(), Some(err.to_string()));
    }

    /// Termine le flux : `done` est émis une seule fois, même en cas d'appels concurrents
    pub fn done(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        self.send(Event::Done);
    }

    fn send(&self, event: Event) {
        let envelope = Envelope {
            request_id: self.request_id,
            mirror: self.mirror.clone(),
            operation: self.operation,
            event,
        };
        if self.sink.send(envelope).is_err() {
            debug!(mirror = %self.mirror, request_id = self.request_id, "Result channel closed");
        }
    }

    pub fn is_done(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("request_id", &self.request_id)
            .field("mirror", &self.mirror)
            .field("operation", &self.operation)
            .field("headless", &self.is_headless())
            .finish()
    }
}
