//! Table des portées d'annulation
//!
//! Une portée associe `(session, opération, requête)` à un jeton
//! d'annulation. Elle est retirée de la table quand la dernière tâche de la
//! requête se termine, quelle que soit l'issue (fin normale, erreur, panique).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use yomisource::Operation;

/// Clé d'une portée d'annulation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub session: String,
    pub operation: Operation,
    pub request_id: u64,
}

struct Scope {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
pub(crate) struct ScopeTable {
    scopes: Mutex<HashMap<ScopeKey, Scope>>,
    next_id: AtomicU64,
}

impl ScopeTable {
    /// Ouvre une portée
    ///
    /// Une portée encore active pour la même clé est annulée puis remplacée.
    pub(crate) fn open(self: &Arc<Self>, key: ScopeKey) -> (CancellationToken, ScopeGuard) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.scopes.lock().unwrap().insert(
            key.clone(),
            Scope {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(session = %key.session, operation = %key.operation, request_id = key.request_id, "Replacing live scope");
            previous.token.cancel();
        }

        let guard = ScopeGuard {
            table: Arc::clone(self),
            key,
            id,
        };
        (token, guard)
    }

    /// Annule les portées correspondantes, toutes les requêtes si `request_id` est `None`
    pub(crate) fn cancel(&self, session: &str, operation: Operation, request_id: Option<u64>) -> usize {
        let scopes = self.scopes.lock().unwrap();
        let mut count = 0;
        for (key, scope) in scopes.iter() {
            if key.session == session
                && key.operation == operation
                && request_id.is_none_or(|id| id == key.request_id)
            {
                scope.token.cancel();
                count += 1;
            }
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.scopes.lock().unwrap().len()
    }

    fn close(&self, key: &ScopeKey, id: u64) {
        let mut scopes = self.scopes.lock().unwrap();
        // une portée plus récente a pu prendre la même clé
        if scopes.get(key).is_some_and(|scope| scope.id == id) {
            scopes.remove(key);
            debug!(session = %key.session, operation = %key.operation, request_id = key.request_id, "Scope closed");
        }
    }
}

/// Retire la portée de la table à sa destruction
///
/// Partagé via `Arc` entre les tâches d'une même requête.
pub(crate) struct ScopeGuard {
    table: Arc<ScopeTable>,
    key: ScopeKey,
    id: u64,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.table.close(&self.key, self.id);
    }
}
