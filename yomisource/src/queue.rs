//! File d'attente à débit limité, une par mirror
//!
//! Les appels sortants d'un mirror démarrent dans l'ordre de soumission, en
//! respectant un délai minimal entre deux démarrages. Le mutex tokio étant
//! équitable, l'ordre d'acquisition est l'ordre d'arrivée.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
pub struct RateLimitedQueue {
    wait_time: Duration,
    /// Début du dernier appel dispatché
    last_start: Mutex<Option<Instant>>,
}

impl RateLimitedQueue {
    /// Crée une file ; `wait_time` nul désactive l'espacement (l'ordre FIFO reste garanti)
    pub fn new(wait_time: Duration) -> Self {
        Self {
            wait_time,
            last_start: Mutex::new(None),
        }
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Attend son tour puis exécute `call`, dont le résultat est retourné tel quel
    ///
    /// Seul le démarrage est sérialisé : l'appel lui-même s'exécute hors du
    /// verrou, un appel lent ou en échec ne bloque donc pas les suivants
    /// au-delà de l'espacement.
    pub async fn enqueue<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        {
            let mut last_start = self.last_start.lock().await;
            if let Some(previous) = *last_start {
                let slot = previous + self.wait_time;
                if slot > Instant::now() {
                    trace!(wait_ms = (slot - Instant::now()).as_millis() as u64, "Waiting for queue slot");
                    tokio::time::sleep_until(slot).await;
                }
            }
            *last_start = Some(Instant::now());
        }
        call().await
    }
}
