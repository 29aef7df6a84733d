use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::envelope::Fault;

/// Caps how many operation handlers run at once.
///
/// The permit moves into the blocking task, so a handler that outlives its
/// request deadline keeps counting against the cap until it returns. Excess
/// requests wait for a permit rather than being rejected.
#[derive(Clone)]
pub struct ConcurrencyLimit {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimit {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs `work` on the blocking pool once a permit is free.
    pub async fn run_blocking<F, T>(&self, work: F) -> Result<T, Fault>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.available() == 0 {
            debug!("concurrent request cap reached, waiting for a permit");
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Fault::server("server is shutting down", ""))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|err| {
            error!(error = %err, "operation task failed");
            Fault::server("operation failed", err.to_string())
        })
    }
}
