use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::EngineError;

/// Per-account single-flight registry shared by every trigger path.
///
/// A lease is held for the whole of one run. A second attempt on the same
/// key fails immediately instead of queueing.
#[derive(Clone, Default)]
pub struct RunLeases {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of a run; released on drop.
pub struct RunLease {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl RunLease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: &str) -> Result<RunLease, EngineError> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match lock.try_lock_owned() {
            Ok(guard) => {
                tracing::debug!("Run lease acquired for {}", key);
                Ok(RunLease {
                    key: key.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::warn!("Run already in progress for {}, rejecting", key);
                Err(EngineError::RunInProgress(key.to_string()))
            }
        }
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
