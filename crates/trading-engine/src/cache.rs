use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    /// When the load that produced `value` started.
    loaded_at: Instant,
}

/// Single-value cache with a time-to-live and single-flight refresh.
///
/// Concurrent callers that find the cache cold or expired queue on one
/// refresh lock; the first runs the loader and the rest reuse its value.
pub struct TtlCache<T> {
    ttl: Duration,
    entry: RwLock<Option<Entry<T>>>,
    refresh: Mutex<()>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// The cached value if it has not expired.
    pub async fn get(&self) -> Option<T> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }

    /// Return the cached value, or run `loader` to repopulate it.
    ///
    /// With `force` the cached value is ignored unless a load started after
    /// this call was made. Loader errors are returned and leave the previous
    /// entry in place.
    pub async fn get_or_refresh<F, Fut, E>(&self, force: bool, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let requested_at = Instant::now();

        if !force {
            if let Some(value) = self.get().await {
                return Ok(value);
            }
        }

        let _refresh = self.refresh.lock().await;

        // Another caller may have refreshed while this one waited on the lock.
        {
            let entry = self.entry.read().await;
            if let Some(e) = entry.as_ref() {
                let usable = if force {
                    e.loaded_at >= requested_at
                } else {
                    e.loaded_at.elapsed() < self.ttl
                };
                if usable {
                    return Ok(e.value.clone());
                }
            }
        }

        let loaded_at = Instant::now();
        let value = loader().await?;
        *self.entry.write().await = Some(Entry {
            value: value.clone(),
            loaded_at,
        });
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn slow_load(calls: Arc<AtomicUsize>) -> Result<usize, String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test]
    async fn concurrent_cold_reads_load_once() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move { cache.get_or_refresh(false, || slow_load(calls)).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_value_is_reused_until_forced() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_refresh(false, || slow_load(calls.clone())).await, Ok(1));
        assert_eq!(cache.get_or_refresh(false, || slow_load(calls.clone())).await, Ok(1));
        assert_eq!(cache.get_or_refresh(true, || slow_load(calls.clone())).await, Ok(2));
        assert_eq!(cache.get().await, Some(2));
    }

    #[tokio::test]
    async fn expired_value_is_reloaded() {
        let cache = TtlCache::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_refresh(false, || slow_load(calls.clone())).await.unwrap();
        cache.get_or_refresh(false, || slow_load(calls.clone())).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn loader_error_keeps_previous_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache
            .get_or_refresh(false, || async { Ok::<_, String>(7) })
            .await
            .unwrap();

        let err = cache
            .get_or_refresh(true, || async { Err::<u32, _>("boom".to_string()) })
            .await;

        assert_eq!(err, Err("boom".to_string()));
        assert_eq!(cache.get().await, Some(7));
    }

    #[tokio::test]
    async fn invalidate_clears_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache
            .get_or_refresh(false, || async { Ok::<_, String>(1) })
            .await
            .unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }
}
