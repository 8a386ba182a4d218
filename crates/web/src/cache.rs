//! Short-lived cache of the raw sheet export so page views don't refetch.
//! Reports are always rebuilt from the body; only the fetch is cached.

use std::time::Duration;

use common::error::{LedgerError, LedgerResult};
use common::sheet::CsvSource;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Cached,
    Live,
}

struct CachedBody {
    body: String,
    fetched_at: Instant,
    /// Set once a page view has rendered this body.
    shown: bool,
}

#[derive(Default)]
struct CacheState {
    body: Option<CachedBody>,
    /// Failure of the last forced refresh, held until one page view reports it.
    refresh_error: Option<LedgerError>,
}

pub struct FetchCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return the cached body while it is younger than the TTL, otherwise fetch.
    /// `force` skips the cache and sends a cache-busting nonce upstream.
    ///
    /// After a forced refresh the next page view gets its outcome: the
    /// fetched body reported as live, or the fetch error.
    pub async fn get_or_fetch<S: CsvSource + Sync>(
        &self,
        source: &S,
        force: bool,
    ) -> LedgerResult<(String, Freshness)> {
        let mut state = self.state.lock().await;

        if force {
            state.refresh_error = None;
        } else {
            if let Some(err) = state.refresh_error.take() {
                return Err(err);
            }
            if let Some(cached) = state.body.as_mut() {
                if cached.fetched_at.elapsed() < self.ttl {
                    let freshness = if cached.shown {
                        Freshness::Cached
                    } else {
                        Freshness::Live
                    };
                    cached.shown = true;
                    return Ok((cached.body.clone(), freshness));
                }
            }
        }

        let nonce = force.then(cache_bust_nonce);
        match source.fetch_csv(nonce.as_deref()).await {
            Ok(body) => {
                state.body = Some(CachedBody {
                    body: body.clone(),
                    fetched_at: Instant::now(),
                    shown: !force,
                });
                Ok((body, Freshness::Live))
            }
            Err(e) => {
                // Don't keep serving a body the user just saw fail to refresh.
                state.body = None;
                if force {
                    state.refresh_error = Some(e.clone());
                }
                Err(e)
            }
        }
    }
}

pub fn cache_bust_nonce() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        busts: StdMutex<Vec<Option<String>>>,
        fail: bool,
    }

    impl CsvSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        async fn fetch_csv(&self, cache_bust: Option<&str>) -> LedgerResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.busts
                .lock()
                .unwrap()
                .push(cache_bust.map(str::to_string));
            if self.fail {
                return Err(LedgerError::SourceUnavailable("down".to_string()));
            }
            Ok(format!("Name,Amount\nFetch,{n}\n"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_cached_body_within_ttl() {
        let cache = FetchCache::new(Duration::from_secs(60));
        let source = CountingSource::default();

        let (first, f1) = cache.get_or_fetch(&source, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let (second, f2) = cache.get_or_fetch(&source, false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!((f1, f2), (Freshness::Live, Freshness::Cached));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_after_ttl() {
        let cache = FetchCache::new(Duration::from_secs(60));
        let source = CountingSource::default();

        cache.get_or_fetch(&source, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let (_, freshness) = cache.get_or_fetch(&source, false).await.unwrap();

        assert_eq!(freshness, Freshness::Live);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache_with_nonce() {
        let cache = FetchCache::new(Duration::from_secs(600));
        let source = CountingSource::default();

        cache.get_or_fetch(&source, false).await.unwrap();
        let (body, freshness) = cache.get_or_fetch(&source, true).await.unwrap();
        cache.get_or_fetch(&source, true).await.unwrap();

        assert_eq!(freshness, Freshness::Live);
        assert!(body.contains("Fetch,2"));
        let busts = source.busts.lock().unwrap().clone();
        assert_eq!(busts.len(), 3);
        assert!(busts[0].is_none());
        assert!(busts[1].is_some());
        assert_ne!(busts[1], busts[2]);
    }

    #[tokio::test]
    async fn test_first_read_after_forced_refresh_is_live() {
        let cache = FetchCache::new(Duration::from_secs(600));
        let source = CountingSource::default();

        cache.get_or_fetch(&source, false).await.unwrap();
        cache.get_or_fetch(&source, true).await.unwrap();
        let (body, after_refresh) = cache.get_or_fetch(&source, false).await.unwrap();
        let (_, later) = cache.get_or_fetch(&source, false).await.unwrap();

        assert!(body.contains("Fetch,2"));
        assert_eq!((after_refresh, later), (Freshness::Live, Freshness::Cached));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_failure_reaches_next_read() {
        let cache = FetchCache::new(Duration::from_secs(600));
        let source = CountingSource {
            fail: true,
            ..CountingSource::default()
        };

        assert!(cache.get_or_fetch(&source, true).await.is_err());
        let err = cache.get_or_fetch(&source, false).await.unwrap_err();

        assert_eq!(err, LedgerError::SourceUnavailable("down".to_string()));
        // Reported from the forced attempt; no unbusted refetch.
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Reported once, then reads fetch again.
        assert!(cache.get_or_fetch(&source, false).await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = FetchCache::new(Duration::from_secs(600));
        let source = CountingSource {
            fail: true,
            ..CountingSource::default()
        };

        assert!(cache.get_or_fetch(&source, false).await.is_err());
        assert!(cache.get_or_fetch(&source, false).await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nonce_is_hex() {
        let nonce = cache_bust_nonce();
        assert_eq!(nonce.len(), 16);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
