use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::release::VersionInfo;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedEntry {
    info: VersionInfo,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A live cache entry and how long ago it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub info: VersionInfo,
    pub age: Duration,
}

/// Short-lived cache of the last resolved [`VersionInfo`].
///
/// Only successes are stored. The lock is held while a miss is resolved, so
/// concurrent misses share a single lookup.
pub struct ReleaseCache {
    ttl: Duration,
    entry: Mutex<Option<CachedEntry>>,
}

impl Default for ReleaseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ReleaseCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Return the cached value while it is live, otherwise run `resolve` and
    /// cache its success. A failure returns `None` and leaves whatever entry
    /// was there untouched.
    pub async fn get_or_fetch<F, Fut, E>(&self, resolve: F) -> Option<VersionInfo>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VersionInfo, E>>,
        E: Display,
    {
        let mut guard = self.entry.lock().await;
        if let Some(entry) = guard.as_ref()
            && entry.is_live(Instant::now())
        {
            return Some(entry.info.clone());
        }

        match resolve().await {
            Ok(info) => {
                *guard = Some(CachedEntry {
                    info: info.clone(),
                    expires_at: Instant::now() + self.ttl,
                });
                Some(info)
            }
            Err(error) => {
                debug!("Release info unavailable, nothing cached: {error}");
                None
            }
        }
    }

    /// The live entry, if any.
    pub async fn snapshot(&self) -> Option<CacheSnapshot> {
        let guard = self.entry.lock().await;
        let now = Instant::now();
        guard.as_ref().filter(|entry| entry.is_live(now)).map(|entry| {
            let remaining = entry.expires_at.saturating_duration_since(now);
            CacheSnapshot {
                info: entry.info.clone(),
                age: self.ttl.saturating_sub(remaining),
            }
        })
    }

    /// Seed the cache with a value resolved `age` ago, e.g. by an earlier
    /// process. Values at or past the TTL are ignored.
    pub async fn restore(&self, info: VersionInfo, age: Duration) {
        let Some(remaining) = self.ttl.checked_sub(age).filter(|left| !left.is_zero()) else {
            return;
        };
        *self.entry.lock().await = Some(CachedEntry {
            info,
            expires_at: Instant::now() + remaining,
        });
    }
}
