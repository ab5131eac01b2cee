use super::event::WebhookEvent;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Time-windowed fingerprint cache suppressing repeated deliveries.
///
/// One cache per listener/tenant, shared through an `Arc`. Entries older than
/// the window are dropped lazily when their fingerprint is looked up again and
/// eagerly by [`DuplicateCache::sweep`].
#[derive(Debug)]
pub struct DuplicateCache {
    seen: DashMap<String, i64>,
    window: Duration,
}

impl DuplicateCache {
    pub fn new(window: Duration) -> Self {
        DuplicateCache {
            seen: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a sighting at `now_ms` (unix milliseconds); `true` when the
    /// same fingerprint was recorded less than one window ago.
    pub fn is_duplicate(&self, event: &WebhookEvent, now_ms: i64) -> bool {
        self.check_fingerprint(&event.fingerprint(), now_ms)
    }

    pub fn check_fingerprint(&self, fingerprint: &str, now_ms: i64) -> bool {
        let window_ms = self.window_ms();
        match self.seen.entry(fingerprint.to_string()) {
            Entry::Occupied(mut entry) => {
                if now_ms.saturating_sub(*entry.get()) < window_ms {
                    true
                } else {
                    entry.insert(now_ms);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now_ms);
                false
            }
        }
    }

    /// Remove a recorded sighting so the next delivery counts as new.
    pub fn forget(&self, fingerprint: &str) -> bool {
        self.seen.remove(fingerprint).is_some()
    }

    /// Drop expired fingerprints, returning how many were removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let window_ms = self.window_ms();
        let before = self.seen.len();
        self.seen
            .retain(|_, seen_at| now_ms.saturating_sub(*seen_at) < window_ms);
        before.saturating_sub(self.seen.len())
    }

    /// Run [`sweep`](Self::sweep) every `every` until the cache is dropped.
    ///
    /// A zero interval starts nothing and returns `None`.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            tracing::warn!("duplicate cache sweep interval is zero; sweeper not started");
            return None;
        }
        let cache = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep(Utc::now().timestamp_millis());
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "swept duplicate cache");
                }
            }
        }))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}
