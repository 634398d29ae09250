//! Centralized request history store.
//!
//! Holds the retained request window and lifetime counters as an immutable
//! snapshot. Mutations install a new snapshot computed from the latest one;
//! readers go through the derived views, which are cached per snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Local, TimeZone, Timelike};
use serde::Serialize;

use crate::backend::HistoryBackend;
use crate::types::{RequestHistory, RequestLog, MAX_HISTORY_SIZE, RECENT_REQUESTS_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    pub count: usize,
    pub tokens: u64,
}

/// `total_requests` counts the retained window only, the token fields are
/// lifetime sums.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub total_requests: usize,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_cost: f64,
}

/// Next snapshot after appending `entry`.
///
/// `count_tokens` is false when the backend failed to persist the entry; the
/// entry is still shown but the running sums stay as they were.
pub fn append_request(prev: &RequestHistory, entry: RequestLog, count_tokens: bool) -> RequestHistory {
    let mut next = prev.clone();
    if count_tokens {
        next.total_tokens_in += entry.tokens_in();
        next.total_tokens_out += entry.tokens_out();
    }
    next.requests.push(entry);
    next.truncate_front(MAX_HISTORY_SIZE);
    next
}

/// The last [`RECENT_REQUESTS_LIMIT`] retained requests, oldest first.
pub fn recent_requests(history: &RequestHistory) -> Vec<RequestLog> {
    let start = history.requests.len().saturating_sub(RECENT_REQUESTS_LIMIT);
    history.requests[start..].to_vec()
}

/// Milliseconds since epoch of 00:00:00.000 local time on `now`'s day.
pub fn local_day_start(now: DateTime<Local>) -> u64 {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());

    let millis = match midnight {
        Some(dt) => dt.timestamp_millis(),
        // Midnight falls in a DST gap, take the first instant of the day instead
        None => {
            let since_midnight = i64::from(now.num_seconds_from_midnight()) * 1000
                + i64::from(now.timestamp_subsec_millis());
            now.timestamp_millis() - since_midnight
        }
    };
    millis.max(0) as u64
}

/// Requests with `timestamp >= start_ms`, in stored order.
pub fn requests_since(history: &RequestHistory, start_ms: u64) -> Vec<RequestLog> {
    history
        .requests
        .iter()
        .filter(|r| r.timestamp >= start_ms)
        .cloned()
        .collect()
}

pub fn today_stats_of(requests: &[RequestLog]) -> TodayStats {
    TodayStats {
        count: requests.len(),
        tokens: requests.iter().map(RequestLog::total_tokens).sum(),
    }
}

pub fn total_stats(history: &RequestHistory) -> TotalStats {
    TotalStats {
        total_requests: history.requests.len(),
        total_tokens_in: history.total_tokens_in,
        total_tokens_out: history.total_tokens_out,
        total_cost: history.total_cost_usd,
    }
}

type Cached<K> = Option<(Arc<RequestHistory>, K, Arc<Vec<RequestLog>>)>;

#[derive(Default)]
struct ViewCache {
    recent: Cached<()>,
    today: Cached<u64>,
}

/// Releases the loading flag when dropped, whichever way the load ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RequestHistoryStore {
    backend: Arc<dyn HistoryBackend>,
    history: RwLock<Arc<RequestHistory>>,
    is_loading: AtomicBool,
    views: Mutex<ViewCache>,
}

impl RequestHistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            history: RwLock::new(Arc::new(RequestHistory::default())),
            is_loading: AtomicBool::new(false),
            views: Mutex::new(ViewCache::default()),
        }
    }

    /// Current snapshot.
    pub fn history(&self) -> Arc<RequestHistory> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::Acquire)
    }

    /// Persist `entry` through the backend, then show it locally.
    ///
    /// A persist failure is logged and the entry is still appended, but the
    /// running token sums are left untouched on that path.
    pub async fn add_request(&self, entry: RequestLog) {
        let persisted = match self.backend.add_request_to_history(&entry).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(store = "requests", id = %entry.id, error = %e, "failed to persist request");
                false
            }
        };

        self.update(|prev| append_request(prev, entry, persisted));
    }

    /// Replace the local snapshot with the backend's.
    ///
    /// Returns immediately if a load is already in flight. On failure the
    /// local snapshot is kept. Entries added locally while the read is in
    /// flight are overwritten by the loaded snapshot.
    pub async fn load_history(&self) {
        let Some(_loading) = LoadingGuard::acquire(&self.is_loading) else {
            tracing::debug!(store = "requests", "history load already in flight");
            return;
        };

        match self.backend.get_request_history().await {
            Ok(history) => {
                tracing::debug!(
                    store = "requests",
                    requests = history.requests.len(),
                    "loaded request history"
                );
                self.replace(history);
            }
            Err(e) => {
                tracing::error!(store = "requests", error = %e, "failed to load history");
            }
        }
    }

    /// Reset the local snapshot. Does not touch the backend.
    pub fn clear_history(&self) {
        self.replace(RequestHistory::default());
    }

    pub fn recent_requests(&self) -> Arc<Vec<RequestLog>> {
        let history = self.history();
        let mut views = self.views();
        if let Some((snapshot, (), cached)) = &views.recent {
            if Arc::ptr_eq(snapshot, &history) {
                return cached.clone();
            }
        }
        let recent = Arc::new(recent_requests(&history));
        views.recent = Some((history, (), recent.clone()));
        recent
    }

    pub fn today_requests(&self) -> Arc<Vec<RequestLog>> {
        self.today_requests_at(Local::now())
    }

    /// Requests since local midnight of `now`'s day.
    pub fn today_requests_at(&self, now: DateTime<Local>) -> Arc<Vec<RequestLog>> {
        let history = self.history();
        let day_start = local_day_start(now);
        let mut views = self.views();
        if let Some((snapshot, cached_start, cached)) = &views.today {
            if Arc::ptr_eq(snapshot, &history) && *cached_start == day_start {
                return cached.clone();
            }
        }
        let today = Arc::new(requests_since(&history, day_start));
        views.today = Some((history, day_start, today.clone()));
        today
    }

    pub fn today_stats(&self) -> TodayStats {
        today_stats_of(&self.today_requests())
    }

    pub fn today_stats_at(&self, now: DateTime<Local>) -> TodayStats {
        today_stats_of(&self.today_requests_at(now))
    }

    pub fn total_stats(&self) -> TotalStats {
        total_stats(&self.history())
    }

    fn views(&self) -> MutexGuard<'_, ViewCache> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // next state is always derived from the snapshot current at update time
    fn update(&self, f: impl FnOnce(&RequestHistory) -> RequestHistory) {
        let mut current = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&current);
        *current = Arc::new(next);
    }

    fn replace(&self, history: RequestHistory) {
        let mut current = self.history.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(history);
    }
}
