use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use proxypal_lib::stores::requests::local_day_start;
use proxypal_lib::stores::RequestHistoryStore;
use proxypal_lib::{HistoryBackend, HistoryError, RequestHistory, RequestLog, Result};
use tokio::sync::Notify;

/// Backend double that records calls and can be told to fail or stall.
#[derive(Default)]
struct ScriptedBackend {
    persisted: Mutex<Vec<RequestLog>>,
    snapshot: Mutex<RequestHistory>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    reads: AtomicUsize,
    stall_reads: AtomicBool,
    release: Notify,
}

#[async_trait]
impl HistoryBackend for ScriptedBackend {
    async fn add_request_to_history(&self, entry: &RequestLog) -> Result<RequestLog> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HistoryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write failed",
            )));
        }
        self.persisted.lock().unwrap().push(entry.clone());
        Ok(entry.clone())
    }

    async fn get_request_history(&self) -> Result<RequestHistory> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stall_reads.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn clear_request_history(&self) -> Result<()> {
        self.persisted.lock().unwrap().clear();
        Ok(())
    }
}

fn log(timestamp: u64, tokens_in: Option<u32>, tokens_out: Option<u32>) -> RequestLog {
    RequestLog {
        id: format!("req_{}", timestamp),
        timestamp,
        provider: "gemini".to_string(),
        model: "gemini-2.5-flash".to_string(),
        method: "POST".to_string(),
        path: "/v1beta/models/gemini-2.5-flash:generateContent".to_string(),
        status: 200,
        duration_ms: 420,
        tokens_in,
        tokens_out,
        tokens_cached: None,
    }
}

fn store_with(backend: &Arc<ScriptedBackend>) -> RequestHistoryStore {
    RequestHistoryStore::new(backend.clone())
}

#[tokio::test]
async fn two_requests_from_empty() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(&backend);
    let first = log(1000, Some(10), Some(5));
    let second = log(2000, Some(3), Some(0));

    store.add_request(first.clone()).await;
    store.add_request(second.clone()).await;

    let history = store.history();
    assert_eq!(history.requests, vec![first.clone(), second.clone()]);
    assert_eq!(history.total_tokens_in, 13);
    assert_eq!(history.total_tokens_out, 5);
    assert_eq!(*store.recent_requests(), vec![first, second]);
    assert_eq!(store.total_stats().total_requests, 2);
    assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bound_holds_after_every_add() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(&backend);

    for ts in 1..=620u64 {
        store.add_request(log(ts, None, None)).await;
        let history = store.history();
        assert!(history.requests.len() <= 500);
        let expected_first = ts.saturating_sub(500) + 1;
        assert_eq!(history.requests[0].timestamp, expected_first);
        assert_eq!(history.requests.last().map(|r| r.timestamp), Some(ts));
    }
}

#[tokio::test]
async fn truncation_keeps_lifetime_sums() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(&backend);

    for ts in 1..=501u64 {
        store.add_request(log(ts, Some(2), Some(3))).await;
    }

    let history = store.history();
    assert_eq!(history.requests.len(), 500);
    assert!(history.requests.iter().all(|r| r.timestamp != 1));
    assert_eq!(history.requests.last().map(|r| r.timestamp), Some(501));
    assert_eq!(history.total_tokens_in, 2 * 501);
    assert_eq!(history.total_tokens_out, 3 * 501);

    // count is the retained window, tokens are lifetime
    let totals = store.total_stats();
    assert_eq!(totals.total_requests, 500);
    assert_eq!(totals.total_tokens_in, 1002);
    assert_eq!(store.recent_requests().len(), 100);
    assert_eq!(store.recent_requests()[0].timestamp, 402);
}

#[tokio::test]
async fn sums_match_inputs_on_success_path() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(&backend);
    let inputs = [
        (Some(7), Some(1)),
        (None, Some(9)),
        (Some(11), None),
        (None, None),
        (Some(1), Some(1)),
    ];

    for (i, (tokens_in, tokens_out)) in inputs.iter().enumerate() {
        store.add_request(log(i as u64, *tokens_in, *tokens_out)).await;
    }

    let expected_in: u64 = inputs.iter().map(|(i, _)| i.unwrap_or(0) as u64).sum();
    let expected_out: u64 = inputs.iter().map(|(_, o)| o.unwrap_or(0) as u64).sum();
    let totals = store.total_stats();
    assert_eq!(totals.total_tokens_in, expected_in);
    assert_eq!(totals.total_tokens_out, expected_out);
}

#[tokio::test]
async fn persist_failure_still_shows_entry() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.fail_writes.store(true, Ordering::SeqCst);
    let store = store_with(&backend);

    store.add_request(log(1000, Some(50), Some(50))).await;

    let history = store.history();
    assert_eq!(history.requests.len(), 1);
    assert_eq!(history.total_tokens_in, 0);
    assert_eq!(history.total_tokens_out, 0);
    assert!(backend.persisted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn today_includes_midnight_exactly() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(&backend);
    let now = Local::now();
    let midnight = local_day_start(now);

    store.add_request(log(midnight - 1, Some(1000), None)).await;
    store.add_request(log(midnight, Some(4), Some(6))).await;

    let today = store.today_requests_at(now);
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].timestamp, midnight);

    let stats = store.today_stats_at(now);
    assert_eq!(stats.count, 1);
    assert_eq!(stats.tokens, 10);
}

#[tokio::test]
async fn overlapping_loads_read_once() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.stall_reads.store(true, Ordering::SeqCst);
    *backend.snapshot.lock().unwrap() = RequestHistory {
        requests: vec![log(1, Some(1), Some(1))],
        total_tokens_in: 77,
        ..RequestHistory::default()
    };
    let store = Arc::new(store_with(&backend));

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.load_history().await }
    });
    while backend.reads.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    store.load_history().await;
    assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
    assert!(store.is_loading());

    backend.release.notify_one();
    first.await.unwrap();

    assert!(!store.is_loading());
    assert_eq!(store.total_stats().total_tokens_in, 77);

    // flag released, a later load reads again
    backend.stall_reads.store(false, Ordering::SeqCst);
    store.load_history().await;
    assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn load_in_flight_replaces_newer_local_add() {
    let backend = Arc::new(ScriptedBackend::default());
    backend.stall_reads.store(true, Ordering::SeqCst);
    let stored = log(1, Some(1), Some(1));
    *backend.snapshot.lock().unwrap() = RequestHistory {
        requests: vec![stored.clone()],
        total_tokens_in: 1,
        total_tokens_out: 1,
        ..RequestHistory::default()
    };
    let store = Arc::new(store_with(&backend));

    let load = tokio::spawn({
        let store = store.clone();
        async move { store.load_history().await }
    });
    while backend.reads.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let newer = log(5000, Some(40), Some(2));
    store.add_request(newer.clone()).await;
    assert!(store.history().requests.contains(&newer));
    assert_eq!(backend.persisted.lock().unwrap().len(), 1);

    backend.release.notify_one();
    load.await.unwrap();

    // the loaded snapshot wins wholesale, including the totals
    let history = store.history();
    assert_eq!(history.requests, vec![stored]);
    assert_eq!(history.total_tokens_in, 1);
    assert_eq!(history.total_tokens_out, 1);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn clear_zeroes_every_field() {
    let backend = Arc::new(ScriptedBackend::default());
    *backend.snapshot.lock().unwrap() = RequestHistory {
        requests: vec![log(1, Some(1), Some(1)), log(2, Some(2), Some(2))],
        total_tokens_in: 300,
        total_tokens_out: 200,
        total_tokens_cached: 100,
        total_cost_usd: 4.2,
        ..RequestHistory::default()
    };
    let store = store_with(&backend);
    store.load_history().await;
    store.add_request(log(3, Some(5), Some(5))).await;

    store.clear_history();

    let history = store.history();
    assert!(history.requests.is_empty());
    assert_eq!(history.total_tokens_in, 0);
    assert_eq!(history.total_tokens_out, 0);
    assert_eq!(history.total_tokens_cached, 0);
    assert_eq!(history.total_cost_usd, 0.0);
    assert_eq!(store.today_stats().count, 0);
    assert!(store.recent_requests().is_empty());
}

#[tokio::test]
async fn concurrent_adds_all_land() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = Arc::new(store_with(&backend));

    let handles: Vec<_> = (0..50u64)
        .map(|ts| {
            let store = store.clone();
            tokio::spawn(async move { store.add_request(log(ts, Some(1), Some(2))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let totals = store.total_stats();
    assert_eq!(totals.total_requests, 50);
    assert_eq!(totals.total_tokens_in, 50);
    assert_eq!(totals.total_tokens_out, 100);
}
