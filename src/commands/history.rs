//! Request history commands.
//!
//! Thin wrappers that drive the [`RequestHistoryStore`] the way the dashboard
//! does: load once, then read through the derived views.

use serde::Serialize;

use crate::backend::HistoryBackend;
use crate::error::Result;
use crate::stores::{RequestHistoryStore, TodayStats, TotalStats};
use crate::types::RequestLog;
use crate::utils::{detect_provider_from_model, now_millis};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total: TotalStats,
    pub today: TodayStats,
    pub total_tokens_cached: u64,
}

/// Fields a caller supplies for a manually recorded request.
#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub model: String,
    pub provider: Option<String>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub tokens_cached: Option<u32>,
}

pub fn get_history_summary(store: &RequestHistoryStore) -> HistorySummary {
    HistorySummary {
        total: store.total_stats(),
        today: store.today_stats(),
        total_tokens_cached: store.history().total_tokens_cached,
    }
}

/// The recent view, optionally cut down to its newest `limit` entries.
pub fn get_recent_requests(store: &RequestHistoryStore, limit: Option<usize>) -> Vec<RequestLog> {
    let recent = store.recent_requests();
    let start = limit
        .map(|limit| recent.len().saturating_sub(limit))
        .unwrap_or(0);
    recent[start..].to_vec()
}

pub fn get_today_requests(store: &RequestHistoryStore) -> Vec<RequestLog> {
    store.today_requests().as_ref().clone()
}

/// Stamp a new request with the current time and an id, then record it.
pub async fn add_request(store: &RequestHistoryStore, new: NewRequest) -> RequestLog {
    let timestamp = now_millis();
    let provider = new
        .provider
        .unwrap_or_else(|| detect_provider_from_model(&new.model));
    let request = RequestLog {
        id: format!("req_{}_{}", timestamp, &uuid::Uuid::new_v4().simple().to_string()[..8]),
        timestamp,
        provider,
        model: new.model,
        method: new.method,
        path: new.path,
        status: new.status,
        duration_ms: new.duration_ms,
        tokens_in: new.tokens_in,
        tokens_out: new.tokens_out,
        tokens_cached: new.tokens_cached,
    };

    store.add_request(request.clone()).await;
    request
}

/// Clear the local view, and the persisted history too when `persist` is set.
pub async fn clear_history(
    store: &RequestHistoryStore,
    backend: &dyn HistoryBackend,
    persist: bool,
) -> Result<()> {
    if persist {
        backend.clear_request_history().await?;
        tracing::info!("persisted request history cleared");
    }
    store.clear_history();
    Ok(())
}
