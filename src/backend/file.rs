use async_trait::async_trait;
use tokio::sync::Mutex;

use super::HistoryBackend;
use crate::config::DataPaths;
use crate::error::Result;
use crate::helpers::history::{
    load_aggregate, load_request_history, record_in_aggregate, save_aggregate,
    save_request_history,
};
use crate::types::{RequestHistory, RequestLog, MAX_HISTORY_SIZE};
use crate::utils::estimate_request_cost;

/// JSON files in the data directory: history.json holds the retained window,
/// aggregate.json the cumulative analytics.
pub struct FileHistoryBackend {
    paths: DataPaths,
    usage_stats_enabled: bool,
    // serialises read-modify-write of the files within this process
    write_lock: Mutex<()>,
}

impl FileHistoryBackend {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            usage_stats_enabled: true,
            write_lock: Mutex::new(()),
        }
    }

    /// Skip aggregate.json updates when usage stats are turned off.
    pub fn with_usage_stats(mut self, enabled: bool) -> Self {
        self.usage_stats_enabled = enabled;
        self
    }
}

fn append_request(
    paths: &DataPaths,
    request: RequestLog,
    usage_stats_enabled: bool,
) -> Result<RequestLog> {
    let mut history = load_request_history(paths);

    let tokens_in = request.tokens_in.unwrap_or(0);
    let tokens_out = request.tokens_out.unwrap_or(0);
    let cost = estimate_request_cost(&request.model, tokens_in, tokens_out);

    history.total_tokens_in += request.tokens_in();
    history.total_tokens_out += request.tokens_out();
    history.total_tokens_cached += request.tokens_cached();
    history.total_cost_usd += cost;

    // The same request can be reported twice (live event and log replay)
    let is_duplicate = history.requests.iter().any(|r| r.id == request.id);
    if !is_duplicate {
        history.total_request_count += 1;
        if request.is_success() {
            history.total_success_count += 1;
        }
        history.requests.push(request.clone());
        history.truncate_front(MAX_HISTORY_SIZE);
    }

    save_request_history(paths, &history)?;

    if usage_stats_enabled && !is_duplicate {
        let mut agg = load_aggregate(paths);
        record_in_aggregate(&mut agg, &request, cost);
        save_aggregate(paths, &agg)?;
    }

    Ok(request)
}

#[async_trait]
impl HistoryBackend for FileHistoryBackend {
    async fn add_request_to_history(&self, entry: &RequestLog) -> Result<RequestLog> {
        let _guard = self.write_lock.lock().await;
        let paths = self.paths.clone();
        let request = entry.clone();
        let usage_stats_enabled = self.usage_stats_enabled;
        tokio::task::spawn_blocking(move || append_request(&paths, request, usage_stats_enabled))
            .await?
    }

    async fn get_request_history(&self) -> Result<RequestHistory> {
        let _guard = self.write_lock.lock().await;
        let paths = self.paths.clone();
        let history = tokio::task::spawn_blocking(move || load_request_history(&paths)).await?;
        Ok(history)
    }

    async fn clear_request_history(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || {
            save_request_history(&paths, &RequestHistory::default())
        })
        .await?
    }
}
