//! Storage migration helpers.

use crate::config::DataPaths;
use crate::helpers::history::{
    load_request_history, save_aggregate, update_model_stats, update_provider_stats,
    update_timeseries,
};
use crate::types::Aggregate;
use crate::utils::day_label;

/// Build aggregate.json from an older single-file history.
///
/// Returns `true` when an aggregate was written. Does nothing if the
/// aggregate already exists or there is no history to migrate.
pub fn migrate_to_split_storage(paths: &DataPaths) -> bool {
    if paths.aggregate_path().exists() {
        return false;
    }

    let history = load_request_history(paths);
    if history.requests.is_empty() {
        return false;
    }

    tracing::info!(
        requests = history.requests.len(),
        "building aggregate.json from existing history"
    );

    let mut agg = Aggregate::default();

    agg.total_requests = history.requests.len() as u64;
    agg.total_success_count = history.requests.iter().filter(|r| r.is_success()).count() as u64;
    agg.total_failure_count = agg.total_requests - agg.total_success_count;

    // Token totals in the history file are already lifetime sums
    agg.total_tokens_in = history.total_tokens_in;
    agg.total_tokens_out = history.total_tokens_out;
    agg.total_tokens_cached = history.total_tokens_cached;
    agg.total_cost_usd = history.total_cost_usd;

    for req in &history.requests {
        if let Some(day) = day_label(req.timestamp) {
            update_timeseries(&mut agg.requests_by_day, &day, 1);
            update_timeseries(&mut agg.tokens_by_day, &day, req.total_tokens());
        }
        update_model_stats(&mut agg, req);
        update_provider_stats(&mut agg, req);
    }

    if !history.tokens_by_day.is_empty() && agg.tokens_by_day.is_empty() {
        agg.tokens_by_day = history.tokens_by_day.clone();
    }

    agg.requests_by_day.sort_by(|a, b| a.label.cmp(&b.label));
    agg.tokens_by_day.sort_by(|a, b| a.label.cmp(&b.label));

    match save_aggregate(paths, &agg) {
        Ok(_) => {
            tracing::info!(requests = agg.total_requests, "created aggregate.json");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to save migrated aggregate");
            false
        }
    }
}
