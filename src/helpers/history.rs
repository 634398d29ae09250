//! Request history and aggregate I/O helpers.

use std::path::Path;

use crate::config::DataPaths;
use crate::error::Result;
use crate::types::{
    Aggregate, ModelStats, RequestHistory, RequestLog, TimeSeriesPoint, MAX_HISTORY_SIZE,
    MAX_HOURLY_POINTS,
};
use crate::utils::{day_label, hour_label};

/// Load request history, falling back to an empty history when the file is
/// missing or unreadable.
pub(crate) fn load_request_history(paths: &DataPaths) -> RequestHistory {
    let path = paths.history_path();
    if !path.exists() {
        return RequestHistory::default();
    }

    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read history");
            return RequestHistory::default();
        }
    };

    match serde_json::from_str::<RequestHistory>(&data) {
        Ok(mut history) => {
            // Older files predate the cumulative counters
            if history.total_request_count == 0 && !history.requests.is_empty() {
                history.total_request_count = history.requests.len() as u64;
            }
            if history.total_success_count == 0 && !history.requests.is_empty() {
                history.total_success_count =
                    history.requests.iter().filter(|r| r.is_success()).count() as u64;
            }
            history
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse history");
            RequestHistory::default()
        }
    }
}

/// Save request history, keeping the newest requests only. Cumulative
/// counters are written as they are.
pub(crate) fn save_request_history(paths: &DataPaths, history: &RequestHistory) -> Result<()> {
    paths.ensure_dir()?;
    if history.requests.len() > MAX_HISTORY_SIZE {
        let mut trimmed = history.clone();
        trimmed.truncate_front(MAX_HISTORY_SIZE);
        return write_json_atomic(&paths.history_path(), &trimmed);
    }
    write_json_atomic(&paths.history_path(), history)
}

pub(crate) fn load_aggregate(paths: &DataPaths) -> Aggregate {
    let path = paths.aggregate_path();
    if path.exists() {
        if let Ok(data) = std::fs::read_to_string(&path) {
            match serde_json::from_str(&data) {
                Ok(agg) => return agg,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse aggregate")
                }
            }
        }
    }
    Aggregate::default()
}

pub(crate) fn save_aggregate(paths: &DataPaths, agg: &Aggregate) -> Result<()> {
    paths.ensure_dir()?;
    write_json_atomic(&paths.aggregate_path(), agg)
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn update_timeseries(series: &mut Vec<TimeSeriesPoint>, label: &str, increment: u64) {
    if let Some(point) = series.iter_mut().find(|p| p.label == label) {
        point.value += increment;
    } else {
        series.push(TimeSeriesPoint {
            label: label.to_string(),
            value: increment,
        });
    }
}

/// Keep the newest `limit` points of a label-sorted series.
pub(crate) fn keep_last(series: &mut Vec<TimeSeriesPoint>, limit: usize) {
    if series.len() > limit {
        *series = series.split_off(series.len() - limit);
    }
}

fn stats_key(name: &str) -> String {
    if name.is_empty() || name == "unknown" {
        "unknown".to_string()
    } else {
        name.to_string()
    }
}

pub(crate) fn update_model_stats(agg: &mut Aggregate, req: &RequestLog) {
    let entry = agg
        .model_stats
        .entry(stats_key(&req.model))
        .or_insert_with(ModelStats::default);
    entry.requests += 1;
    if req.is_success() {
        entry.success_count += 1;
    }
    entry.tokens += req.total_tokens();
    entry.input_tokens += req.tokens_in();
    entry.output_tokens += req.tokens_out();
    entry.cached_tokens += req.tokens_cached();
}

pub(crate) fn update_provider_stats(agg: &mut Aggregate, req: &RequestLog) {
    let entry = agg
        .provider_stats
        .entry(stats_key(&req.provider))
        .or_insert_with(ModelStats::default);
    entry.requests += 1;
    if req.is_success() {
        entry.success_count += 1;
    }
    entry.tokens += req.total_tokens();
}

/// Fold one request into the cumulative aggregate.
pub(crate) fn record_in_aggregate(agg: &mut Aggregate, req: &RequestLog, cost_usd: f64) {
    agg.total_requests += 1;
    if req.is_success() {
        agg.total_success_count += 1;
    } else {
        agg.total_failure_count += 1;
    }
    agg.total_tokens_in += req.tokens_in();
    agg.total_tokens_out += req.tokens_out();
    agg.total_tokens_cached += req.tokens_cached();
    agg.total_cost_usd += cost_usd;

    let tokens = req.total_tokens();
    if let Some(day) = day_label(req.timestamp) {
        update_timeseries(&mut agg.requests_by_day, &day, 1);
        update_timeseries(&mut agg.tokens_by_day, &day, tokens);
        agg.requests_by_day.sort_by(|a, b| a.label.cmp(&b.label));
        agg.tokens_by_day.sort_by(|a, b| a.label.cmp(&b.label));
    }
    if let Some(hour) = hour_label(req.timestamp) {
        update_timeseries(&mut agg.requests_by_hour, &hour, 1);
        update_timeseries(&mut agg.tokens_by_hour, &hour, tokens);
        agg.requests_by_hour.sort_by(|a, b| a.label.cmp(&b.label));
        agg.tokens_by_hour.sort_by(|a, b| a.label.cmp(&b.label));
        keep_last(&mut agg.requests_by_hour, MAX_HOURLY_POINTS);
        keep_last(&mut agg.tokens_by_hour, MAX_HOURLY_POINTS);
    }

    update_model_stats(agg, req);
    update_provider_stats(agg, req);
}
