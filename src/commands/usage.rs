//! Usage & analytics commands.
//!
//! Builds dashboard statistics from aggregate.json, falling back to the
//! retained history where the aggregate has no time-series yet.

use std::collections::HashMap;

use crate::config::DataPaths;
use crate::helpers::history::{keep_last, load_aggregate, load_request_history};
use crate::types::{
    ModelUsage, ProviderUsage, RequestHistory, TimeSeriesPoint, UsageStats, MAX_DAILY_POINTS,
    MAX_HOURLY_POINTS,
};
use crate::utils::{day_label, hour_label};

fn is_known(name: &str) -> bool {
    !name.is_empty() && name != "unknown"
}

fn sorted_points(map: HashMap<String, u64>) -> Vec<TimeSeriesPoint> {
    let mut points: Vec<TimeSeriesPoint> = map
        .into_iter()
        .map(|(label, value)| TimeSeriesPoint { label, value })
        .collect();
    points.sort_by(|a, b| a.label.cmp(&b.label));
    points
}

/// Bucket retained requests by `label_of`, summing `value_of`.
fn series_from_history(
    history: &RequestHistory,
    label_of: fn(u64) -> Option<String>,
    value_of: fn(&crate::types::RequestLog) -> u64,
) -> Vec<TimeSeriesPoint> {
    let mut map: HashMap<String, u64> = HashMap::new();
    for req in &history.requests {
        if let Some(label) = label_of(req.timestamp) {
            *map.entry(label).or_insert(0) += value_of(req);
        }
    }
    sorted_points(map)
}

/// Compute usage statistics from the persisted files.
pub fn get_usage_stats(paths: &DataPaths) -> UsageStats {
    let agg = load_aggregate(paths);
    let history = load_request_history(paths);

    if agg.total_requests == 0 && history.requests.is_empty() {
        return UsageStats::default();
    }

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let requests_today = agg
        .requests_by_day
        .iter()
        .find(|p| p.label == today)
        .map(|p| p.value)
        .unwrap_or(0);
    let tokens_today = agg
        .tokens_by_day
        .iter()
        .find(|p| p.label == today)
        .map(|p| p.value)
        .unwrap_or(0);

    let mut models: Vec<ModelUsage> = agg
        .model_stats
        .iter()
        .filter(|(model, _)| is_known(model))
        .map(|(model, stats)| ModelUsage {
            model: model.clone(),
            requests: stats.requests,
            tokens: stats.tokens,
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            cached_tokens: stats.cached_tokens,
        })
        .collect();
    models.sort_by(|a, b| b.requests.cmp(&a.requests).then_with(|| a.model.cmp(&b.model)));

    let mut providers: Vec<ProviderUsage> = agg
        .provider_stats
        .iter()
        .filter(|(provider, _)| is_known(provider))
        .map(|(provider, stats)| ProviderUsage {
            provider: provider.clone(),
            requests: stats.requests,
            tokens: stats.tokens,
        })
        .collect();
    providers.sort_by(|a, b| {
        b.requests
            .cmp(&a.requests)
            .then_with(|| a.provider.cmp(&b.provider))
    });

    let mut requests_by_day = if agg.requests_by_day.is_empty() {
        series_from_history(&history, day_label, |_| 1)
    } else {
        agg.requests_by_day.clone()
    };
    keep_last(&mut requests_by_day, MAX_DAILY_POINTS);

    let mut tokens_by_day = if !agg.tokens_by_day.is_empty() {
        agg.tokens_by_day.clone()
    } else if !history.tokens_by_day.is_empty() {
        history.tokens_by_day.clone()
    } else {
        series_from_history(&history, day_label, |r| r.total_tokens())
    };
    keep_last(&mut tokens_by_day, MAX_DAILY_POINTS);

    let mut requests_by_hour = if agg.requests_by_hour.is_empty() {
        series_from_history(&history, hour_label, |_| 1)
    } else {
        agg.requests_by_hour.clone()
    };
    requests_by_hour.sort_by(|a, b| a.label.cmp(&b.label));
    keep_last(&mut requests_by_hour, MAX_HOURLY_POINTS);

    let mut tokens_by_hour = if agg.tokens_by_hour.is_empty() {
        series_from_history(&history, hour_label, |r| r.total_tokens())
    } else {
        agg.tokens_by_hour.clone()
    };
    tokens_by_hour.sort_by(|a, b| a.label.cmp(&b.label));
    keep_last(&mut tokens_by_hour, MAX_HOURLY_POINTS);

    UsageStats {
        total_requests: agg.total_requests,
        success_count: agg.total_success_count,
        failure_count: agg.total_failure_count,
        total_tokens: agg.total_tokens_in + agg.total_tokens_out,
        input_tokens: agg.total_tokens_in,
        output_tokens: agg.total_tokens_out,
        cached_tokens: agg.total_tokens_cached,
        requests_today,
        tokens_today,
        models,
        providers,
        requests_by_day,
        tokens_by_day,
        requests_by_hour,
        tokens_by_hour,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileHistoryBackend, HistoryBackend};
    use crate::helpers::history::save_request_history;
    use crate::helpers::history::tests::{request, test_paths};
    use crate::utils::now_millis;

    #[test]
    fn empty_files_give_default_stats() {
        let paths = test_paths("usage-empty");
        let stats = get_usage_stats(&paths);
        assert_eq!(stats.total_requests, 0);
        assert!(stats.models.is_empty());
        let _ = std::fs::remove_dir_all(paths.dir());
    }

    #[tokio::test]
    async fn stats_follow_recorded_requests() {
        let paths = test_paths("usage-recorded");
        let backend = FileHistoryBackend::new(paths.clone());
        let now = now_millis();

        let mut gpt = request("b", now, 200, (1, 1));
        gpt.model = "gpt-5".to_string();
        gpt.provider = "openai".to_string();
        backend
            .add_request_to_history(&request("a", now, 200, (10, 20)))
            .await
            .unwrap();
        backend
            .add_request_to_history(&request("c", now, 500, (5, 0)))
            .await
            .unwrap();
        backend.add_request_to_history(&gpt).await.unwrap();

        let stats = get_usage_stats(&paths);

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.total_tokens, 37);
        assert_eq!(stats.requests_today, 3);
        assert_eq!(stats.tokens_today, 37);
        assert_eq!(stats.models[0].model, "claude-sonnet-4-5");
        assert_eq!(stats.models[0].requests, 2);
        assert_eq!(stats.providers.len(), 2);
        assert_eq!(stats.requests_by_hour.iter().map(|p| p.value).sum::<u64>(), 3);

        let _ = std::fs::remove_dir_all(paths.dir());
    }

    #[test]
    fn series_fall_back_to_history() {
        let paths = test_paths("usage-fallback");
        let day_ms = 86_400_000u64;
        let base = 1_700_000_000_000u64;
        let history = RequestHistory {
            requests: (0..20u64)
                .map(|i| request(&i.to_string(), base + i * day_ms, 200, (1, 1)))
                .collect(),
            ..RequestHistory::default()
        };
        save_request_history(&paths, &history).unwrap();

        let stats = get_usage_stats(&paths);

        assert_eq!(stats.requests_by_day.len(), MAX_DAILY_POINTS);
        assert_eq!(stats.tokens_by_day.len(), MAX_DAILY_POINTS);
        assert_eq!(stats.requests_by_hour.len(), 20);
        assert!(stats.tokens_by_hour.iter().all(|p| p.value == 2));
        let _ = std::fs::remove_dir_all(paths.dir());
    }
}
