use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One completed proxied request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    #[serde(default)]
    pub id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub tokens_in: Option<u32>,
    #[serde(default)]
    pub tokens_out: Option<u32>,
    #[serde(default)]
    pub tokens_cached: Option<u32>,
}

impl RequestLog {
    pub fn tokens_in(&self) -> u64 {
        self.tokens_in.unwrap_or(0) as u64
    }

    pub fn tokens_out(&self) -> u64 {
        self.tokens_out.unwrap_or(0) as u64
    }

    pub fn tokens_cached(&self) -> u64 {
        self.tokens_cached.unwrap_or(0) as u64
    }

    /// Input plus output tokens, missing counts as zero.
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in() + self.tokens_out()
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub requests_today: u64,
    pub tokens_today: u64,
    #[serde(default)]
    pub models: Vec<ModelUsage>,
    #[serde(default)]
    pub providers: Vec<ProviderUsage>,
    #[serde(default)]
    pub requests_by_day: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub tokens_by_day: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub requests_by_hour: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub tokens_by_hour: Vec<TimeSeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub model: String,
    pub requests: u64,
    pub tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    pub provider: String,
    pub requests: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub requests: u64,
    pub success_count: u64,
    pub tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Cumulative analytics, never trimmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub created_at: u64,
    pub total_requests: u64,
    pub total_success_count: u64,
    pub total_failure_count: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    #[serde(default)]
    pub total_tokens_cached: u64,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub requests_by_day: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub tokens_by_day: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub requests_by_hour: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub tokens_by_hour: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub model_stats: HashMap<String, ModelStats>,
    #[serde(default)]
    pub provider_stats: HashMap<String, ModelStats>,
}

impl Default for Aggregate {
    fn default() -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp_millis().max(0) as u64,
            total_requests: 0,
            total_success_count: 0,
            total_failure_count: 0,
            total_tokens_in: 0,
            total_tokens_out: 0,
            total_tokens_cached: 0,
            total_cost_usd: 0.0,
            requests_by_day: vec![],
            tokens_by_day: vec![],
            requests_by_hour: vec![],
            tokens_by_hour: vec![],
            model_stats: HashMap::new(),
            provider_stats: HashMap::new(),
        }
    }
}

/// Retained request window plus lifetime counters.
///
/// `requests` is capped at [`MAX_HISTORY_SIZE`](crate::types::MAX_HISTORY_SIZE) entries,
/// the token and cost totals cover every request ever recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestHistory {
    #[serde(default)]
    pub requests: Vec<RequestLog>,
    #[serde(default)]
    pub total_tokens_in: u64,
    #[serde(default)]
    pub total_tokens_out: u64,
    #[serde(default)]
    pub total_tokens_cached: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub tokens_by_day: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub tokens_by_hour: Vec<TimeSeriesPoint>,
    #[serde(default)]
    pub total_request_count: u64, // not capped at MAX_HISTORY_SIZE
    #[serde(default)]
    pub total_success_count: u64,
}

impl RequestHistory {
    /// Drop the oldest entries until at most `limit` remain.
    pub fn truncate_front(&mut self, limit: usize) {
        if self.requests.len() > limit {
            let excess = self.requests.len() - limit;
            self.requests.drain(0..excess);
        }
    }
}
