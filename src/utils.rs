//! Cost estimation, provider detection and local time bucketing.

/// USD per million tokens (input, output), first matching entry wins.
/// Every needle in an entry must appear in the lowercased model name.
const MODEL_RATES: &[(&[&str], (f64, f64))] = &[
    (&["claude", "opus"], (15.0, 75.0)),
    (&["claude", "sonnet"], (3.0, 15.0)),
    (&["claude", "haiku"], (0.25, 1.25)),
    (&["gpt-5"], (15.0, 45.0)),
    (&["gpt-4o"], (2.5, 10.0)),
    (&["gpt-4"], (10.0, 30.0)),
    (&["gpt-3.5"], (0.5, 1.5)),
    (&["gemini", "pro"], (1.25, 5.0)),
    (&["gemini", "flash"], (0.075, 0.30)),
    (&["gemini-2"], (0.10, 0.40)),
    (&["qwen"], (0.50, 2.0)),
];

const FALLBACK_RATES: (f64, f64) = (1.0, 3.0);

fn model_rates(model: &str) -> (f64, f64) {
    let model = model.to_lowercase();
    MODEL_RATES
        .iter()
        .find(|(needles, _)| needles.iter().all(|n| model.contains(n)))
        .map(|(_, rates)| *rates)
        .unwrap_or(FALLBACK_RATES)
}

/// Estimate the USD cost of a request from per-million-token rates
pub fn estimate_request_cost(model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
    let (input_rate, output_rate) = model_rates(model);
    (tokens_in as f64 * input_rate + tokens_out as f64 * output_rate) / 1_000_000.0
}

/// Detect provider from model name
pub fn detect_provider_from_model(model: &str) -> String {
    let model_lower = model.to_lowercase();

    // gemini-claude-* is served through antigravity, check before claude
    if model_lower.starts_with("gemini-claude") || model_lower.contains("antigravity") {
        return "antigravity".to_string();
    }
    if ["claude", "sonnet", "opus", "haiku"]
        .iter()
        .any(|k| model_lower.contains(k))
    {
        return "claude".to_string();
    }
    if model_lower.contains("gpt")
        || model_lower.contains("codex")
        || model_lower.starts_with("o3")
        || model_lower.starts_with("o1")
    {
        return "openai".to_string();
    }
    if model_lower.contains("gemini") {
        return "gemini".to_string();
    }
    if model_lower.contains("qwen") {
        return "qwen".to_string();
    }
    if model_lower.contains("deepseek") {
        return "deepseek".to_string();
    }
    if model_lower.contains("glm") {
        return "zhipu".to_string();
    }

    "unknown".to_string()
}

/// Provider from an Amp-style or well-known endpoint path
/// e.g. "/api/provider/anthropic/v1/messages" -> "claude"
pub fn detect_provider_from_path(path: &str) -> Option<String> {
    if path.contains("/api/provider/") {
        let mut parts = path.split('/').skip_while(|p| *p != "provider");
        if let Some(provider) = parts.nth(1) {
            return Some(match provider {
                "anthropic" => "claude".to_string(),
                "google" => "gemini".to_string(),
                p => p.to_string(),
            });
        }
    }

    if path.contains("/messages") {
        return Some("claude".to_string());
    }
    if path.contains("/chat/completions") {
        return Some("openai-compat".to_string());
    }
    if path.contains("/v1beta")
        || path.contains(":generateContent")
        || path.contains(":streamGenerateContent")
    {
        return Some("gemini".to_string());
    }

    None
}

/// Model name from a Gemini-style path, "/v1beta/models/gemini-2.5-pro:generateContent"
pub fn extract_model_from_path(path: &str) -> Option<String> {
    let idx = path.find("/models/")?;
    let model_part = &path[idx + "/models/".len()..];
    let end = model_part
        .find(|c: char| c == ':' || c == '/' || c == '?')
        .unwrap_or(model_part.len());
    let model = &model_part[..end];
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

/// Bucket label for a millisecond timestamp in local time, e.g. "2025-12-04"
pub fn day_label(timestamp_ms: u64) -> Option<String> {
    local_datetime(timestamp_ms).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Hourly bucket label in local time, e.g. "2025-12-04T20"
pub fn hour_label(timestamp_ms: u64) -> Option<String> {
    local_datetime(timestamp_ms).map(|dt| dt.format("%Y-%m-%dT%H").to_string())
}

fn local_datetime(timestamp_ms: u64) -> Option<chrono::DateTime<chrono::Local>> {
    let ms = i64::try_from(timestamp_ms).ok()?;
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&chrono::Local))
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
