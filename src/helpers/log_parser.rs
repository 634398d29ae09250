//! Turns proxy access-log lines into request records.

use std::collections::HashMap;

use regex::Regex;

use crate::types::RequestLog;
use crate::utils::{
    detect_provider_from_model, detect_provider_from_path, extract_model_from_path, now_millis,
};

const MODEL_CACHE_LIMIT: usize = 1000;

lazy_static::lazy_static! {
    // | f803bb77 | Use OAuth user@email.com for model claude-opus-4-5-thinking
    static ref MODEL_REGEX: Regex = Regex::new(
        r#"\|\s+([a-f0-9]{8})\s+\|.*for model\s+(\S+)"#
    ).unwrap();
    // | f803bb77 | 200 | 12.453s | 127.0.0.1 | POST "/v1/messages"
    static ref NEW_FORMAT_REGEX: Regex = Regex::new(
        r#"\|\s+([a-f0-9]{8}|-{8})\s+\|\s+(\d+)\s+\|\s+([^\s]+)\s+\|\s+[^\s]+\s+\|\s+(\w+)\s+"([^"]+)""#
    ).unwrap();
    // [GIN] 2025/12/04 - 20:51:48 | 200 | 6.656s | ::1 | POST "/v1/messages" | model=...
    static ref GIN_REGEX: Regex = Regex::new(
        r#"\[GIN\]\s+(\d{4}/\d{2}/\d{2})\s+-\s+(\d{2}:\d{2}:\d{2})\s+\|\s+(\d+)\s+\|\s+([^\s]+)\s+\|\s+[^\s]+\s+\|\s+(\w+)\s+"([^"]+)"(?:\s+\|\s+model=(\S+))?"#
    ).unwrap();
    static ref TS_REGEX: Regex = Regex::new(
        r#"(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})"#
    ).unwrap();
}

const IGNORED_ROUTES: &[&str] = &[
    "/v0/management/",
    "/v1/models",
    "?uploadThread",
    "?getCreditsByRequestId",
    "?threadDisplayCostInfo",
    "/api/internal",
    "/api/telemetry",
    "/api/otel",
];

const TRACKED_ROUTES: &[&str] = &[
    "/chat/completions",
    "/v1/messages",
    "/completions",
    "/v1beta",
    ":generateContent",
    ":streamGenerateContent",
];

/// Stateful parser for one log stream.
///
/// Debug lines announce the model for a request id before the access line
/// for that id shows up, so the parser remembers them.
#[derive(Debug, Default)]
pub struct LogParser {
    counter: u64,
    model_cache: HashMap<String, String>,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> Option<RequestLog> {
        if line.contains("for model ") {
            self.remember_model(line);
            return None;
        }

        let is_gin_log = line.contains("[GIN]");
        let is_new_format = !is_gin_log && (line.contains("| POST") || line.contains("| GET"));
        if !is_gin_log && !is_new_format {
            return None;
        }

        if IGNORED_ROUTES.iter().any(|r| line.contains(r)) {
            return None;
        }
        if !TRACKED_ROUTES.iter().any(|r| line.contains(r)) {
            return None;
        }

        if let Some(captures) = NEW_FORMAT_REGEX.captures(line) {
            let request_id = captures.get(1)?.as_str();
            let status: u16 = captures.get(2)?.as_str().parse().ok()?;
            let duration_ms = parse_duration(captures.get(3)?.as_str());
            let method = captures.get(4)?.as_str().to_string();
            let path = captures.get(5)?.as_str().to_string();
            let timestamp = extract_timestamp_from_line(line).unwrap_or_else(now_millis);

            let cached_model = if request_id != "--------" {
                self.model_cache.get(request_id).cloned()
            } else {
                None
            };
            let model = cached_model
                .or_else(|| extract_model_from_path(&path))
                .unwrap_or_else(|| "unknown".to_string());

            return Some(self.build(timestamp, model, method, path, status, duration_ms));
        }

        let captures = GIN_REGEX.captures(line)?;
        let date_str = captures.get(1)?.as_str();
        let time_str = captures.get(2)?.as_str();
        let status: u16 = captures.get(3)?.as_str().parse().ok()?;
        let duration_ms = parse_duration(captures.get(4)?.as_str());
        let method = captures.get(5)?.as_str().to_string();
        let path = captures.get(6)?.as_str().to_string();

        let datetime_str = format!("{} {}", date_str.replace('/', "-"), time_str);
        let timestamp = parse_local_datetime(&datetime_str).unwrap_or_else(now_millis);

        let model = captures
            .get(7)
            .map(|m| m.as_str().to_string())
            .or_else(|| extract_model_from_path(&path))
            .unwrap_or_else(|| "unknown".to_string());

        Some(self.build(timestamp, model, method, path, status, duration_ms))
    }

    fn remember_model(&mut self, line: &str) {
        let Some(caps) = MODEL_REGEX.captures(line) else {
            return;
        };
        let (Some(id), Some(model)) = (caps.get(1), caps.get(2)) else {
            return;
        };
        self.model_cache
            .insert(id.as_str().to_string(), model.as_str().to_string());
        if self.model_cache.len() > MODEL_CACHE_LIMIT {
            let keys: Vec<String> = self
                .model_cache
                .keys()
                .take(MODEL_CACHE_LIMIT / 2)
                .cloned()
                .collect();
            for key in keys {
                self.model_cache.remove(&key);
            }
        }
    }

    fn build(
        &mut self,
        timestamp: u64,
        model: String,
        method: String,
        path: String,
        status: u16,
        duration_ms: u64,
    ) -> RequestLog {
        // Model is more precise than the route
        let model_provider = detect_provider_from_model(&model);
        let provider = if model_provider != "unknown" {
            model_provider
        } else {
            detect_provider_from_path(&path).unwrap_or_else(|| "unknown".to_string())
        };

        let id = format!("req_{}_{}", timestamp, self.counter);
        self.counter += 1;

        RequestLog {
            id,
            timestamp,
            provider,
            model,
            method,
            path,
            status,
            duration_ms,
            // Access logs carry no token usage
            tokens_in: None,
            tokens_out: None,
            tokens_cached: None,
        }
    }
}

/// "6.656s" or "65ms" to milliseconds, anything else is 0
pub(crate) fn parse_duration(duration_str: &str) -> u64 {
    if let Some(ms) = duration_str.strip_suffix("ms") {
        ms.parse::<f64>().map(|v| v as u64).unwrap_or(0)
    } else if let Some(secs) = duration_str.strip_suffix('s') {
        let secs: f64 = secs.parse().unwrap_or(0.0);
        (secs * 1000.0) as u64
    } else {
        0
    }
}

fn extract_timestamp_from_line(line: &str) -> Option<u64> {
    let caps = TS_REGEX.captures(line)?;
    let datetime_str = format!("{} {}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
    parse_local_datetime(&datetime_str)
}

fn parse_local_datetime(datetime_str: &str) -> Option<u64> {
    let naive = chrono::NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S").ok()?;
    let local = naive.and_local_timezone(chrono::Local).earliest()?;
    u64::try_from(local.timestamp_millis()).ok()
}
