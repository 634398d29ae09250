//! Replay a proxy access log into the request history.

use std::path::Path;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::Result;
use crate::helpers::log_parser::LogParser;
use crate::stores::RequestHistoryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub lines: usize,
    pub recorded: usize,
}

/// Parse every line of `log_path` and record the requests found, in file order.
pub async fn ingest_log_file(store: &RequestHistoryStore, log_path: &Path) -> Result<IngestReport> {
    let file = tokio::fs::File::open(log_path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut parser = LogParser::new();
    let mut report = IngestReport::default();

    while let Some(line) = lines.next_line().await? {
        report.lines += 1;
        if let Some(request) = parser.parse_line(&line) {
            store.add_request(request).await;
            report.recorded += 1;
        }
    }

    tracing::info!(
        path = %log_path.display(),
        lines = report.lines,
        recorded = report.recorded,
        "log ingested"
    );
    Ok(report)
}
