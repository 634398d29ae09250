//! Persistence side of the request history.
//!
//! The store only ever talks to a [`HistoryBackend`]; production code uses
//! [`FileHistoryBackend`], tests plug in their own.

mod file;

pub use file::FileHistoryBackend;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RequestHistory, RequestLog};

#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Persist one completed request. Returns the entry as stored.
    async fn add_request_to_history(&self, entry: &RequestLog) -> Result<RequestLog>;

    /// Fetch the full persisted snapshot.
    async fn get_request_history(&self) -> Result<RequestHistory>;

    /// Wipe the persisted history.
    async fn clear_request_history(&self) -> Result<()>;
}
