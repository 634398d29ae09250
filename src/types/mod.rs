//! Shared data types.

pub mod usage;

pub use usage::{
    Aggregate, ModelStats, ModelUsage, ProviderUsage, RequestHistory, RequestLog, TimeSeriesPoint,
    UsageStats,
};

/// Number of requests kept in the retained window.
pub const MAX_HISTORY_SIZE: usize = 500;

/// Number of requests shown by the recent view.
pub const RECENT_REQUESTS_LIMIT: usize = 100;

/// Hourly series keep seven days of points.
pub const MAX_HOURLY_POINTS: usize = 168;

/// Daily series shown in usage stats.
pub const MAX_DAILY_POINTS: usize = 14;
