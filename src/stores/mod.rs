pub mod requests;

pub use requests::{RequestHistoryStore, TodayStats, TotalStats};
