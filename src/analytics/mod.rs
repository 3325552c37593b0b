//! Analytics: aggregate complaint numbers for staff dashboards.

pub mod routes;
pub mod stats;

pub use stats::{AgingBuckets, AnalyticsSummary, ComplaintStats, DailyBucket, daily_series};
