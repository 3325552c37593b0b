//! Complaint aggregation: counts, resolution time, SLA breach rate, aging,
//! and a daily submitted/resolved series.
//!
//! Everything here is a single pass over complaints already fetched from
//! the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::complaints::model::{Complaint, ComplaintStatus, Priority};

/// Open-complaint age buckets, in whole days since submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingBuckets {
    pub days_0_3: u64,
    pub days_4_7: u64,
    pub days_8_14: u64,
    pub days_15_30: u64,
    pub days_30_plus: u64,
}

impl AgingBuckets {
    fn record(&mut self, age_days: i64) {
        match age_days {
            i64::MIN..=3 => self.days_0_3 += 1,
            4..=7 => self.days_4_7 += 1,
            8..=14 => self.days_8_14 += 1,
            15..=30 => self.days_15_30 += 1,
            _ => self.days_30_plus += 1,
        }
    }
}

/// Summary statistics over a set of complaints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplaintStats {
    pub total: u64,
    /// Open or in progress.
    pub unresolved: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    /// Keyed by category id; uncategorized complaints under `"none"`.
    pub by_category: BTreeMap<String, u64>,
    /// Mean hours from submission to resolution, over resolved complaints.
    pub avg_resolution_hours: Option<f64>,
    pub sla_breached: u64,
    /// `sla_breached / total`, 0 when there are no complaints.
    pub sla_breach_rate: f64,
    pub aging: AgingBuckets,
}

impl ComplaintStats {
    pub fn from_complaints(complaints: &[Complaint], now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();
        for status in ComplaintStatus::ALL {
            stats.by_status.insert(status.as_str().to_string(), 0);
        }
        for priority in Priority::ALL {
            stats.by_priority.insert(priority.as_str().to_string(), 0);
        }

        let mut resolution_hours_sum = 0.0;
        let mut resolved_count = 0u64;

        for complaint in complaints {
            stats.total += 1;
            *stats
                .by_status
                .entry(complaint.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_priority
                .entry(complaint.priority.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_category
                .entry(category_key(complaint.category_id))
                .or_default() += 1;

            if complaint.status.is_unresolved() {
                stats.unresolved += 1;
                stats.aging.record((now - complaint.created_at).num_days());
            }
            if complaint.sla_breached {
                stats.sla_breached += 1;
            }
            if let Some(hours) = complaint.resolution_hours() {
                resolution_hours_sum += hours;
                resolved_count += 1;
            }
        }

        if resolved_count > 0 {
            stats.avg_resolution_hours = Some(resolution_hours_sum / resolved_count as f64);
        }
        if stats.total > 0 {
            stats.sla_breach_rate = stats.sla_breached as f64 / stats.total as f64;
        }
        stats
    }
}

fn category_key(category_id: Option<Uuid>) -> String {
    category_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// One UTC day of activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub submitted: u64,
    pub resolved: u64,
}

/// Submitted/resolved counts per day for the `days` days ending today (UTC),
/// oldest first. Events outside the window are ignored.
pub fn daily_series(complaints: &[Complaint], days: u32, now: DateTime<Utc>) -> Vec<DailyBucket> {
    if days == 0 {
        return Vec::new();
    }
    let today = now.date_naive();
    let first = today - Duration::days(i64::from(days) - 1);

    let mut buckets: Vec<DailyBucket> = first
        .iter_days()
        .take(days as usize)
        .map(|date| DailyBucket {
            date,
            submitted: 0,
            resolved: 0,
        })
        .collect();

    let slot = |at: DateTime<Utc>| -> Option<usize> {
        let date = at.date_naive();
        if date < first || date > today {
            return None;
        }
        usize::try_from((date - first).num_days()).ok()
    };

    for complaint in complaints {
        if let Some(i) = slot(complaint.created_at) {
            buckets[i].submitted += 1;
        }
        if let Some(i) = complaint.resolved_at.and_then(slot) {
            buckets[i].resolved += 1;
        }
    }
    buckets
}

/// Analytics payload returned to dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub window_days: u32,
    pub generated_at: DateTime<Utc>,
    pub stats: ComplaintStats,
    pub daily: Vec<DailyBucket>,
}

impl AnalyticsSummary {
    pub fn build(complaints: &[Complaint], window_days: u32, now: DateTime<Utc>) -> Self {
        Self {
            window_days,
            generated_at: now,
            stats: ComplaintStats::from_complaints(complaints, now),
            daily: daily_series(complaints, window_days, now),
        }
    }
}
