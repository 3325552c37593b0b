//! SLA policies: response/resolution deadlines keyed by priority.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::complaints::model::Priority;
use crate::error::ComplaintError;

/// Longest window a policy may set: ten years.
pub const MAX_SLA_HOURS: u32 = 24 * 365 * 10;

/// Deadline policy for one priority level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub priority: Priority,
    /// Hours until a first staff response is due.
    pub response_hours: u32,
    /// Hours until resolution is due.
    pub resolution_hours: u32,
    pub is_active: bool,
}

impl SlaPolicy {
    pub fn new(priority: Priority, response_hours: u32, resolution_hours: u32) -> Self {
        Self {
            priority,
            response_hours,
            resolution_hours,
            is_active: true,
        }
    }

    /// Built-in policy used when the database has none for a priority.
    pub fn default_for(priority: Priority) -> Self {
        match priority {
            Priority::Urgent => Self::new(priority, 1, 24),
            Priority::High => Self::new(priority, 4, 72),
            Priority::Medium => Self::new(priority, 24, 120),
            Priority::Low => Self::new(priority, 48, 240),
        }
    }

    /// `(response_due_at, resolution_due_at)` for a complaint created at `created_at`.
    pub fn deadlines(
        &self,
        created_at: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), ComplaintError> {
        let due = |hours: u32| {
            created_at
                .checked_add_signed(Duration::hours(i64::from(hours)))
                .ok_or_else(|| {
                    ComplaintError::invalid("sla", format!("{hours}h deadline is out of range"))
                })
        };
        Ok((due(self.response_hours)?, due(self.resolution_hours)?))
    }

    pub fn validate(&self) -> Result<(), ComplaintError> {
        if self.response_hours == 0 || self.resolution_hours == 0 {
            return Err(ComplaintError::invalid("sla", "hours must be positive"));
        }
        if self.resolution_hours > MAX_SLA_HOURS {
            return Err(ComplaintError::invalid(
                "sla",
                format!("windows are capped at {MAX_SLA_HOURS} hours"),
            ));
        }
        if self.response_hours > self.resolution_hours {
            return Err(ComplaintError::invalid(
                "sla",
                "response window cannot exceed resolution window",
            ));
        }
        Ok(())
    }
}

/// Pick the active policy for `priority`, falling back to the built-in default.
pub fn policy_for(policies: &[SlaPolicy], priority: Priority) -> SlaPolicy {
    policies
        .iter()
        .find(|p| p.priority == priority && p.is_active)
        .cloned()
        .unwrap_or_else(|| SlaPolicy::default_for(priority))
}
