//! Complaint data model: complaints, categories, comments, and WebSocket events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assignment::rules::{ComplaintFacts, RuleMatch};
use crate::error::ComplaintError;
use crate::sla::SlaPolicy;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Complaint priority. Ordered: `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ComplaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ComplaintError::invalid(
                "priority",
                format!("unknown priority {other:?}"),
            )),
        }
    }
}

/// Lifecycle status of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 5] = [
        Self::Open,
        Self::InProgress,
        Self::Resolved,
        Self::Closed,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }

    /// Still waiting on staff (counts toward SLA).
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }

    /// Whether `self -> next` is an allowed move.
    pub fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;
        matches!(
            (self, next),
            (Open, InProgress | Resolved | Rejected)
                | (InProgress, Open | Resolved | Rejected)
                | (Resolved, Closed | InProgress)
        )
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = ComplaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ComplaintError::invalid("status", format!("unknown status {s:?}")))
    }
}

/// A student complaint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    /// Unique ID.
    pub id: Uuid,
    /// Human-facing ticket number, e.g. `CMP-2026-00042`.
    pub ticket_number: String,
    /// Student who submitted the complaint.
    pub student_id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    pub priority: Priority,
    pub status: ComplaintStatus,
    /// Staff member handling the complaint (None = unassigned).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Rule that routed the complaint at creation time, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_rule_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_response_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Sticky once set by the SLA sweep.
    pub sla_breached: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Complaint {
    /// Build an open, unassigned complaint from a validated submission.
    pub fn from_new(
        student_id: impl Into<String>,
        ticket_number: impl Into<String>,
        new: NewComplaint,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticket_number: ticket_number.into(),
            student_id: student_id.into(),
            title: new.title.trim().to_string(),
            description: new.description.trim().to_string(),
            category_id: new.category_id,
            priority: new.priority,
            status: ComplaintStatus::Open,
            assigned_to: None,
            assignment_rule_id: None,
            response_due_at: None,
            resolution_due_at: None,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            sla_breached: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set SLA deadlines from a policy.
    pub fn with_sla(mut self, policy: &SlaPolicy) -> Result<Self, ComplaintError> {
        let (response, resolution) = policy.deadlines(self.created_at)?;
        self.response_due_at = Some(response);
        self.resolution_due_at = Some(resolution);
        Ok(self)
    }

    /// Builder: record the routing decision.
    pub fn with_assignment(mut self, routed: &RuleMatch) -> Self {
        self.assigned_to = Some(routed.assigned_to.clone());
        self.assignment_rule_id = Some(routed.rule_id);
        self
    }

    /// The fields assignment rules are matched against.
    pub fn facts(&self) -> ComplaintFacts {
        ComplaintFacts {
            category_id: self.category_id,
            priority: self.priority,
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    /// Move to `next`, stamping lifecycle timestamps.
    pub fn transition(
        &mut self,
        next: ComplaintStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ComplaintError> {
        if !self.status.can_transition_to(next) {
            return Err(ComplaintError::InvalidTransition {
                id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        if self.status == ComplaintStatus::Open && self.first_response_at.is_none() {
            self.first_response_at = Some(now);
        }
        match next {
            ComplaintStatus::Resolved => self.resolved_at = Some(now),
            ComplaintStatus::Closed => self.closed_at = Some(now),
            ComplaintStatus::InProgress | ComplaintStatus::Open => self.resolved_at = None,
            ComplaintStatus::Rejected => {}
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record the first staff response if none yet.
    pub fn mark_responded(&mut self, now: DateTime<Utc>) {
        if self.first_response_at.is_none() {
            self.first_response_at = Some(now);
            self.updated_at = now;
        }
    }

    /// Whether an SLA deadline has passed without being met.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_unresolved() {
            return false;
        }
        let response_missed = self.first_response_at.is_none()
            && self.response_due_at.is_some_and(|due| now > due);
        let resolution_missed = self.resolution_due_at.is_some_and(|due| now > due);
        response_missed || resolution_missed
    }

    /// Hours from submission to resolution, if resolved.
    pub fn resolution_hours(&self) -> Option<f64> {
        self.resolved_at
            .map(|at| (at - self.created_at).num_seconds().max(0) as f64 / 3600.0)
    }
}

/// A complaint as submitted by a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewComplaint {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category_id: None,
            priority: Priority::default(),
        }
    }

    /// Builder: set category.
    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Builder: set priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Field-level checks that don't need the database.
    pub fn validate(&self) -> Result<(), ComplaintError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ComplaintError::invalid("title", "must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ComplaintError::invalid(
                "title",
                format!("must be at most {MAX_TITLE_CHARS} characters"),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(ComplaintError::invalid("description", "must not be empty"));
        }
        Ok(())
    }
}

/// A comment on a complaint's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintComment {
    pub id: Uuid,
    pub complaint_id: Uuid,
    pub author_id: String,
    pub body: String,
    /// Staff-only note, hidden from the student.
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

impl ComplaintComment {
    pub fn new(
        complaint_id: Uuid,
        author_id: impl Into<String>,
        body: impl Into<String>,
        is_internal: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            complaint_id,
            author_id: author_id.into(),
            body: body.into(),
            is_internal,
            created_at: Utc::now(),
        }
    }
}

/// A complaint category (e.g. "Hostel", "Academics").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Query filter for listing complaints. All fields optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplaintFilter {
    #[serde(default)]
    pub status: Option<ComplaintStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Messages sent over the complaint WebSocket (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComplaintEvent {
    /// Full sync of unresolved complaints (sent on connect and after lag).
    ComplaintsSync { complaints: Vec<Complaint> },
    /// A complaint was submitted.
    ComplaintCreated { complaint: Complaint },
    /// Status, assignment, or SLA flag changed.
    ComplaintUpdated { complaint: Complaint },
    /// A comment was added.
    CommentAdded { comment: ComplaintComment },
}
