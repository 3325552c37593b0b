//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::assignment::rules::AssignmentRule;
use crate::complaints::model::{
    Category, Complaint, ComplaintComment, ComplaintFilter, Priority,
};
use crate::error::DatabaseError;
use crate::sla::SlaPolicy;

/// Backend-agnostic database trait covering complaints, rules, and reference data.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Complaints ──────────────────────────────────────────────────

    /// Insert a new complaint. Fails on duplicate ticket number.
    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), DatabaseError>;

    /// Get a complaint by ID.
    async fn get_complaint(&self, id: Uuid) -> Result<Option<Complaint>, DatabaseError>;

    /// Get a complaint by its ticket number.
    async fn get_complaint_by_ticket(
        &self,
        ticket_number: &str,
    ) -> Result<Option<Complaint>, DatabaseError>;

    /// List complaints matching `filter`, newest first.
    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<Complaint>, DatabaseError>;

    /// List complaints created at or after `since`.
    async fn list_complaints_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, DatabaseError>;

    /// Every open or in-progress complaint, newest first. Not paged.
    async fn list_unresolved(&self) -> Result<Vec<Complaint>, DatabaseError>;

    /// Overwrite the mutable fields of a complaint and return the stored row.
    /// A breach flag already set in storage is never cleared.
    async fn update_complaint(&self, complaint: &Complaint) -> Result<Complaint, DatabaseError>;

    /// Flag unresolved complaints whose SLA deadline has passed.
    /// Returns the newly flagged complaints.
    async fn mark_sla_breaches(&self, now: DateTime<Utc>) -> Result<Vec<Complaint>, DatabaseError>;

    /// Atomically bump and return the ticket sequence for `year`.
    async fn next_ticket_sequence(&self, year: i32) -> Result<u64, DatabaseError>;

    // ── Comments ────────────────────────────────────────────────────

    async fn insert_comment(&self, comment: &ComplaintComment) -> Result<(), DatabaseError>;

    /// Comments on a complaint, oldest first.
    async fn list_comments(
        &self,
        complaint_id: Uuid,
        include_internal: bool,
    ) -> Result<Vec<ComplaintComment>, DatabaseError>;

    // ── Categories ──────────────────────────────────────────────────

    async fn insert_category(&self, category: &Category) -> Result<(), DatabaseError>;

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, DatabaseError>;

    /// Categories ordered by name.
    async fn list_categories(&self, include_inactive: bool) -> Result<Vec<Category>, DatabaseError>;

    async fn update_category(&self, category: &Category) -> Result<(), DatabaseError>;

    /// Returns false if the category did not exist.
    async fn delete_category(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Assignment rules ────────────────────────────────────────────

    async fn insert_rule(&self, rule: &AssignmentRule) -> Result<(), DatabaseError>;

    async fn get_rule(&self, id: Uuid) -> Result<Option<AssignmentRule>, DatabaseError>;

    /// All rules, highest priority first.
    async fn list_rules(&self) -> Result<Vec<AssignmentRule>, DatabaseError>;

    /// Active rules only, highest priority first.
    async fn list_active_rules(&self) -> Result<Vec<AssignmentRule>, DatabaseError>;

    async fn update_rule(&self, rule: &AssignmentRule) -> Result<(), DatabaseError>;

    /// Returns false if the rule did not exist.
    async fn delete_rule(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── SLA policies ────────────────────────────────────────────────

    async fn list_sla_policies(&self) -> Result<Vec<SlaPolicy>, DatabaseError>;

    async fn get_sla_policy(&self, priority: Priority) -> Result<Option<SlaPolicy>, DatabaseError>;

    async fn upsert_sla_policy(&self, policy: &SlaPolicy) -> Result<(), DatabaseError>;
}
