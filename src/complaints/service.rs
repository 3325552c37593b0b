//! Complaint service: submission, lifecycle, assignment, comments, SLA sweep.
//!
//! Every operation takes the caller's `Session` explicitly. Changes are
//! persisted first, then broadcast to WebSocket subscribers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{
    Complaint, ComplaintComment, ComplaintEvent, ComplaintFilter, ComplaintStatus, NewComplaint,
};
use super::ticket::TicketNumber;
use crate::analytics::stats::AnalyticsSummary;
use crate::assignment::rules::RuleSet;
use crate::error::{ComplaintError, Result};
use crate::session::Session;
use crate::sla::policy_for;
use crate::store::Database;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Maximum comment length in characters.
pub const MAX_COMMENT_CHARS: usize = 5000;

/// Upper bound on a single list page.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Longest analytics window, in days.
pub const MAX_ANALYTICS_DAYS: u32 = 365;

/// Complaint operations backed by a `Database`, with fan-out to WS clients.
pub struct ComplaintService {
    db: Arc<dyn Database>,
    tx: broadcast::Sender<ComplaintEvent>,
    ticket_prefix: String,
}

impl ComplaintService {
    pub fn new(db: Arc<dyn Database>, ticket_prefix: impl Into<String>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            db,
            tx,
            ticket_prefix: ticket_prefix.into(),
        })
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Subscribe to complaint events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<ComplaintEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: ComplaintEvent) {
        // Ok if no receivers are listening
        let _ = self.tx.send(event);
    }

    /// Submit a complaint: allocate a ticket, set SLA deadlines, and route it
    /// through the active assignment rules once.
    pub async fn submit(&self, session: &Session, new: NewComplaint) -> Result<Complaint> {
        new.validate()?;

        if let Some(category_id) = new.category_id {
            match self.db.get_category(category_id).await? {
                Some(category) if category.is_active => {}
                _ => {
                    return Err(ComplaintError::UnknownReference {
                        entity: "category",
                        id: category_id,
                    }
                    .into());
                }
            }
        }

        let year = Utc::now().year();
        let sequence = self.db.next_ticket_sequence(year).await?;
        let ticket = TicketNumber::new(self.ticket_prefix.as_str(), year, sequence);

        let complaint = Complaint::from_new(session.user_id.as_str(), ticket.to_string(), new);
        let policies = self.db.list_sla_policies().await?;
        let policy = policy_for(&policies, complaint.priority);
        let mut complaint = complaint.with_sla(&policy)?;

        let rules = RuleSet::new(self.db.list_active_rules().await?);
        match rules.select_assignee(&complaint.facts()) {
            Some(routed) => complaint = complaint.with_assignment(&routed),
            None => debug!(ticket = %complaint.ticket_number, rules = rules.len(), "No assignment rule matched"),
        }

        self.db.insert_complaint(&complaint).await?;

        info!(
            id = %complaint.id,
            ticket = %complaint.ticket_number,
            student = %complaint.student_id,
            priority = %complaint.priority,
            assigned_to = complaint.assigned_to.as_deref().unwrap_or("-"),
            "Complaint submitted"
        );

        self.publish(ComplaintEvent::ComplaintCreated {
            complaint: complaint.clone(),
        });
        Ok(complaint)
    }

    /// Load a complaint the caller may see. Hidden complaints read as missing.
    async fn load(&self, session: &Session, id: Uuid) -> Result<Complaint> {
        match self.db.get_complaint(id).await? {
            Some(complaint) if session.can_view(&complaint) => Ok(complaint),
            _ => Err(ComplaintError::not_found("complaint", id).into()),
        }
    }

    pub async fn get(&self, session: &Session, id: Uuid) -> Result<Complaint> {
        self.load(session, id).await
    }

    pub async fn get_by_ticket(&self, session: &Session, ticket: &str) -> Result<Complaint> {
        let ticket: TicketNumber = ticket.parse()?;
        let ticket = ticket.to_string();
        match self.db.get_complaint_by_ticket(&ticket).await? {
            Some(complaint) if session.can_view(&complaint) => Ok(complaint),
            _ => Err(ComplaintError::not_found("complaint", ticket).into()),
        }
    }

    /// List complaints, newest first. Students only ever see their own.
    pub async fn list(&self, session: &Session, mut filter: ComplaintFilter) -> Result<Vec<Complaint>> {
        if !session.is_staff() {
            filter.student_id = Some(session.user_id.clone());
        }
        filter.limit = filter.limit.map(|l| l.clamp(1, MAX_LIST_LIMIT));
        Ok(self.db.list_complaints(&filter).await?)
    }

    /// Open and in-progress complaints, newest first.
    pub async fn unresolved(&self) -> Result<Vec<Complaint>> {
        Ok(self.db.list_unresolved().await?)
    }

    pub async fn update_status(
        &self,
        session: &Session,
        id: Uuid,
        status: ComplaintStatus,
    ) -> Result<Complaint> {
        session.require_staff("change complaint status")?;

        let mut complaint = self.load(session, id).await?;
        let from = complaint.status;
        complaint.transition(status, Utc::now())?;
        let complaint = self.db.update_complaint(&complaint).await?;

        info!(id = %id, from = %from, to = %status, by = %session.user_id, "Complaint status changed");
        self.publish(ComplaintEvent::ComplaintUpdated {
            complaint: complaint.clone(),
        });
        Ok(complaint)
    }

    /// Manually (re)assign a complaint. Admins may assign anyone or clear the
    /// assignee; staff may only take a complaint themselves.
    pub async fn assign(
        &self,
        session: &Session,
        id: Uuid,
        assignee: Option<String>,
    ) -> Result<Complaint> {
        let assignee = assignee.map(|a| a.trim().to_string());
        if assignee.as_deref() == Some("") {
            return Err(ComplaintError::invalid("assigned_to", "must not be blank").into());
        }

        if !session.is_admin() {
            session.require_staff("assign complaints")?;
            if assignee.as_deref() != Some(session.user_id.as_str()) {
                return Err(session.forbidden("assign complaints to others").into());
            }
        }

        let mut complaint = self.load(session, id).await?;
        if complaint.status.is_terminal() {
            return Err(ComplaintError::invalid(
                "status",
                format!("{} complaints cannot be reassigned", complaint.status),
            )
            .into());
        }

        complaint.assigned_to = assignee;
        complaint.assignment_rule_id = None;
        complaint.updated_at = Utc::now();
        let complaint = self.db.update_complaint(&complaint).await?;

        info!(
            id = %id,
            assigned_to = complaint.assigned_to.as_deref().unwrap_or("-"),
            by = %session.user_id,
            "Complaint assigned"
        );
        self.publish(ComplaintEvent::ComplaintUpdated {
            complaint: complaint.clone(),
        });
        Ok(complaint)
    }

    /// Add a comment. Internal notes are staff-only; the first public staff
    /// comment counts as the first response.
    pub async fn add_comment(
        &self,
        session: &Session,
        id: Uuid,
        body: &str,
        is_internal: bool,
    ) -> Result<ComplaintComment> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ComplaintError::invalid("body", "must not be empty").into());
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(ComplaintError::invalid(
                "body",
                format!("must be at most {MAX_COMMENT_CHARS} characters"),
            )
            .into());
        }
        if is_internal && !session.is_staff() {
            return Err(session.forbidden("post internal notes").into());
        }

        let mut complaint = self.load(session, id).await?;
        let comment = ComplaintComment::new(complaint.id, session.user_id.as_str(), body, is_internal);
        self.db.insert_comment(&comment).await?;
        debug!(complaint = %id, comment = %comment.id, internal = is_internal, "Comment added");

        if session.is_staff() && !is_internal && complaint.first_response_at.is_none() {
            complaint.mark_responded(comment.created_at);
            let complaint = self.db.update_complaint(&complaint).await?;
            self.publish(ComplaintEvent::ComplaintUpdated { complaint });
        }

        self.publish(ComplaintEvent::CommentAdded {
            comment: comment.clone(),
        });
        Ok(comment)
    }

    /// Timeline of a complaint, oldest first. Students never see internal notes.
    pub async fn comments(&self, session: &Session, id: Uuid) -> Result<Vec<ComplaintComment>> {
        let complaint = self.load(session, id).await?;
        Ok(self
            .db
            .list_comments(complaint.id, session.is_staff())
            .await?)
    }

    /// Flag unresolved complaints that are past an SLA deadline.
    /// Returns how many were newly flagged.
    pub async fn sweep_sla_breaches(&self, now: DateTime<Utc>) -> Result<usize> {
        let flagged = self.db.mark_sla_breaches(now).await?;
        for complaint in &flagged {
            warn!(
                id = %complaint.id,
                ticket = %complaint.ticket_number,
                priority = %complaint.priority,
                "SLA breached"
            );
        }
        let count = flagged.len();
        for complaint in flagged {
            self.publish(ComplaintEvent::ComplaintUpdated { complaint });
        }
        Ok(count)
    }

    /// Dashboard numbers over complaints submitted in the last `days` days.
    pub async fn analytics(&self, session: &Session, days: u32) -> Result<AnalyticsSummary> {
        session.require_staff("view analytics")?;
        if days == 0 || days > MAX_ANALYTICS_DAYS {
            return Err(ComplaintError::invalid(
                "days",
                format!("must be between 1 and {MAX_ANALYTICS_DAYS}"),
            )
            .into());
        }

        let now = Utc::now();
        let first_day = now.date_naive() - chrono::Duration::days(i64::from(days) - 1);
        let since = first_day.and_time(NaiveTime::MIN).and_utc();
        let complaints = self.db.list_complaints_since(since).await?;

        Ok(AnalyticsSummary::build(&complaints, days, now))
    }
}

/// Spawn a background task that periodically flags SLA breaches.
pub fn spawn_sla_sweep(
    service: Arc<ComplaintService>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            match service.sweep_sla_breaches(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => info!(count, "Flagged SLA breaches"),
                Err(e) => warn!(error = %e, "SLA sweep failed"),
            }
        }
    })
}
