//! Reference-data administration: assignment rules, categories, SLA policies.
//!
//! Rules and SLA policies are admin-only. Categories are readable by anyone
//! (students pick one when submitting) and writable by admins.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::rules::{AssignmentRule, ComplaintFacts, RuleConditions, RuleMatch, RuleSet};
use crate::complaints::model::{Category, Priority};
use crate::error::{ComplaintError, Result};
use crate::session::Session;
use crate::sla::SlaPolicy;
use crate::store::Database;

/// Maximum category name length in characters.
pub const MAX_CATEGORY_NAME_CHARS: usize = 100;

fn default_active() -> bool {
    true
}

/// Body for creating or replacing an assignment rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub conditions: RuleConditions,
    pub assigned_to: String,
}

impl RuleDraft {
    fn into_rule(self) -> AssignmentRule {
        let mut rule = AssignmentRule::new(self.name.trim(), self.priority, self.assigned_to.trim())
            .with_active(self.is_active);
        rule.conditions = self.conditions;
        rule
    }
}

/// Body for creating or replacing a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CategoryDraft {
    fn validate(&self) -> std::result::Result<(), ComplaintError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ComplaintError::invalid("name", "must not be empty"));
        }
        if name.chars().count() > MAX_CATEGORY_NAME_CHARS {
            return Err(ComplaintError::invalid(
                "name",
                format!("must be at most {MAX_CATEGORY_NAME_CHARS} characters"),
            ));
        }
        Ok(())
    }

    fn description(&self) -> Option<String> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}

/// Body for updating the SLA policy of one priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlaUpdate {
    pub response_hours: u32,
    pub resolution_hours: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Admin operations over the tables that drive routing and deadlines.
pub struct AdminService {
    db: Arc<dyn Database>,
}

impl AdminService {
    pub fn new(db: Arc<dyn Database>) -> Arc<Self> {
        Arc::new(Self { db })
    }

    // ── Assignment rules ────────────────────────────────────────────

    /// All rules, in evaluation order for the active ones.
    pub async fn list_rules(&self, session: &Session) -> Result<Vec<AssignmentRule>> {
        session.require_admin("view assignment rules")?;
        Ok(self.db.list_rules().await?)
    }

    pub async fn get_rule(&self, session: &Session, id: Uuid) -> Result<AssignmentRule> {
        session.require_admin("view assignment rules")?;
        self.db
            .get_rule(id)
            .await?
            .ok_or_else(|| ComplaintError::not_found("assignment rule", id).into())
    }

    pub async fn create_rule(&self, session: &Session, draft: RuleDraft) -> Result<AssignmentRule> {
        session.require_admin("manage assignment rules")?;
        let rule = draft.into_rule();
        self.check_rule(&rule).await?;
        self.db.insert_rule(&rule).await?;

        info!(
            id = %rule.id,
            name = %rule.name,
            priority = rule.priority,
            assigned_to = %rule.assigned_to,
            catch_all = rule.conditions.is_catch_all(),
            "Assignment rule created"
        );
        Ok(rule)
    }

    /// Replace a rule's definition, keeping its id and creation time.
    pub async fn update_rule(
        &self,
        session: &Session,
        id: Uuid,
        draft: RuleDraft,
    ) -> Result<AssignmentRule> {
        session.require_admin("manage assignment rules")?;
        let existing = self.get_rule(session, id).await?;

        let mut rule = draft.into_rule();
        rule.id = existing.id;
        rule.created_at = existing.created_at;
        rule.updated_at = Utc::now();
        self.check_rule(&rule).await?;
        self.db.update_rule(&rule).await?;

        info!(id = %rule.id, name = %rule.name, active = rule.is_active, "Assignment rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, session: &Session, id: Uuid) -> Result<()> {
        session.require_admin("manage assignment rules")?;
        if !self.db.delete_rule(id).await? {
            return Err(ComplaintError::not_found("assignment rule", id).into());
        }
        info!(id = %id, "Assignment rule deleted");
        Ok(())
    }

    /// Dry-run the active rule set against hypothetical complaint fields.
    pub async fn preview(&self, session: &Session, facts: &ComplaintFacts) -> Result<Option<RuleMatch>> {
        session.require_admin("preview assignment rules")?;
        let rules = RuleSet::new(self.db.list_active_rules().await?);
        Ok(rules.select_assignee(facts))
    }

    async fn check_rule(&self, rule: &AssignmentRule) -> Result<()> {
        rule.validate()?;
        if let Some(category_id) = rule.conditions.category_id {
            if self.db.get_category(category_id).await?.is_none() {
                return Err(ComplaintError::UnknownReference {
                    entity: "category",
                    id: category_id,
                }
                .into());
            }
        }
        Ok(())
    }

    // ── Categories ──────────────────────────────────────────────────

    /// Inactive categories are only listed for staff who ask for them.
    pub async fn list_categories(
        &self,
        session: &Session,
        include_inactive: bool,
    ) -> Result<Vec<Category>> {
        let include_inactive = include_inactive && session.is_staff();
        Ok(self.db.list_categories(include_inactive).await?)
    }

    pub async fn create_category(&self, session: &Session, draft: CategoryDraft) -> Result<Category> {
        session.require_admin("manage categories")?;
        draft.validate()?;

        let mut category = Category::new(draft.name.trim());
        category.description = draft.description();
        category.is_active = draft.is_active;
        self.db.insert_category(&category).await?;

        info!(id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        session: &Session,
        id: Uuid,
        draft: CategoryDraft,
    ) -> Result<Category> {
        session.require_admin("manage categories")?;
        draft.validate()?;

        let mut category = self
            .db
            .get_category(id)
            .await?
            .ok_or_else(|| ComplaintError::not_found("category", id))?;
        category.name = draft.name.trim().to_string();
        category.description = draft.description();
        category.is_active = draft.is_active;
        self.db.update_category(&category).await?;

        info!(id = %id, name = %category.name, active = category.is_active, "Category updated");
        Ok(category)
    }

    /// Delete a category. Complaints that used it become uncategorized.
    pub async fn delete_category(&self, session: &Session, id: Uuid) -> Result<()> {
        session.require_admin("manage categories")?;
        if !self.db.delete_category(id).await? {
            return Err(ComplaintError::not_found("category", id).into());
        }
        info!(id = %id, "Category deleted");
        Ok(())
    }

    // ── SLA policies ────────────────────────────────────────────────

    /// One policy per priority, most urgent first. Missing rows fall back to defaults.
    pub async fn list_sla_policies(&self, session: &Session) -> Result<Vec<SlaPolicy>> {
        session.require_staff("view SLA policies")?;
        let stored = self.db.list_sla_policies().await?;
        let mut policies: Vec<SlaPolicy> = Priority::ALL
            .into_iter()
            .map(|priority| {
                stored
                    .iter()
                    .find(|p| p.priority == priority)
                    .cloned()
                    .unwrap_or_else(|| SlaPolicy::default_for(priority))
            })
            .collect();
        policies.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(policies)
    }

    /// The policy in force for one priority: the stored row, or the default.
    pub async fn get_sla_policy(&self, session: &Session, priority: Priority) -> Result<SlaPolicy> {
        session.require_staff("view SLA policies")?;
        Ok(self
            .db
            .get_sla_policy(priority)
            .await?
            .unwrap_or_else(|| SlaPolicy::default_for(priority)))
    }

    pub async fn update_sla_policy(
        &self,
        session: &Session,
        priority: Priority,
        update: SlaUpdate,
    ) -> Result<SlaPolicy> {
        session.require_admin("manage SLA policies")?;
        let policy = SlaPolicy {
            priority,
            response_hours: update.response_hours,
            resolution_hours: update.resolution_hours,
            is_active: update.is_active,
        };
        policy.validate()?;
        self.db.upsert_sla_policy(&policy).await?;

        info!(
            priority = %priority,
            response_hours = policy.response_hours,
            resolution_hours = policy.resolution_hours,
            "SLA policy updated"
        );
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::model::NewComplaint;
    use crate::complaints::service::ComplaintService;
    use crate::error::{AuthError, DatabaseError, Error};
    use crate::store::LibSqlBackend;

    async fn admin_service() -> Arc<AdminService> {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        AdminService::new(db)
    }

    fn draft(name: &str, priority: i32, assigned_to: &str) -> RuleDraft {
        RuleDraft {
            name: name.into(),
            priority,
            is_active: true,
            conditions: RuleConditions::default(),
            assigned_to: assigned_to.into(),
        }
    }

    fn facts(priority: Priority) -> ComplaintFacts {
        ComplaintFacts {
            category_id: None,
            priority,
            title: "Broken AC".into(),
            description: "room is hot".into(),
        }
    }

    #[tokio::test]
    async fn rules_are_admin_only() {
        let svc = admin_service().await;
        let err = svc
            .create_rule(&Session::staff("s1"), draft("r", 1, "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Forbidden { .. })));
        assert!(svc.list_rules(&Session::student("u")).await.is_err());
    }

    #[tokio::test]
    async fn create_update_delete_rule() {
        let svc = admin_service().await;
        let admin = Session::admin("root");

        let rule = svc.create_rule(&admin, draft(" default ", 0, " desk ")).await.unwrap();
        assert_eq!(rule.name, "default");
        assert_eq!(rule.assigned_to, "desk");

        let mut changed = draft("default", 3, "desk2");
        changed.conditions.priority = Some(Priority::High);
        let updated = svc.update_rule(&admin, rule.id, changed).await.unwrap();
        assert_eq!(updated.id, rule.id);
        assert_eq!(updated.created_at, rule.created_at);
        assert_eq!(updated.conditions.priority, Some(Priority::High));

        svc.delete_rule(&admin, rule.id).await.unwrap();
        let err = svc.delete_rule(&admin, rule.id).await.unwrap_err();
        assert!(matches!(err, Error::Complaint(ComplaintError::NotFound { .. })));
    }

    #[tokio::test]
    async fn rule_with_unknown_category_rejected() {
        let svc = admin_service().await;
        let mut d = draft("hostel", 1, "warden");
        d.conditions.category_id = Some(Uuid::new_v4());
        let err = svc.create_rule(&Session::admin("root"), d).await.unwrap_err();
        assert!(matches!(err, Error::Complaint(ComplaintError::UnknownReference { .. })));
    }

    #[tokio::test]
    async fn preview_uses_active_rules_in_order() {
        let svc = admin_service().await;
        let admin = Session::admin("root");
        assert!(svc.preview(&admin, &facts(Priority::Low)).await.unwrap().is_none());

        let mut urgent = draft("urgent", 10, "oncall");
        urgent.conditions.priority = Some(Priority::Urgent);
        svc.create_rule(&admin, urgent).await.unwrap();
        svc.create_rule(&admin, draft("fallback", 0, "desk")).await.unwrap();
        let mut disabled = draft("disabled", 99, "ghost");
        disabled.is_active = false;
        svc.create_rule(&admin, disabled).await.unwrap();

        let hit = svc.preview(&admin, &facts(Priority::Urgent)).await.unwrap().unwrap();
        assert_eq!(hit.assigned_to, "oncall");
        let fallback = svc.preview(&admin, &facts(Priority::Low)).await.unwrap().unwrap();
        assert_eq!(fallback.rule_name, "fallback");
    }

    #[tokio::test]
    async fn categories_lifecycle() {
        let svc = admin_service().await;
        let admin = Session::admin("root");
        let student = Session::student("u");

        let hostel = svc
            .create_category(
                &admin,
                CategoryDraft {
                    name: "Hostel".into(),
                    description: Some("  ".into()),
                    is_active: true,
                },
            )
            .await
            .unwrap();
        assert!(hostel.description.is_none());

        let err = svc
            .create_category(
                &admin,
                CategoryDraft {
                    name: "HOSTEL".into(),
                    description: None,
                    is_active: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::Constraint(_))));

        svc.update_category(
            &admin,
            hostel.id,
            CategoryDraft {
                name: "Hostel".into(),
                description: None,
                is_active: false,
            },
        )
        .await
        .unwrap();

        // Students never see inactive categories, even when asking.
        assert!(svc.list_categories(&student, true).await.unwrap().is_empty());
        assert_eq!(svc.list_categories(&admin, true).await.unwrap().len(), 1);

        assert!(svc.create_category(&student, CategoryDraft {
            name: "Nope".into(),
            description: None,
            is_active: true,
        }).await.is_err());

        svc.delete_category(&admin, hostel.id).await.unwrap();
        assert!(svc.delete_category(&admin, hostel.id).await.is_err());
    }

    #[tokio::test]
    async fn sla_policies_listed_and_updated() {
        let svc = admin_service().await;
        let staff = Session::staff("s1");
        let admin = Session::admin("root");

        let policies = svc.list_sla_policies(&staff).await.unwrap();
        let order: Vec<Priority> = policies.iter().map(|p| p.priority).collect();
        assert_eq!(
            order,
            vec![Priority::Urgent, Priority::High, Priority::Medium, Priority::Low]
        );

        let update = SlaUpdate {
            response_hours: 2,
            resolution_hours: 12,
            is_active: true,
        };
        assert!(svc.update_sla_policy(&staff, Priority::Urgent, update.clone()).await.is_err());
        let saved = svc.update_sla_policy(&admin, Priority::Urgent, update).await.unwrap();
        assert_eq!(saved.resolution_hours, 12);

        let inverted = SlaUpdate {
            response_hours: 20,
            resolution_hours: 10,
            is_active: true,
        };
        assert!(svc.update_sla_policy(&admin, Priority::Low, inverted).await.is_err());

        let fetched = svc.get_sla_policy(&staff, Priority::Urgent).await.unwrap();
        assert_eq!(fetched.resolution_hours, 12);
        assert!(svc.get_sla_policy(&Session::student("u"), Priority::Urgent).await.is_err());
    }

    #[tokio::test]
    async fn oversized_sla_window_rejected_and_submission_survives() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let admin_svc = AdminService::new(Arc::clone(&db));
        let complaints = ComplaintService::new(db, "CMP");
        let admin = Session::admin("root");

        let huge = SlaUpdate {
            response_hours: 1,
            resolution_hours: u32::MAX,
            is_active: true,
        };
        let err = admin_svc
            .update_sla_policy(&admin, Priority::Low, huge)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Complaint(ComplaintError::Validation { .. })));

        let stored = admin_svc.get_sla_policy(&admin, Priority::Low).await.unwrap();
        assert_eq!(stored, SlaPolicy::default_for(Priority::Low));

        let complaint = complaints
            .submit(
                &Session::student("alice"),
                NewComplaint::new("Noise", "loud music").with_priority(Priority::Low),
            )
            .await
            .unwrap();
        assert!(complaint.resolution_due_at.is_some());
    }
}
