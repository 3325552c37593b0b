//! Assignment rules: routes a newly submitted complaint to a staff member.
//!
//! Rules are ranked by `priority` (higher first). Each rule carries a
//! fixed-schema set of optional conditions:
//! - `category_id` → must equal the complaint's category
//! - `priority` → must equal the complaint's priority
//! - `keywords` → any one must appear (case-insensitive) in title or description
//!
//! The first matching rule wins. A rule with no conditions is a catch-all.
//! No match leaves the complaint unassigned.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::complaints::model::Priority;
use crate::error::ComplaintError;

/// The complaint fields a rule can look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintFacts {
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub priority: Priority,
    pub title: String,
    pub description: String,
}

/// Conditions on a rule. Absent conditions always hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl RuleConditions {
    /// No conditions set: matches every complaint.
    pub fn is_catch_all(&self) -> bool {
        self.category_id.is_none() && self.priority.is_none() && self.keywords.is_empty()
    }

    /// Evaluate category, then priority, then keywords.
    pub fn matches(&self, facts: &ComplaintFacts) -> bool {
        if let Some(category) = self.category_id {
            if facts.category_id != Some(category) {
                return false;
            }
        }

        if let Some(priority) = self.priority {
            if facts.priority != priority {
                return false;
            }
        }

        if !self.keywords.is_empty() && !self.keywords_match(facts) {
            return false;
        }

        true
    }

    /// Any keyword found in title or description. Blank keywords never match.
    fn keywords_match(&self, facts: &ComplaintFacts) -> bool {
        let title = facts.title.to_lowercase();
        let description = facts.description.to_lowercase();

        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| title.contains(&k) || description.contains(&k))
    }
}

/// A ranked routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRule {
    pub id: Uuid,
    pub name: String,
    /// Higher is evaluated first.
    pub priority: i32,
    pub is_active: bool,
    pub conditions: RuleConditions,
    /// Staff member complaints are routed to.
    pub assigned_to: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentRule {
    /// Create an active catch-all rule.
    pub fn new(name: impl Into<String>, priority: i32, assigned_to: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            priority,
            is_active: true,
            conditions: RuleConditions::default(),
            assigned_to: assigned_to.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: require a category.
    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.conditions.category_id = Some(category_id);
        self
    }

    /// Builder: require a priority.
    pub fn with_priority_condition(mut self, priority: Priority) -> Self {
        self.conditions.priority = Some(priority);
        self
    }

    /// Builder: require any of these keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set active flag.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Checks applied before a rule is saved.
    pub fn validate(&self) -> Result<(), ComplaintError> {
        if self.name.trim().is_empty() {
            return Err(ComplaintError::invalid("name", "must not be empty"));
        }
        if self.assigned_to.trim().is_empty() {
            return Err(ComplaintError::invalid("assigned_to", "must not be empty"));
        }
        Ok(())
    }

    /// Active and all conditions hold.
    pub fn matches(&self, facts: &ComplaintFacts) -> bool {
        self.is_active && self.conditions.matches(facts)
    }
}

/// Evaluation order: priority descending, then oldest first, then id.
fn evaluation_order(a: &AssignmentRule, b: &AssignmentRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Return the first rule in `rules` that is active and matches.
///
/// Trusts the caller's ordering; inactive rules are skipped regardless.
pub fn first_match<'a>(
    facts: &ComplaintFacts,
    rules: &'a [AssignmentRule],
) -> Option<&'a AssignmentRule> {
    rules.iter().find(|rule| rule.matches(facts))
}

/// The outcome of routing a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub assigned_to: String,
}

/// Snapshot of active rules in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AssignmentRule>,
}

impl RuleSet {
    /// Keep active rules and sort them into evaluation order.
    pub fn new(rules: impl IntoIterator<Item = AssignmentRule>) -> Self {
        let mut rules: Vec<AssignmentRule> = rules.into_iter().filter(|r| r.is_active).collect();
        rules.sort_by(evaluation_order);
        Self { rules }
    }

    pub fn rules(&self) -> &[AssignmentRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pick the assignee for a complaint. `None` means leave it unassigned.
    pub fn select_assignee(&self, facts: &ComplaintFacts) -> Option<RuleMatch> {
        let rule = first_match(facts, &self.rules)?;
        debug!(
            rule_id = %rule.id,
            rule = %rule.name,
            assigned_to = %rule.assigned_to,
            "Complaint matched assignment rule"
        );
        Some(RuleMatch {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            assigned_to: rule.assigned_to.clone(),
        })
    }
}
