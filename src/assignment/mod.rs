//! Assignment: rule matching plus the admin surface for rules, categories and SLA policies.

pub mod admin;
pub mod routes;
pub mod rules;

pub use admin::AdminService;
pub use rules::{AssignmentRule, ComplaintFacts, RuleConditions, RuleMatch, RuleSet, first_match};
