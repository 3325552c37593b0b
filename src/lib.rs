//! Complaint Desk: student complaint management with rule-based assignment.

pub mod analytics;
pub mod assignment;
pub mod complaints;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod sla;
pub mod store;
