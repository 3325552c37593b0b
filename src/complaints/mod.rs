//! Complaints: submission, lifecycle, comments, and the live staff feed.

pub mod model;
pub mod routes;
pub mod service;
pub mod ticket;
pub mod ws;

pub use model::{Complaint, ComplaintEvent, ComplaintStatus, NewComplaint, Priority};
pub use service::{ComplaintService, spawn_sla_sweep};
