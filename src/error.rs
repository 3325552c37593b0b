//! Error types for complaint-desk.

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Complaint error: {0}")]
    Complaint(#[from] ComplaintError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Domain errors raised by complaint, category and rule operations.
#[derive(Debug, thiserror::Error)]
pub enum ComplaintError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A request body points at a row that doesn't exist or is disabled.
    #[error("Unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: Uuid },

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Complaint {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("Malformed ticket number: {0}")]
    MalformedTicket(String),
}

/// Authentication / authorization errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid identity header: {0}")]
    Unauthenticated(String),

    #[error("Role {role} may not {action}")]
    Forbidden { role: String, action: String },
}

impl ComplaintError {
    /// Shorthand for a validation failure.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_domain_errors() {
        let err: Error = ComplaintError::invalid("title", "must not be empty").into();
        assert_eq!(
            err.to_string(),
            "Complaint error: Invalid title: must not be empty"
        );
    }

    #[test]
    fn forbidden_message_names_role_and_action() {
        let err = AuthError::Forbidden {
            role: "student".into(),
            action: "manage assignment rules".into(),
        };
        assert_eq!(err.to_string(), "Role student may not manage assignment rules");
    }
}
