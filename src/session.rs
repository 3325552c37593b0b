//! Caller identity: passed explicitly to every service operation.
//!
//! Authentication happens upstream (the gateway in front of this service);
//! a `Session` is the already-verified identity plus role.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::complaints::model::Complaint;
use crate::error::AuthError;

/// Role of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::Unauthenticated(format!("unknown role {other:?}"))),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn student(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn staff(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Staff)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Staff or admin.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_staff(&self, action: &str) -> Result<(), AuthError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(self.forbidden(action))
        }
    }

    pub fn require_admin(&self, action: &str) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(self.forbidden(action))
        }
    }

    /// Students see only their own complaints; staff see everything.
    pub fn can_view(&self, complaint: &Complaint) -> bool {
        self.is_staff() || complaint.student_id == self.user_id
    }

    pub fn forbidden(&self, action: &str) -> AuthError {
        AuthError::Forbidden {
            role: self.role.to_string(),
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::model::{Complaint, NewComplaint};

    fn complaint_of(student: &str) -> Complaint {
        Complaint::from_new(
            student,
            "CMP-2026-00001",
            NewComplaint::new("Broken AC", "room is hot"),
        )
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" staff ".parse::<Role>().unwrap(), Role::Staff);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn student_sees_only_own_complaints() {
        let alice = Session::student("alice");
        assert!(alice.can_view(&complaint_of("alice")));
        assert!(!alice.can_view(&complaint_of("bob")));
    }

    #[test]
    fn staff_sees_everything() {
        assert!(Session::staff("s1").can_view(&complaint_of("bob")));
        assert!(Session::admin("a1").can_view(&complaint_of("bob")));
    }

    #[test]
    fn require_admin_rejects_staff() {
        let err = Session::staff("s1").require_admin("edit rules").unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
        assert!(Session::admin("a1").require_admin("edit rules").is_ok());
        assert!(Session::staff("s1").require_staff("triage").is_ok());
        assert!(Session::student("u").require_staff("triage").is_err());
    }
}
