//! Participants of a consultation and their display profiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DomainError, UserId};

/// Role a user plays in a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(Self::Doctor),
            "patient" => Ok(Self::Patient),
            other => Err(DomainError::InvalidFieldValue {
                field: "role".to_string(),
                value: other.to_string(),
                expected: "doctor or patient".to_string(),
            }),
        }
    }
}

/// The two users authorized to take part in one consultation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    pub doctor_id: UserId,
    pub patient_id: UserId,
}

impl Participants {
    pub fn new(doctor_id: UserId, patient_id: UserId) -> Self {
        Self {
            doctor_id,
            patient_id,
        }
    }

    /// Returns the role held by `user_id` in this session, if any.
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        if user_id == self.doctor_id {
            Some(Role::Doctor)
        } else if user_id == self.patient_id {
            Some(Role::Patient)
        } else {
            None
        }
    }

    /// Whether `user_id` may join this session claiming `role`.
    pub fn admits(&self, user_id: UserId, role: Role) -> bool {
        match role {
            Role::Doctor => user_id == self.doctor_id,
            Role::Patient => user_id == self.patient_id,
        }
    }
}

/// Display profile used to stamp outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>, photo_url: Option<String>) -> Self {
        Self {
            name: name.into(),
            photo_url,
        }
    }

    /// Placeholder used when the profile service cannot resolve a user.
    pub fn anonymous() -> Self {
        Self {
            name: "Anonymous".to_string(),
            photo_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants() -> Participants {
        Participants::new(UserId::new(1), UserId::new(2))
    }

    #[test]
    fn test_role_of() {
        let p = participants();
        assert_eq!(p.role_of(UserId::new(1)), Some(Role::Doctor));
        assert_eq!(p.role_of(UserId::new(2)), Some(Role::Patient));
        assert_eq!(p.role_of(UserId::new(3)), None);
    }

    #[test]
    fn test_admits_requires_matching_slot() {
        let p = participants();
        assert!(p.admits(UserId::new(1), Role::Doctor));
        assert!(!p.admits(UserId::new(1), Role::Patient));
        assert!(!p.admits(UserId::new(3), Role::Patient));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!(" patient".parse::<Role>().unwrap(), Role::Patient);
        assert!("nurse".parse::<Role>().is_err());
    }
}
