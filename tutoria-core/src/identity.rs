use serde::{Deserialize, Serialize};
use tutoria_shared::Masked;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    /// Parent or guardian requesting classes for a child.
    Tutor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Tutor => "tutor",
        }
    }

    /// Roles that may post class requests and confirm assignments.
    pub fn is_requester(&self) -> bool {
        matches!(self, Role::Student | Role::Tutor)
    }
}

/// The user performing an operation. Always passed in explicitly by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}

/// What a teacher shares about themselves when bidding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeacherProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<Masked<String>>,
    /// Degree or field of study, shown to the student in notifications.
    #[serde(default)]
    pub career: Option<String>,
}
