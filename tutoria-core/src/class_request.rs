use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tutoria_shared::Masked;

use crate::identity::Role;

/// Lifecycle status of a class request as stored on the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    /// Collecting offers, nothing selected.
    Pending,
    /// An offer was selected; waiting for the teacher.
    InProcess,
    /// The teacher accepted; waiting for the student/tutor.
    WaitingStudent,
    /// Both sides confirmed and a class union exists.
    TeacherAssigned,
}

impl ClassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassStatus::Pending => "pending",
            ClassStatus::InProcess => "in_process",
            ClassStatus::WaitingStudent => "waiting_student",
            ClassStatus::TeacherAssigned => "teacher_assigned",
        }
    }
}

impl fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClassStatus::Pending),
            "in_process" => Ok(ClassStatus::InProcess),
            "waiting_student" => Ok(ClassStatus::WaitingStudent),
            "teacher_assigned" => Ok(ClassStatus::TeacherAssigned),
            other => Err(format!("unknown class status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Online,
    InPerson,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Individual,
    Paired,
}

/// A tutoring need posted by a student or a tutor ("clase").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassRequest {
    pub id: String,
    pub requester_id: String,
    pub requester_name: String,
    #[serde(default)]
    pub requester_email: Option<Masked<String>>,
    pub requester_role: Role,
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    pub subjects: Vec<String>,
    pub grade: String,
    pub modality: Modality,
    #[serde(default)]
    pub city: Option<String>,
    pub class_type: ClassType,
    pub weekly_hours: f32,
    /// Day+hour tokens, e.g. `lunes-16`.
    pub availability: BTreeSet<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: ClassStatus,
    #[serde(default)]
    pub selected_teacher_id: Option<String>,
    #[serde(default)]
    pub selected_teacher_name: Option<String>,
    #[serde(default)]
    pub selected_price_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields the requester fills in when posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClassRequest {
    pub requester_id: String,
    pub requester_name: String,
    #[serde(default)]
    pub requester_email: Option<Masked<String>>,
    pub requester_role: Role,
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    pub subjects: Vec<String>,
    pub grade: String,
    pub modality: Modality,
    #[serde(default)]
    pub city: Option<String>,
    pub class_type: ClassType,
    pub weekly_hours: f32,
    pub availability: BTreeSet<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ClassRequest {
    pub fn new(id: impl Into<String>, draft: NewClassRequest) -> Self {
        Self {
            id: id.into(),
            requester_id: draft.requester_id,
            requester_name: draft.requester_name,
            requester_email: draft.requester_email,
            requester_role: draft.requester_role,
            child_id: draft.child_id,
            child_name: draft.child_name,
            subjects: draft.subjects,
            grade: draft.grade,
            modality: draft.modality,
            city: draft.city,
            class_type: draft.class_type,
            weekly_hours: draft.weekly_hours,
            availability: draft.availability,
            start_date: draft.start_date,
            end_date: draft.end_date,
            notes: draft.notes,
            status: ClassStatus::Pending,
            selected_teacher_id: None,
            selected_teacher_name: None,
            selected_price_cents: None,
            created_at: Utc::now(),
        }
    }

    /// The request no longer takes offers.
    pub fn is_closed(&self) -> bool {
        self.status == ClassStatus::TeacherAssigned
    }

    /// The actor id allowed to confirm or reject on the requester side.
    pub fn is_requester(&self, actor_id: &str) -> bool {
        self.requester_id == actor_id
    }
}

impl NewClassRequest {
    /// Structural checks before the request is stored.
    pub fn validate(&self) -> Result<(), String> {
        if !self.requester_role.is_requester() {
            return Err(format!("a {} cannot post class requests", self.requester_role.as_str()));
        }
        if self.subjects.is_empty() {
            return Err("at least one subject is required".to_string());
        }
        if self.availability.is_empty() {
            return Err("at least one availability slot is required".to_string());
        }
        if self.weekly_hours.is_nan() || self.weekly_hours <= 0.0 {
            return Err("weekly hours must be positive".to_string());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err("end date precedes start date".to_string());
            }
        }
        Ok(())
    }
}
