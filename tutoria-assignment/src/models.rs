use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutoria_core::{ClassRequest, Role};
use tutoria_offer::Offer;
use tutoria_shared::models::NotificationPayload;
use tutoria_shared::Masked;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    WaitingTeacher,
    WaitingStudent,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::WaitingTeacher => "waiting_teacher",
            PendingStatus::WaitingStudent => "waiting_student",
        }
    }
}

/// A selected offer waiting on the teacher, then on the requester ("registro_clases").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAssignment {
    pub id: String,
    pub class_request_id: String,
    pub offer_id: String,
    pub status: PendingStatus,
    pub requester_id: String,
    pub requester_name: String,
    #[serde(default)]
    pub requester_email: Option<Masked<String>>,
    pub requester_role: Role,
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    pub teacher_id: String,
    pub teacher_name: String,
    #[serde(default)]
    pub teacher_email: Option<Masked<String>>,
    #[serde(default)]
    pub teacher_career: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub bid_id: Option<String>,
    pub subjects: Vec<String>,
    /// Slots proposed by the teacher.
    pub schedule: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAssignment {
    pub fn new(id: impl Into<String>, request: &ClassRequest, offer: &Offer) -> Self {
        Self {
            id: id.into(),
            class_request_id: request.id.clone(),
            offer_id: offer.id.clone(),
            status: PendingStatus::WaitingTeacher,
            requester_id: request.requester_id.clone(),
            requester_name: request.requester_name.clone(),
            requester_email: request.requester_email.clone(),
            requester_role: request.requester_role,
            child_id: request.child_id.clone(),
            child_name: request.child_name.clone(),
            teacher_id: offer.teacher_id.clone(),
            teacher_name: offer.teacher_name.clone(),
            teacher_email: offer.teacher_email.clone(),
            teacher_career: offer.teacher_career.clone(),
            price_cents: offer.price_cents,
            bid_id: offer.bid_id.clone(),
            subjects: offer.subjects.iter().cloned().collect(),
            schedule: offer.availability.iter().cloned().collect(),
            created_at: Utc::now(),
        }
    }

    pub fn notification_payload(&self) -> NotificationPayload {
        NotificationPayload {
            teacher_name: self.teacher_name.clone(),
            teacher_email: self.teacher_email.clone(),
            teacher_career: self.teacher_career.clone(),
            student_name: self.child_name.clone().unwrap_or_else(|| self.requester_name.clone()),
            student_email: self.requester_email.clone(),
            schedule: self.schedule.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnionStatus {
    Formed,
}

/// The confirmed student–teacher relationship ("clases_union").
///
/// Shares its id with the pending assignment it replaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassUnion {
    pub id: String,
    pub class_request_id: String,
    pub offer_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub requester_role: Role,
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub child_name: Option<String>,
    pub teacher_id: String,
    pub teacher_name: String,
    pub price_cents: i64,
    pub subjects: Vec<String>,
    pub schedule: Vec<String>,
    pub status: UnionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingAssignment> for ClassUnion {
    fn from(pending: &PendingAssignment) -> Self {
        Self {
            id: pending.id.clone(),
            class_request_id: pending.class_request_id.clone(),
            offer_id: pending.offer_id.clone(),
            requester_id: pending.requester_id.clone(),
            requester_name: pending.requester_name.clone(),
            requester_role: pending.requester_role,
            child_id: pending.child_id.clone(),
            child_name: pending.child_name.clone(),
            teacher_id: pending.teacher_id.clone(),
            teacher_name: pending.teacher_name.clone(),
            price_cents: pending.price_cents,
            subjects: pending.subjects.clone(),
            schedule: pending.schedule.clone(),
            status: UnionStatus::Formed,
            created_at: Utc::now(),
        }
    }
}
