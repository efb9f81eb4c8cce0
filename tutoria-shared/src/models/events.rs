use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::Masked;

/// Assignment lifecycle moments that produce a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// An administrator picked the teacher's offer.
    OfferSelected,
    /// The selected teacher accepted; the student/tutor must now confirm.
    TeacherAccepted,
    /// Both parties confirmed and the class union exists.
    AssignmentFormed,
    /// The student/tutor declined the assignment.
    AssignmentRejected,
}

/// Who the notification sender should address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Teacher,
    Student,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NotificationPayload {
    pub teacher_name: String,
    pub teacher_email: Option<Masked<String>>,
    pub teacher_career: Option<String>,
    pub student_name: String,
    pub student_email: Option<Masked<String>>,
    /// Proposed availability slots, e.g. `lunes-16`.
    pub schedule: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub event: NotificationEvent,
    pub recipient: Recipient,
    pub class_request_id: String,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        event: NotificationEvent,
        recipient: Recipient,
        class_request_id: impl Into<String>,
        payload: NotificationPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            recipient,
            class_request_id: class_request_id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}
