use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tutoria_core::{ClassStatus, TeacherProfile};
use tutoria_shared::Masked;

/// Offer status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Open,
    /// Selected by an admin; the assignment is in flight.
    InProcess,
    /// The assignment was confirmed by both sides.
    Accepted,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Open => "open",
            OfferStatus::InProcess => "in_process",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Cancelled => "cancelled",
        }
    }

    /// In process or accepted. At most one offer per class request is ever active.
    pub fn is_active(&self) -> bool {
        matches!(self, OfferStatus::InProcess | OfferStatus::Accepted)
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A teacher's bid against a class request, stored under `clases/{id}/ofertas`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: String,
    pub class_request_id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    #[serde(default)]
    pub teacher_email: Option<Masked<String>>,
    #[serde(default)]
    pub teacher_career: Option<String>,
    /// Hourly price in cents.
    pub price_cents: i64,
    pub subjects: BTreeSet<String>,
    pub availability: BTreeSet<String>,
    pub status: OfferStatus,
    /// Issued by the external bidding service at submission.
    #[serde(default)]
    pub bid_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(
        id: impl Into<String>,
        class_request_id: impl Into<String>,
        teacher: &TeacherProfile,
        submission: OfferSubmission,
    ) -> Self {
        Self {
            id: id.into(),
            class_request_id: class_request_id.into(),
            teacher_id: teacher.id.clone(),
            teacher_name: teacher.name.clone(),
            teacher_email: teacher.email.clone(),
            teacher_career: teacher.career.clone(),
            price_cents: submission.price_cents,
            subjects: submission.subjects,
            availability: submission.availability,
            status: OfferStatus::Open,
            bid_id: None,
            created_at: Utc::now(),
        }
    }
}

/// What the teacher proposes when bidding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferSubmission {
    pub subjects: BTreeSet<String>,
    pub availability: BTreeSet<String>,
    pub price_cents: i64,
}

/// Pointer kept under `profesores/{teacherId}/mis_ofertas`; same id as the offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeacherOfferEntry {
    pub id: String,
    pub class_request_id: String,
    pub teacher_id: String,
    pub created_at: DateTime<Utc>,
}

/// How an offer looks from the submitting teacher's side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStanding {
    /// The request is still collecting offers.
    Awaiting,
    Selected,
    /// Another offer won, or the request closed without this one.
    NotSelected,
    Cancelled,
}

impl OfferStanding {
    pub fn of(offer_status: OfferStatus, request_status: ClassStatus) -> Self {
        match offer_status {
            OfferStatus::Cancelled => OfferStanding::Cancelled,
            OfferStatus::InProcess | OfferStatus::Accepted => OfferStanding::Selected,
            OfferStatus::Open if request_status == ClassStatus::Pending => OfferStanding::Awaiting,
            OfferStatus::Open => OfferStanding::NotSelected,
        }
    }
}

/// One row of a teacher's "my offers" listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MyOffer {
    pub offer: Offer,
    pub request_status: ClassStatus,
    pub standing: OfferStanding,
}

/// A class request with every offer made against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestWithOffers {
    pub request: tutoria_core::ClassRequest,
    pub offers: Vec<Offer>,
}
