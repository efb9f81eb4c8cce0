use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Role;
use crate::CollaboratorError;

/// What the external bid ledger needs to open a bid for a new offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidDraft {
    pub offer_id: String,
    pub class_request_id: String,
    pub teacher_id: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidCancellation {
    pub offer_id: String,
    pub bid_id: String,
    /// Which side triggered the cancellation.
    pub role: Role,
}

/// Client of the external "pujas" service used for financial bookkeeping.
///
/// Each call is independent of the local transition that triggers it: callers
/// log failures and keep the local state.
#[async_trait]
pub trait BiddingMirror: Send + Sync {
    /// Register a bid for a freshly submitted offer. `None` when the mirror issues no id.
    async fn open_bid(&self, draft: &BidDraft) -> Result<Option<String>, CollaboratorError>;

    /// The selected teacher accepted.
    async fn accept_bid(&self, bid_id: &str) -> Result<(), CollaboratorError>;

    /// The student/tutor confirmed; the bid is final.
    async fn confirm_bid(&self, bid_id: &str) -> Result<(), CollaboratorError>;

    async fn cancel_bid(&self, cancellation: &BidCancellation) -> Result<(), CollaboratorError>;
}

/// Used when no bidding service is configured.
pub struct DisabledBiddingMirror;

#[async_trait]
impl BiddingMirror for DisabledBiddingMirror {
    async fn open_bid(&self, draft: &BidDraft) -> Result<Option<String>, CollaboratorError> {
        tracing::debug!("Bidding mirror disabled, no bid opened for offer {}", draft.offer_id);
        Ok(None)
    }

    async fn accept_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        tracing::debug!("Bidding mirror disabled, skipping accept of bid {}", bid_id);
        Ok(())
    }

    async fn confirm_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        tracing::debug!("Bidding mirror disabled, skipping confirm of bid {}", bid_id);
        Ok(())
    }

    async fn cancel_bid(&self, cancellation: &BidCancellation) -> Result<(), CollaboratorError> {
        tracing::debug!("Bidding mirror disabled, skipping cancel of bid {}", cancellation.bid_id);
        Ok(())
    }
}
