use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use tutoria_core::{BidCancellation, BidDraft, BiddingMirror, CollaboratorError, Role};

#[derive(Debug, Deserialize)]
struct OpenBidResponse {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CancelBidBody<'a> {
    offer_id: &'a str,
    role: Role,
}

/// REST client of the external "pujas" (bids) service.
#[derive(Clone)]
pub struct HttpBiddingMirror {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBiddingMirror {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, CollaboratorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BiddingMirror for HttpBiddingMirror {
    async fn open_bid(&self, draft: &BidDraft) -> Result<Option<String>, CollaboratorError> {
        let response = self.post("/bids", draft).await?;
        let body: OpenBidResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("invalid bid response: {}", e)))?;
        info!("Opened bid {:?} for offer {}", body.id, draft.offer_id);
        Ok(body.id)
    }

    async fn accept_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        self.post(&format!("/bids/{}/accept", bid_id), &serde_json::json!({})).await?;
        Ok(())
    }

    async fn confirm_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        self.post(&format!("/bids/{}/confirm", bid_id), &serde_json::json!({})).await?;
        Ok(())
    }

    async fn cancel_bid(&self, cancellation: &BidCancellation) -> Result<(), CollaboratorError> {
        let body = CancelBidBody {
            offer_id: &cancellation.offer_id,
            role: cancellation.role,
        };
        self.post(&format!("/bids/{}/cancel", cancellation.bid_id), &body).await?;
        Ok(())
    }
}
