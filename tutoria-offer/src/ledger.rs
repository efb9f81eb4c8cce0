use std::sync::Arc;
use tracing::{info, warn};
use tutoria_core::{
    collections, Actor, BidCancellation, BidDraft, BiddingMirror, ClassRequest, ClassStatus, EntityStore,
    EntityStoreExt, Filter, Role, StoreError, TeacherProfile, WorkflowError, WorkflowResult,
};
use uuid::Uuid;

use crate::models::{MyOffer, Offer, OfferStanding, OfferStatus, OfferSubmission, RequestWithOffers, TeacherOfferEntry};

/// Competing offers per class request, mirrored into each teacher's own index.
#[derive(Clone)]
pub struct OfferLedger {
    store: Arc<dyn EntityStore>,
    mirror: Arc<dyn BiddingMirror>,
}

impl OfferLedger {
    pub fn new(store: Arc<dyn EntityStore>, mirror: Arc<dyn BiddingMirror>) -> Self {
        Self { store, mirror }
    }

    /// Record a teacher's offer and its index entry.
    ///
    /// Duplicate offers by the same teacher are not rejected here; callers check
    /// [`OfferLedger::has_open_offer`] first.
    pub async fn submit_offer(
        &self,
        class_request_id: &str,
        teacher: &TeacherProfile,
        submission: OfferSubmission,
    ) -> WorkflowResult<Offer> {
        let request: ClassRequest = self
            .store
            .get_as(&collections::class_request(class_request_id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("class request {}", class_request_id)))?;

        if request.is_closed() {
            return Err(WorkflowError::invalid(request.status, "submit offer"));
        }
        validate_submission(&request, &submission)?;

        let offer_id = Uuid::new_v4().to_string();
        let mut offer = Offer::new(&offer_id, class_request_id, teacher, submission);

        let draft = BidDraft {
            offer_id: offer_id.clone(),
            class_request_id: class_request_id.to_string(),
            teacher_id: teacher.id.clone(),
            price_cents: offer.price_cents,
        };
        match self.mirror.open_bid(&draft).await {
            Ok(bid_id) => offer.bid_id = bid_id,
            Err(e) => warn!("Could not open bid for offer {}: {}", offer_id, e),
        }

        self.store
            .put(&collections::offer(class_request_id, &offer_id), &offer)
            .await?;

        let entry = TeacherOfferEntry {
            id: offer_id.clone(),
            class_request_id: class_request_id.to_string(),
            teacher_id: teacher.id.clone(),
            created_at: offer.created_at,
        };
        self.store
            .put(&collections::teacher_offer_entry(&teacher.id, &offer_id), &entry)
            .await
            .map_err(|source| WorkflowError::PartialFailure {
                step: "write teacher offer index",
                source,
            })?;

        info!(
            "Teacher {} offered {} cents/h on class request {} (offer {})",
            teacher.id, offer.price_cents, class_request_id, offer_id
        );
        Ok(offer)
    }

    /// Every offer on the request, oldest first.
    pub async fn list_offers(&self, class_request_id: &str) -> WorkflowResult<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .store
            .query_as(&collections::offers(class_request_id), &Filter::all())
            .await?;
        offers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(offers)
    }

    pub async fn get_offer(&self, class_request_id: &str, offer_id: &str) -> WorkflowResult<Option<Offer>> {
        Ok(self.store.get_as(&collections::offer(class_request_id, offer_id)).await?)
    }

    /// The teacher's own offers resolved through their index.
    ///
    /// Dangling pointers and pointers to another teacher's offer are skipped.
    pub async fn list_my_offers(&self, teacher_id: &str) -> WorkflowResult<Vec<MyOffer>> {
        let entries: Vec<TeacherOfferEntry> = self
            .store
            .query_as(&collections::teacher_offer_index(teacher_id), &Filter::all())
            .await?;

        let mut mine = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(offer) = self.get_offer(&entry.class_request_id, &entry.id).await? else {
                warn!("Teacher {} index points to missing offer {}", teacher_id, entry.id);
                continue;
            };
            if offer.teacher_id != teacher_id {
                warn!(
                    "Teacher {} index points to offer {} of teacher {}",
                    teacher_id, offer.id, offer.teacher_id
                );
                continue;
            }
            let request: Option<ClassRequest> = self
                .store
                .get_as(&collections::class_request(&offer.class_request_id))
                .await?;
            let Some(request) = request else {
                warn!("Offer {} belongs to missing class request {}", offer.id, offer.class_request_id);
                continue;
            };

            mine.push(MyOffer {
                standing: OfferStanding::of(offer.status, request.status),
                request_status: request.status,
                offer,
            });
        }
        mine.sort_by(|a, b| a.offer.created_at.cmp(&b.offer.created_at));
        Ok(mine)
    }

    /// Mark an offer cancelled. The submitting teacher withdraws, an admin cancels.
    ///
    /// The selected offer cannot be withdrawn; it leaves through the assignment
    /// transitions instead. Cancelling twice returns the cancelled offer.
    pub async fn withdraw_or_cancel_offer(
        &self,
        class_request_id: &str,
        offer_id: &str,
        actor: &Actor,
    ) -> WorkflowResult<Offer> {
        let mut offer = self
            .get_offer(class_request_id, offer_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("offer {}", offer_id)))?;

        match actor.role {
            Role::Admin => {}
            Role::Teacher if actor.id == offer.teacher_id => {}
            _ => {
                return Err(WorkflowError::NotParticipant(format!(
                    "{} {} cannot withdraw offer {}",
                    actor.role.as_str(),
                    actor.id,
                    offer_id
                )))
            }
        }

        match offer.status {
            OfferStatus::Cancelled => return Ok(offer),
            status if status.is_active() => {
                return Err(WorkflowError::invalid(format!("offer {}", status), "withdraw offer"))
            }
            _ => {}
        }

        self.store
            .update(
                &collections::offer(class_request_id, offer_id),
                serde_json::json!({ "status": OfferStatus::Cancelled }),
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => WorkflowError::NotFound(format!("offer {}", offer_id)),
                other => WorkflowError::Store(other),
            })?;
        offer.status = OfferStatus::Cancelled;
        info!("Offer {} on class request {} cancelled by {}", offer_id, class_request_id, actor.id);

        if let Some(bid_id) = offer.bid_id.clone() {
            let cancellation = BidCancellation {
                offer_id: offer_id.to_string(),
                bid_id,
                role: actor.role,
            };
            if let Err(e) = self.mirror.cancel_bid(&cancellation).await {
                warn!("Bid {} not cancelled for offer {}: {}", cancellation.bid_id, offer_id, e);
            }
        }
        Ok(offer)
    }

    /// Whether the teacher already has an open offer on the request.
    pub async fn has_open_offer(&self, teacher_id: &str, class_request_id: &str) -> WorkflowResult<bool> {
        let filter = Filter::all()
            .eq("teacher_id", teacher_id)
            .eq("status", OfferStatus::Open.as_str());
        let found = self.store.query(&collections::offers(class_request_id), &filter).await?;
        Ok(!found.is_empty())
    }

    /// Admin board: class requests in `status` (all when `None`) with their offers.
    pub async fn list_requests_with_offers(
        &self,
        status: Option<ClassStatus>,
    ) -> WorkflowResult<Vec<RequestWithOffers>> {
        let filter = match status {
            Some(status) => Filter::all().eq("status", status.as_str()),
            None => Filter::all(),
        };
        let mut requests: Vec<ClassRequest> = self.store.query_as(&collections::class_requests(), &filter).await?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut board = Vec::with_capacity(requests.len());
        for request in requests {
            let offers = self.list_offers(&request.id).await?;
            board.push(RequestWithOffers { request, offers });
        }
        Ok(board)
    }

    /// Delete an offer and then its index entry. Returns whether the offer existed.
    pub async fn purge_offer(
        &self,
        class_request_id: &str,
        teacher_id: &str,
        offer_id: &str,
    ) -> Result<bool, StoreError> {
        let removed = self
            .store
            .delete(&collections::offer(class_request_id, offer_id))
            .await?;
        self.store
            .delete(&collections::teacher_offer_entry(teacher_id, offer_id))
            .await?;
        Ok(removed)
    }
}

fn validate_submission(request: &ClassRequest, submission: &OfferSubmission) -> WorkflowResult<()> {
    if submission.price_cents <= 0 {
        return Err(WorkflowError::Validation("price must be positive".to_string()));
    }
    if submission.subjects.is_empty() {
        return Err(WorkflowError::Validation("choose at least one subject".to_string()));
    }
    if submission.availability.is_empty() {
        return Err(WorkflowError::Validation("choose at least one availability slot".to_string()));
    }
    if let Some(subject) = submission.subjects.iter().find(|s| !request.subjects.contains(*s)) {
        return Err(WorkflowError::Validation(format!("subject {} was not requested", subject)));
    }
    if let Some(slot) = submission.availability.iter().find(|s| !request.availability.contains(*s)) {
        return Err(WorkflowError::Validation(format!("slot {} is outside the requested availability", slot)));
    }
    Ok(())
}
