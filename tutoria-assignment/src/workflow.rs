use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tutoria_core::{
    collections, Actor, BiddingMirror, ClassRequest, ClassStatus, EntityStore, EntityStoreExt, Filter, NewClassRequest,
    Notifier, Role, StoreError, WorkflowError, WorkflowResult,
};
use tutoria_offer::{OfferLedger, OfferStatus};
use tutoria_shared::models::{Notification, NotificationEvent, Recipient};
use uuid::Uuid;

use crate::effects::SideEffects;
use crate::machine::{transition, Action, Next};
use crate::models::{ClassUnion, PendingAssignment, PendingStatus};

/// Result of a transition that may have been completed by an earlier call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum Outcome<T> {
    Applied(T),
    /// The pending assignment was already consumed. Nothing was written.
    AlreadyHandled,
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// Wraps a store failure on a step that follows an already committed write.
fn partial(step: &'static str) -> impl FnOnce(StoreError) -> WorkflowError {
    move |source| {
        error!("Transition interrupted at '{}': {}", step, source);
        WorkflowError::PartialFailure { step, source }
    }
}

fn partial_after(step: &'static str) -> impl FnOnce(WorkflowError) -> WorkflowError {
    move |err| match err {
        WorkflowError::Store(source) => partial(step)(source),
        other => other,
    }
}

/// Drives class requests from posting to a formed class union.
pub struct AssignmentWorkflow {
    store: Arc<dyn EntityStore>,
    ledger: OfferLedger,
    effects: SideEffects,
}

impl AssignmentWorkflow {
    pub fn new(store: Arc<dyn EntityStore>, mirror: Arc<dyn BiddingMirror>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ledger: OfferLedger::new(store.clone(), mirror.clone()),
            effects: SideEffects::new(notifier, mirror),
            store,
        }
    }

    pub fn ledger(&self) -> &OfferLedger {
        &self.ledger
    }

    /// Wait for background notifications.
    pub async fn flush(&self) {
        self.effects.flush().await;
    }

    pub async fn open_request(&self, draft: NewClassRequest) -> WorkflowResult<ClassRequest> {
        draft.validate().map_err(WorkflowError::Validation)?;

        let request = ClassRequest::new(Uuid::new_v4().to_string(), draft);
        self.store
            .put(&collections::class_request(&request.id), &request)
            .await?;

        info!("Class request {} opened by {}", request.id, request.requester_id);
        Ok(request)
    }

    pub async fn get_request(&self, class_request_id: &str) -> WorkflowResult<ClassRequest> {
        self.store
            .get_as(&collections::class_request(class_request_id))
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("class request {}", class_request_id)))
    }

    async fn find_pending(&self, pending_id: &str) -> WorkflowResult<Option<PendingAssignment>> {
        Ok(self.store.get_as(&collections::pending_assignment(pending_id)).await?)
    }

    async fn pending_for_request(&self, class_request_id: &str) -> WorkflowResult<Vec<PendingAssignment>> {
        let filter = Filter::all().eq("class_request_id", class_request_id);
        Ok(self.store.query_as(&collections::pending_assignments(), &filter).await?)
    }

    /// Admin picks one offer. Opens the pending assignment and waits on the teacher.
    pub async fn select_offer(
        &self,
        class_request_id: &str,
        offer_id: &str,
        admin: &Actor,
    ) -> WorkflowResult<PendingAssignment> {
        if admin.role != Role::Admin {
            return Err(WorkflowError::NotParticipant(format!(
                "only admins select offers, {} is a {}",
                admin.id,
                admin.role.as_str()
            )));
        }

        let request = self.get_request(class_request_id).await?;
        transition(request.status, Action::SelectOffer)?;

        let offer = self
            .ledger
            .get_offer(class_request_id, offer_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("offer {}", offer_id)))?;
        if offer.status != OfferStatus::Open {
            return Err(WorkflowError::invalid(
                format!("offer {}", offer.status),
                Action::SelectOffer.as_str(),
            ));
        }
        if !self.pending_for_request(class_request_id).await?.is_empty() {
            return Err(WorkflowError::invalid(
                "an assignment is already in flight",
                Action::SelectOffer.as_str(),
            ));
        }

        let pending = PendingAssignment::new(Uuid::new_v4().to_string(), &request, &offer);
        self.store
            .put(&collections::pending_assignment(&pending.id), &pending)
            .await?;

        self.store
            .update(
                &collections::offer(class_request_id, offer_id),
                json!({ "status": OfferStatus::InProcess }),
            )
            .await
            .map_err(partial("mark offer in process"))?;

        self.store
            .update(
                &collections::class_request(class_request_id),
                json!({
                    "status": ClassStatus::InProcess,
                    "selected_teacher_id": offer.teacher_id,
                    "selected_teacher_name": offer.teacher_name,
                    "selected_price_cents": offer.price_cents,
                }),
            )
            .await
            .map_err(partial("mark class request in process"))?;

        info!(
            "Admin {} selected offer {} of teacher {} for class request {}",
            admin.id, offer_id, offer.teacher_id, class_request_id
        );

        self.effects
            .notify(Notification::new(
                NotificationEvent::OfferSelected,
                Recipient::Teacher,
                class_request_id,
                pending.notification_payload(),
            ))
            .await;

        Ok(pending)
    }

    /// The selected teacher takes the class. Waits on the student next.
    ///
    /// If a previous call moved the assignment but not the class request, calling
    /// again finishes the remaining steps.
    pub async fn teacher_accept(
        &self,
        pending_id: &str,
        teacher: &Actor,
    ) -> WorkflowResult<Outcome<PendingAssignment>> {
        let Some(mut pending) = self.find_pending(pending_id).await? else {
            return Ok(Outcome::AlreadyHandled);
        };
        if teacher.id != pending.teacher_id {
            return Err(WorkflowError::NotParticipant(format!(
                "assignment {} waits on teacher {}, not {}",
                pending_id, pending.teacher_id, teacher.id
            )));
        }

        let request = self.get_request(&pending.class_request_id).await?;
        let resuming = pending.status == PendingStatus::WaitingStudent;
        if resuming {
            if request.status != ClassStatus::InProcess {
                return Ok(Outcome::AlreadyHandled);
            }
        } else {
            transition(request.status, Action::TeacherAccept)?;

            let waiting_teacher = Filter::all().eq("status", PendingStatus::WaitingTeacher.as_str());
            match self
                .store
                .update_where(
                    &collections::pending_assignment(pending_id),
                    &waiting_teacher,
                    json!({ "status": PendingStatus::WaitingStudent }),
                )
                .await
            {
                Ok(true) => {}
                Ok(false) | Err(StoreError::NotFound(_)) => return Ok(Outcome::AlreadyHandled),
                Err(e) => return Err(e.into()),
            }
            pending.status = PendingStatus::WaitingStudent;
        }

        let in_process = Filter::all().eq("status", ClassStatus::InProcess.as_str());
        let marked = self
            .store
            .update_where(
                &collections::class_request(&pending.class_request_id),
                &in_process,
                json!({ "status": ClassStatus::WaitingStudent }),
            )
            .await;
        let marked = if resuming {
            marked?
        } else {
            marked.map_err(partial("mark class request waiting for student"))?
        };
        if !marked {
            return Ok(Outcome::AlreadyHandled);
        }

        info!(
            "Teacher {} accepted assignment {} for class request {}",
            teacher.id, pending_id, pending.class_request_id
        );

        self.effects.accept_bid(pending.bid_id.as_deref()).await;
        self.effects
            .notify(Notification::new(
                NotificationEvent::TeacherAccepted,
                Recipient::Student,
                &pending.class_request_id,
                pending.notification_payload(),
            ))
            .await;

        Ok(Outcome::Applied(pending))
    }

    /// The selected teacher declines. The request reopens.
    pub async fn teacher_reject(&self, pending_id: &str, teacher: &Actor) -> WorkflowResult<Outcome<ClassRequest>> {
        self.release(pending_id, teacher, Action::TeacherReject).await
    }

    /// An admin withdraws the selection before the teacher answered. The request reopens.
    pub async fn admin_cancel(&self, pending_id: &str, admin: &Actor) -> WorkflowResult<Outcome<ClassRequest>> {
        self.release(pending_id, admin, Action::AdminCancel).await
    }

    async fn release(&self, pending_id: &str, actor: &Actor, action: Action) -> WorkflowResult<Outcome<ClassRequest>> {
        let Some(pending) = self.find_pending(pending_id).await? else {
            return Ok(Outcome::AlreadyHandled);
        };
        let allowed = match action {
            Action::AdminCancel => actor.role == Role::Admin,
            _ => actor.id == pending.teacher_id,
        };
        if !allowed {
            return Err(WorkflowError::NotParticipant(format!(
                "{} {} cannot {} assignment {}",
                actor.role.as_str(),
                actor.id,
                action,
                pending_id
            )));
        }

        let mut request = self.get_request(&pending.class_request_id).await?;
        let Next::Status(reopened) = transition(request.status, action)? else {
            return Err(WorkflowError::invalid(request.status, action.as_str()));
        };

        if !self
            .store
            .delete(&collections::pending_assignment(pending_id))
            .await?
        {
            return Ok(Outcome::AlreadyHandled);
        }

        self.ledger
            .purge_offer(&pending.class_request_id, &pending.teacher_id, &pending.offer_id)
            .await
            .map_err(partial("delete selected offer"))?;

        self.store
            .update(
                &collections::class_request(&pending.class_request_id),
                json!({
                    "status": reopened,
                    "selected_teacher_id": null,
                    "selected_teacher_name": null,
                    "selected_price_cents": null,
                }),
            )
            .await
            .map_err(partial("reopen class request"))?;
        request.status = reopened;
        request.selected_teacher_id = None;
        request.selected_teacher_name = None;
        request.selected_price_cents = None;

        info!(
            "{} {} released assignment {}; class request {} is {} again",
            actor.role.as_str(),
            actor.id,
            pending_id,
            request.id,
            request.status
        );

        self.effects
            .cancel_bid(&pending.offer_id, pending.bid_id.as_deref(), actor.role)
            .await;

        Ok(Outcome::Applied(request))
    }

    /// The requester accepts the teacher. Forms the class union.
    ///
    /// Writes the union before removing the pending assignment. If a previous call
    /// stopped in between, calling again finishes the remaining steps.
    pub async fn student_confirm(&self, pending_id: &str, student: &Actor) -> WorkflowResult<Outcome<ClassUnion>> {
        let Some(pending) = self.find_pending(pending_id).await? else {
            return Ok(Outcome::AlreadyHandled);
        };
        if student.id != pending.requester_id {
            return Err(WorkflowError::NotParticipant(format!(
                "assignment {} waits on {}, not {}",
                pending_id, pending.requester_id, student.id
            )));
        }

        let request = self.get_request(&pending.class_request_id).await?;
        let existing: Option<ClassUnion> = self.store.get_as(&collections::class_union(pending_id)).await?;
        let resuming = request.status == ClassStatus::TeacherAssigned && existing.is_some();
        if !resuming {
            transition(request.status, Action::StudentConfirm)?;
        }

        let union = match existing {
            Some(union) => union,
            None => {
                let union = ClassUnion::from(&pending);
                self.store.put(&collections::class_union(&union.id), &union).await?;
                union
            }
        };

        self.store
            .update(
                &collections::class_request(&pending.class_request_id),
                json!({ "status": ClassStatus::TeacherAssigned }),
            )
            .await
            .map_err(partial("mark class request teacher assigned"))?;

        self.store
            .update(
                &collections::offer(&pending.class_request_id, &pending.offer_id),
                json!({ "status": OfferStatus::Accepted }),
            )
            .await
            .map_err(partial("mark offer accepted"))?;

        let removed = self
            .store
            .delete(&collections::pending_assignment(pending_id))
            .await
            .map_err(partial("delete pending assignment"))?;
        if !removed {
            return Ok(Outcome::AlreadyHandled);
        }

        info!(
            "Class union {} formed between teacher {} and {} for class request {}",
            union.id, union.teacher_id, union.requester_id, union.class_request_id
        );

        self.effects.confirm_bid(pending.bid_id.as_deref()).await;
        self.effects
            .notify(Notification::new(
                NotificationEvent::AssignmentFormed,
                Recipient::Both,
                &pending.class_request_id,
                pending.notification_payload(),
            ))
            .await;

        Ok(Outcome::Applied(union))
    }

    /// The requester turns the teacher down. The request and every offer on it are removed.
    pub async fn student_reject(&self, pending_id: &str, student: &Actor) -> WorkflowResult<Outcome<()>> {
        let Some(pending) = self.find_pending(pending_id).await? else {
            return Ok(Outcome::AlreadyHandled);
        };
        if student.id != pending.requester_id {
            return Err(WorkflowError::NotParticipant(format!(
                "assignment {} waits on {}, not {}",
                pending_id, pending.requester_id, student.id
            )));
        }

        let request = self.get_request(&pending.class_request_id).await?;
        transition(request.status, Action::StudentReject)?;

        if !self
            .store
            .delete(&collections::pending_assignment(pending_id))
            .await?
        {
            return Ok(Outcome::AlreadyHandled);
        }

        let offers = self
            .ledger
            .list_offers(&request.id)
            .await
            .map_err(partial_after("list offers to purge"))?;
        for offer in &offers {
            self.ledger
                .purge_offer(&offer.class_request_id, &offer.teacher_id, &offer.id)
                .await
                .map_err(partial("purge offers"))?;
        }

        self.store
            .delete(&collections::class_request(&request.id))
            .await
            .map_err(partial("delete class request"))?;

        info!(
            "Student {} rejected assignment {}; class request {} and {} offers removed",
            student.id,
            pending_id,
            request.id,
            offers.len()
        );

        for offer in &offers {
            self.effects
                .cancel_bid(&offer.id, offer.bid_id.as_deref(), student.role)
                .await;
        }
        self.effects
            .notify(Notification::new(
                NotificationEvent::AssignmentRejected,
                Recipient::Teacher,
                &request.id,
                pending.notification_payload(),
            ))
            .await;

        Ok(Outcome::Applied(()))
    }

    /// Assignment requests waiting on the teacher.
    pub async fn assignments_for_teacher(&self, teacher_id: &str) -> WorkflowResult<Vec<PendingAssignment>> {
        let filter = Filter::all()
            .eq("teacher_id", teacher_id)
            .eq("status", PendingStatus::WaitingTeacher.as_str());
        self.pending_sorted(&filter).await
    }

    /// Assignments the teacher accepted that wait on the requester.
    pub async fn assignments_for_requester(&self, requester_id: &str) -> WorkflowResult<Vec<PendingAssignment>> {
        let filter = Filter::all()
            .eq("requester_id", requester_id)
            .eq("status", PendingStatus::WaitingStudent.as_str());
        self.pending_sorted(&filter).await
    }

    async fn pending_sorted(&self, filter: &Filter) -> WorkflowResult<Vec<PendingAssignment>> {
        let mut pending: Vec<PendingAssignment> =
            self.store.query_as(&collections::pending_assignments(), filter).await?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    pub async fn unions_for_teacher(&self, teacher_id: &str) -> WorkflowResult<Vec<ClassUnion>> {
        self.unions_sorted(&Filter::all().eq("teacher_id", teacher_id)).await
    }

    pub async fn unions_for_requester(&self, requester_id: &str) -> WorkflowResult<Vec<ClassUnion>> {
        self.unions_sorted(&Filter::all().eq("requester_id", requester_id)).await
    }

    async fn unions_sorted(&self, filter: &Filter) -> WorkflowResult<Vec<ClassUnion>> {
        let mut unions: Vec<ClassUnion> = self.store.query_as(&collections::class_unions(), filter).await?;
        unions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(unions)
    }
}
