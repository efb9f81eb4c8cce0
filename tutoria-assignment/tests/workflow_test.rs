use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tutoria_assignment::{AssignmentWorkflow, ClassUnion, Outcome, PendingAssignment, PendingStatus};
use tutoria_core::{
    collections, Actor, BidCancellation, BidDraft, BiddingMirror, ChangeEvent, ClassRequest, ClassStatus, ClassType,
    CollaboratorError, CollectionPath, DocPath, EntityStore, EntityStoreExt, Filter, Modality, NewClassRequest,
    Notifier, Role, StoreError, StoreResult, TeacherProfile, WorkflowError,
};
use tutoria_offer::{Offer, OfferStanding, OfferStatus, OfferSubmission, TeacherOfferEntry};
use tutoria_shared::models::{Notification, NotificationEvent, Recipient};
use tutoria_store::InMemoryStore;

/// In-memory store whose writes into one collection can be made to fail.
struct FlakyStore {
    inner: InMemoryStore,
    poisoned: Mutex<Option<String>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            poisoned: Mutex::new(None),
        }
    }

    fn poison(&self, collection: &CollectionPath) {
        *self.poisoned.lock().unwrap() = Some(collection.as_str().to_string());
    }

    fn heal(&self) {
        *self.poisoned.lock().unwrap() = None;
    }

    fn check(&self, collection: &CollectionPath) -> StoreResult<()> {
        match self.poisoned.lock().unwrap().as_deref() {
            Some(target) if target == collection.as_str() => {
                Err(StoreError::Backend(format!("write to {} refused", target)))
            }
            _ => Ok(()),
        }
    }

    async fn count(&self, collection: &CollectionPath) -> usize {
        self.inner.count(collection).await
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String> {
        self.check(collection)?;
        self.inner.create(collection, doc).await
    }

    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()> {
        self.check(&path.collection)?;
        self.inner.set(path, doc).await
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        self.inner.get(path).await
    }

    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()> {
        self.check(&path.collection)?;
        self.inner.update(path, patch).await
    }

    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool> {
        self.check(&path.collection)?;
        self.inner.update_where(path, guard, patch).await
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<bool> {
        self.check(&path.collection)?;
        self.inner.delete(path).await
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.inner.query(collection, filter).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe()
    }
}

/// Hands control back to the scheduler before every call so concurrent
/// transitions interleave step by step.
struct YieldingStore(Arc<FlakyStore>);

#[async_trait]
impl EntityStore for YieldingStore {
    async fn create(&self, collection: &CollectionPath, doc: Value) -> StoreResult<String> {
        tokio::task::yield_now().await;
        self.0.create(collection, doc).await
    }

    async fn set(&self, path: &DocPath, doc: Value) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.set(path, doc).await
    }

    async fn get(&self, path: &DocPath) -> StoreResult<Option<Value>> {
        tokio::task::yield_now().await;
        self.0.get(path).await
    }

    async fn update(&self, path: &DocPath, patch: Value) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.update(path, patch).await
    }

    async fn update_where(&self, path: &DocPath, guard: &Filter, patch: Value) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.update_where(path, guard, patch).await
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.delete(path).await
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> StoreResult<Vec<Value>> {
        tokio::task::yield_now().await;
        self.0.query(collection, filter).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.0.subscribe()
    }
}

/// Bidding service double. Issues sequential bid ids and records every call.
struct ScriptedMirror {
    calls: Mutex<Vec<String>>,
    issued: AtomicUsize,
    fail: bool,
}

impl ScriptedMirror {
    fn new(fail: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
            fail,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: String) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(CollaboratorError::Rejected {
                status: 500,
                message: "pujas unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BiddingMirror for ScriptedMirror {
    async fn open_bid(&self, draft: &BidDraft) -> Result<Option<String>, CollaboratorError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("open:{}", draft.offer_id))?;
        Ok(Some(format!("bid-{}", n)))
    }

    async fn accept_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        self.record(format!("accept:{}", bid_id))
    }

    async fn confirm_bid(&self, bid_id: &str) -> Result<(), CollaboratorError> {
        self.record(format!("confirm:{}", bid_id))
    }

    async fn cancel_bid(&self, cancellation: &BidCancellation) -> Result<(), CollaboratorError> {
        self.record(format!("cancel:{}:{}", cancellation.bid_id, cancellation.role.as_str()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<(NotificationEvent, Recipient)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| (n.event, n.recipient))
            .collect()
    }

    fn count(&self, event: NotificationEvent) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.event == event).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<FlakyStore>,
    mirror: Arc<ScriptedMirror>,
    notifier: Arc<RecordingNotifier>,
    workflow: AssignmentWorkflow,
    request: ClassRequest,
    /// Teacher A, 20 €/h.
    o1: Offer,
    /// Teacher B, 18 €/h.
    o2: Offer,
}

fn admin() -> Actor {
    Actor::new("admin-1", "Admin", Role::Admin)
}

fn student() -> Actor {
    Actor::new("s1", "Lucía", Role::Student)
}

fn teacher_a() -> Actor {
    Actor::new("tA", "Ana", Role::Teacher)
}

fn teacher_b() -> Actor {
    Actor::new("tB", "Bruno", Role::Teacher)
}

fn profile(actor: &Actor) -> TeacherProfile {
    TeacherProfile {
        id: actor.id.clone(),
        name: actor.name.clone(),
        email: Some(format!("{}@example.com", actor.id).into()),
        career: Some("Ingeniería".to_string()),
    }
}

fn submission(price_cents: i64) -> OfferSubmission {
    OfferSubmission {
        subjects: ["matematicas".to_string()].into_iter().collect(),
        availability: ["lunes-16".to_string()].into_iter().collect(),
        price_cents,
    }
}

async fn harness_with(failing_mirror: bool) -> Harness {
    let store = Arc::new(FlakyStore::new());
    let mirror = Arc::new(ScriptedMirror::new(failing_mirror));
    let notifier = Arc::new(RecordingNotifier::default());
    let workflow = AssignmentWorkflow::new(store.clone(), mirror.clone(), notifier.clone());

    let request = workflow
        .open_request(NewClassRequest {
            requester_id: "s1".to_string(),
            requester_name: "Lucía".to_string(),
            requester_email: Some("lucia@example.com".into()),
            requester_role: Role::Student,
            child_id: None,
            child_name: None,
            subjects: vec!["matematicas".to_string()],
            grade: "2 Bachillerato".to_string(),
            modality: Modality::Online,
            city: None,
            class_type: ClassType::Individual,
            weekly_hours: 3.0,
            availability: ["lunes-16".to_string(), "jueves-18".to_string()].into_iter().collect(),
            start_date: None,
            end_date: None,
            notes: None,
        })
        .await
        .unwrap();

    let o1 = workflow
        .ledger()
        .submit_offer(&request.id, &profile(&teacher_a()), submission(2000))
        .await
        .unwrap();
    let o2 = workflow
        .ledger()
        .submit_offer(&request.id, &profile(&teacher_b()), submission(1800))
        .await
        .unwrap();

    Harness {
        store,
        mirror,
        notifier,
        workflow,
        request,
        o1,
        o2,
    }
}

async fn harness() -> Harness {
    harness_with(false).await
}

impl Harness {
    async fn request_doc(&self) -> Option<ClassRequest> {
        self.store
            .get_as(&collections::class_request(&self.request.id))
            .await
            .unwrap()
    }

    async fn offer_doc(&self, offer: &Offer) -> Option<Offer> {
        self.store
            .get_as(&collections::offer(&self.request.id, &offer.id))
            .await
            .unwrap()
    }

    async fn index_entry(&self, offer: &Offer) -> Option<TeacherOfferEntry> {
        self.store
            .get_as(&collections::teacher_offer_entry(&offer.teacher_id, &offer.id))
            .await
            .unwrap()
    }

    async fn pending_docs(&self) -> Vec<PendingAssignment> {
        self.store
            .query_as(
                &collections::pending_assignments(),
                &Filter::all().eq("class_request_id", self.request.id.as_str()),
            )
            .await
            .unwrap()
    }

    async fn union_docs(&self) -> Vec<ClassUnion> {
        self.store
            .query_as(
                &collections::class_unions(),
                &Filter::all().eq("class_request_id", self.request.id.as_str()),
            )
            .await
            .unwrap()
    }

    /// At most one active offer, and request status agrees with the pending/union records.
    async fn assert_consistent(&self) {
        let offers = self.workflow.ledger().list_offers(&self.request.id).await.unwrap();
        let active = offers.iter().filter(|o| o.status.is_active()).count();
        assert!(active <= 1, "{} active offers", active);

        let Some(request) = self.request_doc().await else {
            return;
        };
        let pending = self.pending_docs().await;
        let unions = self.union_docs().await;
        assert!(pending.len() <= 1);
        assert_eq!(request.status == ClassStatus::Pending, pending.is_empty() && unions.is_empty());
        assert_eq!(
            request.status == ClassStatus::TeacherAssigned,
            !unions.is_empty() && pending.is_empty()
        );
        match request.status {
            ClassStatus::InProcess => assert_eq!(pending[0].status, PendingStatus::WaitingTeacher),
            ClassStatus::WaitingStudent => assert_eq!(pending[0].status, PendingStatus::WaitingStudent),
            _ => {}
        }
    }

    async fn select_o2(&self) -> PendingAssignment {
        self.workflow
            .select_offer(&self.request.id, &self.o2.id, &admin())
            .await
            .unwrap()
    }

    /// A second workflow over the same records whose store calls interleave.
    fn interleaved(&self) -> AssignmentWorkflow {
        AssignmentWorkflow::new(
            Arc::new(YieldingStore(self.store.clone())),
            self.mirror.clone(),
            self.notifier.clone(),
        )
    }

    async fn select_and_accept_o2(&self) -> PendingAssignment {
        let pending = self.select_o2().await;
        let outcome = self.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap();
        assert!(outcome.is_applied());
        pending
    }
}

#[tokio::test]
async fn test_select_offer_opens_pending_assignment() {
    let h = harness().await;
    h.assert_consistent().await;

    let pending = h.select_o2().await;

    let request = h.request_doc().await.unwrap();
    assert_eq!(request.status, ClassStatus::InProcess);
    assert_eq!(request.selected_teacher_id.as_deref(), Some("tB"));
    assert_eq!(request.selected_price_cents, Some(1800));
    assert_eq!(h.offer_doc(&h.o2).await.unwrap().status, OfferStatus::InProcess);
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);

    assert_eq!(pending.status, PendingStatus::WaitingTeacher);
    assert_eq!(pending.offer_id, h.o2.id);
    assert_eq!(pending.bid_id, h.o2.bid_id);
    assert_eq!(h.pending_docs().await, vec![pending]);
    h.assert_consistent().await;

    h.workflow.flush().await;
    assert_eq!(
        h.notifier.events(),
        vec![(NotificationEvent::OfferSelected, Recipient::Teacher)]
    );
}

#[tokio::test]
async fn test_second_selection_is_rejected_without_writes() {
    let h = harness().await;
    h.select_o2().await;

    let err = h
        .workflow
        .select_offer(&h.request.id, &h.o1.id, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    assert_eq!(h.pending_docs().await.len(), 1);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_only_admins_select() {
    let h = harness().await;
    let err = h
        .workflow
        .select_offer(&h.request.id, &h.o2.id, &student())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotParticipant(_)));
    assert!(h.pending_docs().await.is_empty());
}

#[tokio::test]
async fn test_teacher_accept_waits_on_student() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    let stored = h.pending_docs().await;
    assert_eq!(stored[0].id, pending.id);
    assert_eq!(stored[0].status, PendingStatus::WaitingStudent);
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    h.assert_consistent().await;

    let bid = h.o2.bid_id.clone().unwrap();
    assert!(h.mirror.calls().contains(&format!("accept:{}", bid)));

    h.workflow.flush().await;
    assert_eq!(
        h.notifier.events(),
        vec![
            (NotificationEvent::OfferSelected, Recipient::Teacher),
            (NotificationEvent::TeacherAccepted, Recipient::Student),
        ]
    );
}

#[tokio::test]
async fn test_teacher_accept_checks_participant_and_repeats_harmlessly() {
    let h = harness().await;
    let pending = h.select_o2().await;

    let err = h.workflow.teacher_accept(&pending.id, &teacher_a()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotParticipant(_)));
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::InProcess);

    assert!(h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap().is_applied());
    assert_eq!(
        h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap(),
        Outcome::AlreadyHandled
    );
    assert_eq!(
        h.workflow.teacher_accept("no-such-assignment", &teacher_b()).await.unwrap(),
        Outcome::AlreadyHandled
    );
}

#[tokio::test]
async fn test_teacher_reject_reopens_and_keeps_siblings() {
    let h = harness().await;
    let pending = h.select_o2().await;

    let outcome = h.workflow.teacher_reject(&pending.id, &teacher_b()).await.unwrap();
    let Outcome::Applied(reopened) = outcome else {
        panic!("teacher reject was not applied");
    };
    assert_eq!(reopened.status, ClassStatus::Pending);

    let request = h.request_doc().await.unwrap();
    assert_eq!(request.status, ClassStatus::Pending);
    assert!(request.selected_teacher_id.is_none());
    assert!(request.selected_price_cents.is_none());
    assert!(h.offer_doc(&h.o2).await.is_none());
    assert!(h.index_entry(&h.o2).await.is_none());
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    assert!(h.index_entry(&h.o1).await.is_some());
    assert!(h.pending_docs().await.is_empty());
    h.assert_consistent().await;

    let bid = h.o2.bid_id.clone().unwrap();
    assert!(h.mirror.calls().contains(&format!("cancel:{}:teacher", bid)));

    // The request can take a new selection.
    let again = h
        .workflow
        .select_offer(&h.request.id, &h.o1.id, &admin())
        .await
        .unwrap();
    assert_eq!(again.teacher_id, "tA");
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_admin_cancel_reopens_and_requires_admin() {
    let h = harness().await;
    let pending = h.select_o2().await;

    let err = h.workflow.admin_cancel(&pending.id, &teacher_b()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotParticipant(_)));

    assert!(h.workflow.admin_cancel(&pending.id, &admin()).await.unwrap().is_applied());
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::Pending);
    assert!(h.offer_doc(&h.o2).await.is_none());
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    assert_eq!(
        h.workflow.admin_cancel(&pending.id, &admin()).await.unwrap(),
        Outcome::AlreadyHandled
    );

    let bid = h.o2.bid_id.clone().unwrap();
    assert!(h.mirror.calls().contains(&format!("cancel:{}:admin", bid)));
}

#[tokio::test]
async fn test_teacher_cannot_reject_after_accepting() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    let err = h.workflow.teacher_reject(&pending.id, &teacher_b()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
}

#[tokio::test]
async fn test_student_reject_destroys_request_and_offers() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    let outcome = h.workflow.student_reject(&pending.id, &student()).await.unwrap();
    assert_eq!(outcome, Outcome::Applied(()));

    assert!(h.request_doc().await.is_none());
    for offer in [&h.o1, &h.o2] {
        assert!(h.offer_doc(offer).await.is_none());
        assert!(h.index_entry(offer).await.is_none());
    }
    assert_eq!(h.store.count(&collections::offers(&h.request.id)).await, 0);
    assert!(h.pending_docs().await.is_empty());
    assert!(h.union_docs().await.is_empty());

    let calls = h.mirror.calls();
    for offer in [&h.o1, &h.o2] {
        let bid = offer.bid_id.clone().unwrap();
        assert!(calls.contains(&format!("cancel:{}:student", bid)));
    }

    h.workflow.flush().await;
    assert_eq!(
        h.notifier.events().last(),
        Some(&(NotificationEvent::AssignmentRejected, Recipient::Teacher))
    );
    assert_eq!(
        h.workflow.student_reject(&pending.id, &student()).await.unwrap(),
        Outcome::AlreadyHandled
    );
}

#[tokio::test]
async fn test_student_confirm_forms_union() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    let Outcome::Applied(union) = h.workflow.student_confirm(&pending.id, &student()).await.unwrap() else {
        panic!("confirm was not applied");
    };
    assert_eq!(union.id, pending.id);
    assert_eq!(union.class_request_id, h.request.id);
    assert_eq!(union.offer_id, h.o2.id);
    assert_eq!(union.teacher_id, "tB");

    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::TeacherAssigned);
    assert_eq!(h.offer_doc(&h.o2).await.unwrap().status, OfferStatus::Accepted);
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    assert!(h.pending_docs().await.is_empty());
    assert_eq!(h.union_docs().await, vec![union]);
    h.assert_consistent().await;

    // Teacher A's leftover offer reads as not selected.
    let mine = h.workflow.ledger().list_my_offers("tA").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].standing, OfferStanding::NotSelected);
    let mine = h.workflow.ledger().list_my_offers("tB").await.unwrap();
    assert_eq!(mine[0].standing, OfferStanding::Selected);

    let bid = h.o2.bid_id.clone().unwrap();
    assert!(h.mirror.calls().contains(&format!("confirm:{}", bid)));
    h.workflow.flush().await;
    assert_eq!(
        h.notifier.events().last(),
        Some(&(NotificationEvent::AssignmentFormed, Recipient::Both))
    );
}

#[tokio::test]
async fn test_confirming_twice_yields_one_union() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    assert!(h.workflow.student_confirm(&pending.id, &student()).await.unwrap().is_applied());
    assert_eq!(
        h.workflow.student_confirm(&pending.id, &student()).await.unwrap(),
        Outcome::AlreadyHandled
    );
    assert_eq!(h.store.count(&collections::class_unions()).await, 1);
}

#[tokio::test]
async fn test_only_the_requester_confirms() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    let other = Actor::new("s2", "Pablo", Role::Student);
    let err = h.workflow.student_confirm(&pending.id, &other).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotParticipant(_)));
    assert!(h.union_docs().await.is_empty());
}

#[tokio::test]
async fn test_confirm_before_teacher_accept_is_invalid() {
    let h = harness().await;
    let pending = h.select_o2().await;

    let err = h.workflow.student_confirm(&pending.id, &student()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(h.union_docs().await.is_empty());
}

#[tokio::test]
async fn test_selecting_on_assigned_request_writes_nothing() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;
    h.workflow.student_confirm(&pending.id, &student()).await.unwrap();

    let mut changes = h.store.subscribe();
    let err = h
        .workflow
        .select_offer(&h.request.id, &h.o1.id, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(changes.try_recv().is_err());
    assert_eq!(h.offer_doc(&h.o1).await.unwrap().status, OfferStatus::Open);
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::TeacherAssigned);
}

#[tokio::test]
async fn test_failing_mirror_does_not_block_transitions() {
    let h = harness_with(true).await;
    assert!(h.o2.bid_id.is_none());

    let pending = h.select_o2().await;
    assert!(h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap().is_applied());
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
    assert_eq!(h.pending_docs().await[0].status, PendingStatus::WaitingStudent);

    assert!(h.workflow.student_confirm(&pending.id, &student()).await.unwrap().is_applied());
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::TeacherAssigned);
}

#[tokio::test]
async fn test_failing_mirror_on_accept_still_advances() {
    // Offers get bid ids from a healthy mirror, then the mirror goes down.
    let h = harness().await;
    let down = Arc::new(ScriptedMirror::new(true));
    let workflow = AssignmentWorkflow::new(h.store.clone(), down.clone(), h.notifier.clone());

    let pending = workflow
        .select_offer(&h.request.id, &h.o2.id, &admin())
        .await
        .unwrap();
    assert!(workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap().is_applied());

    let bid = h.o2.bid_id.clone().unwrap();
    assert_eq!(down.calls(), vec![format!("accept:{}", bid)]);
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_interrupted_confirm_resumes() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;

    h.store.poison(&collections::pending_assignments());
    let err = h.workflow.student_confirm(&pending.id, &student()).await.unwrap_err();
    match err {
        WorkflowError::PartialFailure { step, .. } => assert_eq!(step, "delete pending assignment"),
        other => panic!("unexpected error: {:?}", other),
    }
    // Both records survive the interruption.
    assert_eq!(h.union_docs().await.len(), 1);
    assert_eq!(h.pending_docs().await.len(), 1);
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::TeacherAssigned);
    let formed = h.union_docs().await.remove(0);

    h.store.heal();
    assert!(h.workflow.student_confirm(&pending.id, &student()).await.unwrap().is_applied());
    assert_eq!(h.union_docs().await, vec![formed]);
    assert!(h.pending_docs().await.is_empty());
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_interrupted_accept_resumes() {
    let h = harness().await;
    let pending = h.select_o2().await;

    h.store.poison(&collections::class_requests());
    let err = h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap_err();
    match err {
        WorkflowError::PartialFailure { step, .. } => assert_eq!(step, "mark class request waiting for student"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.pending_docs().await[0].status, PendingStatus::WaitingStudent);
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::InProcess);

    h.store.heal();
    let outcome = h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap();
    assert!(outcome.is_applied());
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
    h.assert_consistent().await;
    assert_eq!(
        h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap(),
        Outcome::AlreadyHandled
    );

    let bid = h.o2.bid_id.clone().unwrap();
    assert_eq!(h.mirror.count(&format!("accept:{}", bid)), 1);
    h.workflow.flush().await;
    assert_eq!(h.notifier.count(NotificationEvent::TeacherAccepted), 1);

    assert!(h.workflow.student_confirm(&pending.id, &student()).await.unwrap().is_applied());
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_concurrent_accepts_apply_once() {
    let h = harness().await;
    let pending = h.select_o2().await;
    let workflow = h.interleaved();

    let (tb1, tb2) = (teacher_b(), teacher_b());
    let (a, b) = tokio::join!(
        workflow.teacher_accept(&pending.id, &tb1),
        workflow.teacher_accept(&pending.id, &tb2),
    );
    let applied = [a.unwrap(), b.unwrap()].iter().filter(|o| o.is_applied()).count();
    assert_eq!(applied, 1);

    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::WaitingStudent);
    h.assert_consistent().await;
    let bid = h.o2.bid_id.clone().unwrap();
    assert_eq!(h.mirror.count(&format!("accept:{}", bid)), 1);
    workflow.flush().await;
    assert_eq!(h.notifier.count(NotificationEvent::TeacherAccepted), 1);
}

#[tokio::test]
async fn test_concurrent_confirms_apply_once() {
    let h = harness().await;
    let pending = h.select_and_accept_o2().await;
    let workflow = h.interleaved();

    let (s1, s2) = (student(), student());
    let (a, b) = tokio::join!(
        workflow.student_confirm(&pending.id, &s1),
        workflow.student_confirm(&pending.id, &s2),
    );
    let applied = [a.unwrap(), b.unwrap()].iter().filter(|o| o.is_applied()).count();
    assert_eq!(applied, 1);

    assert_eq!(h.union_docs().await.len(), 1);
    assert!(h.pending_docs().await.is_empty());
    h.assert_consistent().await;
    let bid = h.o2.bid_id.clone().unwrap();
    assert_eq!(h.mirror.count(&format!("confirm:{}", bid)), 1);
    workflow.flush().await;
    assert_eq!(h.notifier.count(NotificationEvent::AssignmentFormed), 1);
}

#[tokio::test]
async fn test_first_write_failure_is_plain_store_error() {
    let h = harness().await;
    h.store.poison(&collections::pending_assignments());

    let err = h
        .workflow
        .select_offer(&h.request.id, &h.o2.id, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)));
    assert_eq!(h.request_doc().await.unwrap().status, ClassStatus::Pending);
    assert_eq!(h.offer_doc(&h.o2).await.unwrap().status, OfferStatus::Open);
}

#[tokio::test]
async fn test_listings_follow_the_lifecycle() {
    let h = harness().await;
    let pending = h.select_o2().await;

    assert_eq!(h.workflow.assignments_for_teacher("tB").await.unwrap().len(), 1);
    assert!(h.workflow.assignments_for_teacher("tA").await.unwrap().is_empty());
    assert!(h.workflow.assignments_for_requester("s1").await.unwrap().is_empty());

    h.workflow.teacher_accept(&pending.id, &teacher_b()).await.unwrap();
    assert!(h.workflow.assignments_for_teacher("tB").await.unwrap().is_empty());
    assert_eq!(h.workflow.assignments_for_requester("s1").await.unwrap()[0].id, pending.id);

    h.workflow.student_confirm(&pending.id, &student()).await.unwrap();
    assert!(h.workflow.assignments_for_requester("s1").await.unwrap().is_empty());
    assert_eq!(h.workflow.unions_for_teacher("tB").await.unwrap().len(), 1);
    assert_eq!(h.workflow.unions_for_requester("s1").await.unwrap()[0].teacher_name, "Bruno");
    assert!(h.workflow.unions_for_teacher("tA").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_request_validates() {
    let h = harness().await;
    let err = h
        .workflow
        .open_request(NewClassRequest {
            requester_id: "t9".to_string(),
            requester_name: "Teacher".to_string(),
            requester_email: None,
            requester_role: Role::Teacher,
            child_id: None,
            child_name: None,
            subjects: vec!["fisica".to_string()],
            grade: "1 ESO".to_string(),
            modality: Modality::InPerson,
            city: Some("Sevilla".to_string()),
            class_type: ClassType::Paired,
            weekly_hours: 1.0,
            availability: ["martes-10".to_string()].into_iter().collect(),
            start_date: None,
            end_date: None,
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let fetched = h.workflow.get_request(&h.request.id).await.unwrap();
    assert_eq!(fetched.id, h.request.id);
    assert!(matches!(
        h.workflow.get_request("missing").await.unwrap_err(),
        WorkflowError::NotFound(_)
    ));
}
