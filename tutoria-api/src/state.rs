use std::sync::Arc;
use tutoria_assignment::AssignmentWorkflow;
use tutoria_core::{BiddingMirror, EntityStore, Notifier};
use tutoria_offer::OfferLedger;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<AssignmentWorkflow>,
    /// Source of the live change feed behind the SSE endpoints.
    pub store: Arc<dyn EntityStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, mirror: Arc<dyn BiddingMirror>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            workflow: Arc::new(AssignmentWorkflow::new(store.clone(), mirror, notifier)),
            store,
        }
    }

    pub fn ledger(&self) -> &OfferLedger {
        self.workflow.ledger()
    }
}
