pub mod bidding;
pub mod class_request;
pub mod identity;
pub mod notification;
pub mod repository;

pub use bidding::{BidCancellation, BidDraft, BiddingMirror, DisabledBiddingMirror};
pub use class_request::{ClassRequest, ClassStatus, ClassType, Modality, NewClassRequest};
pub use identity::{Actor, Role, TeacherProfile};
pub use notification::{LogNotifier, Notifier};
pub use repository::{
    collections, ChangeEvent, ChangeKind, CollectionPath, DocPath, EntityStore, EntityStoreExt, Filter,
    StoreError, StoreResult,
};

/// Failure of an external collaborator (bidding mirror, notification sender).
///
/// Logged by the workflow, never propagated as the failure of a transition.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unreachable: {0}")]
    Transport(String),
    #[error("Collaborator rejected the call with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The current state does not allow the requested operation. Nothing was written.
    #[error("Invalid transition: cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The actor is not the party this step waits on.
    #[error("Not a participant: {0}")]
    NotParticipant(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A write failed after an earlier write of the same transition committed.
    /// Not rolled back; the records are left in the intermediate state named by `step`.
    #[error("Transition interrupted at step '{step}': {source}")]
    PartialFailure {
        step: &'static str,
        #[source]
        source: StoreError,
    },
}

impl WorkflowError {
    pub fn invalid(from: impl std::fmt::Display, action: impl Into<String>) -> Self {
        WorkflowError::InvalidTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
