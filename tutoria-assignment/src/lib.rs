pub mod effects;
pub mod machine;
pub mod models;
pub mod workflow;

pub use effects::SideEffects;
pub use machine::{transition, Action, Next};
pub use models::{ClassUnion, PendingAssignment, PendingStatus, UnionStatus};
pub use workflow::{AssignmentWorkflow, Outcome};
