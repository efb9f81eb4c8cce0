use std::fmt;
use tutoria_core::{ClassStatus, WorkflowError};

/// Operations that move a class request through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectOffer,
    TeacherAccept,
    TeacherReject,
    AdminCancel,
    StudentConfirm,
    StudentReject,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SelectOffer => "select offer",
            Action::TeacherAccept => "accept as teacher",
            Action::TeacherReject => "reject as teacher",
            Action::AdminCancel => "cancel assignment",
            Action::StudentConfirm => "confirm as student",
            Action::StudentReject => "reject as student",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a legal transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Status(ClassStatus),
    /// The request and all of its offers are removed.
    Destroyed,
}

/// The single table of legal moves. Everything else is `InvalidTransition`.
pub fn transition(from: ClassStatus, action: Action) -> Result<Next, WorkflowError> {
    use Action::*;
    use ClassStatus::*;

    match (from, action) {
        (Pending, SelectOffer) => Ok(Next::Status(InProcess)),
        (InProcess, TeacherAccept) => Ok(Next::Status(WaitingStudent)),
        (InProcess, TeacherReject) | (InProcess, AdminCancel) => Ok(Next::Status(Pending)),
        (WaitingStudent, StudentConfirm) => Ok(Next::Status(TeacherAssigned)),
        (WaitingStudent, StudentReject) => Ok(Next::Destroyed),
        (from, action) => Err(WorkflowError::invalid(from, action.as_str())),
    }
}
