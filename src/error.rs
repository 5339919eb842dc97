// ⚠️ Error taxonomy + the `{param, msg}` lists every mutating endpoint returns

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// FIELD ERROR (wire shape)
// ============================================================================

/// One entry of a structured error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub param: String,
    pub msg: String,
}

impl FieldError {
    pub fn new(param: impl Into<String>, msg: impl Into<String>) -> Self {
        FieldError {
            param: param.into(),
            msg: msg.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.param, self.msg)
    }
}

// ============================================================================
// GATE REJECTIONS
// ============================================================================

/// Why the verification gate refused a mutating request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("caller is not logged in")]
    Unauthenticated,

    #[error("caller lacks the administrator role")]
    Forbidden,

    #[error("submission is outside the freshness window")]
    Stale,

    #[error("anti-abuse verification failed")]
    FailedVerification,
}

// ============================================================================
// MODERATION ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("request rejected: {0}")]
    Rejected(#[from] GateRejection),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed ({} field errors)", .0.len())]
    ValidationFailed(Vec<FieldError>),

    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store failure: {0}")]
    StoreState(String),
}

impl ModerationError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ModerationError::NotFound(what.into())
    }

    pub fn is_store_failure(&self) -> bool {
        matches!(self, ModerationError::Store(_) | ModerationError::StoreState(_))
    }
}

impl From<Vec<FieldError>> for ModerationError {
    fn from(errors: Vec<FieldError>) -> Self {
        ModerationError::ValidationFailed(errors)
    }
}

impl From<serde_json::Error> for ModerationError {
    fn from(e: serde_json::Error) -> Self {
        ModerationError::StoreState(format!("corrupt stored JSON: {}", e))
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;

// ============================================================================
// OPERATIONS (error keys)
// ============================================================================

/// Operation names, used to key the error message shown next to each form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddBuilding,
    SubmitDeletion,
    ApproveAddition,
    RemoveAddition,
    ApproveDeletion,
    RemoveDeletion,
    GetPendingAddition,
    GetBuilding,
}

impl Operation {
    pub fn message_param(&self) -> &'static str {
        match self {
            Operation::AddBuilding => "addBuildingMessage",
            Operation::SubmitDeletion => "removeDeletionMessage",
            Operation::ApproveAddition => "approvePendingAdditionMessage",
            Operation::RemoveAddition => "removePendingAdditionMessage",
            Operation::ApproveDeletion => "approvePendingDeletionMessage",
            Operation::RemoveDeletion => "removePendingDeletionMessage",
            Operation::GetPendingAddition => "displayPendingAdditionMessage",
            Operation::GetBuilding => "displayBuildingMessage",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::AddBuilding => "Add building failed.",
            Operation::SubmitDeletion => "An error occurred while deleting the building.",
            Operation::ApproveAddition => "An error occurred while approving the pending addition.",
            Operation::RemoveAddition => "An error occurred while removing the pending addition.",
            Operation::ApproveDeletion => "An error occurred while approving the pending deletion.",
            Operation::RemoveDeletion => "An error occurred while removing the pending deletion.",
            Operation::GetPendingAddition => "An error occurred while getting the pending addition.",
            Operation::GetBuilding => "An error occurred while getting the building.",
        }
    }

    fn rejection_message(&self, rejection: GateRejection) -> &'static str {
        match (self, rejection) {
            (Operation::SubmitDeletion, GateRejection::Unauthenticated) => {
                "You must be logged in to delete buildings."
            }
            (_, GateRejection::Unauthenticated) => "Not logged in.",
            (_, GateRejection::Forbidden) => "Your account does not have access to this content.",
            (_, GateRejection::Stale) => "Request expired. Please try again.",
            (_, GateRejection::FailedVerification) => "Failed reCAPTCHA test.",
        }
    }

    /// Render an error as the list returned to the client.
    ///
    /// Gate rejections and engine failures collapse to one entry keyed by the
    /// operation; validation failures keep their per-field entries.
    pub fn error_list(&self, err: &ModerationError) -> Vec<FieldError> {
        match err {
            ModerationError::Rejected(rejection) => vec![FieldError::new(
                self.message_param(),
                self.rejection_message(*rejection),
            )],
            ModerationError::ValidationFailed(errors) => errors.clone(),
            _ => vec![FieldError::new(self.message_param(), self.failure_message())],
        }
    }
}
