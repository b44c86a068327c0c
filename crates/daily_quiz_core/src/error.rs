//! crates/daily_quiz_core/src/error.rs
//!
//! The error taxonomy of the client logic.

use chrono::{DateTime, Utc};

use crate::ports::PortError;

/// Shown when the server gives no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "Ha ocurrido un error. Inténtalo de nuevo.";

/// Why a submission payload was refused before reaching the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionGuard {
    #[error("question {0} has no selected answer")]
    Unanswered(usize),
    #[error("built {built} answers for {expected} questions")]
    LengthMismatch { built: usize, expected: usize },
    #[error("question id {0} appears more than once")]
    DuplicateQuestion(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No session could be resolved; the caller should redirect to login.
    #[error("No active session")]
    SessionMissing,
    /// The API answered 401; the session has been signed out.
    #[error("Session expired")]
    SessionExpired,
    /// A client-side check failed; no request was made.
    #[error("{0}")]
    Validation(String),
    #[error("No hay preguntas disponibles para hoy")]
    NoQuestions,
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    /// The request was cancelled; never shown to the user.
    #[error("Request aborted")]
    Aborted,
    #[error("Username changes are locked")]
    UsernameLocked {
        next_available_at: Option<DateTime<Utc>>,
    },
    #[error("Username already taken")]
    UsernameTaken,
    #[error("Invalid submission: {0}")]
    InvalidSubmission(#[from] SubmissionGuard),
}

/// A convenience type alias for `Result<T, ClientError>`.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// Session errors lead to sign-out and a login redirect, never inline text.
    pub fn is_session_error(&self) -> bool {
        matches!(self, ClientError::SessionMissing | ClientError::SessionExpired)
    }

    /// 5xx responses are the only errors worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Server { status, .. } if *status >= 500)
    }

    /// The text to show inline for this error.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { message, .. } | ClientError::Validation(message)
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            ClientError::NoQuestions
            | ClientError::UsernameTaken
            | ClientError::InvalidSubmission(_) => self.to_string(),
            ClientError::UsernameLocked {
                next_available_at: Some(at),
            } => format!(
                "Podrás cambiar tu nombre de usuario a partir del {}",
                at.format("%d/%m/%Y %H:%M")
            ),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<PortError> for ClientError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Unauthorized => ClientError::SessionExpired,
            PortError::NotFound(what) => ClientError::Server {
                status: 404,
                message: what,
            },
            PortError::Unexpected(message) => ClientError::Network(message),
        }
    }
}
