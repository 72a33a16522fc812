//! Error taxonomy shared by the poller, the refreshers and the operations.

use std::time::Duration;

/// Raw failure returned by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    /// HTTP-like status code when the collaborator has one.
    pub status: Option<u16>,
    /// The remote system's own message.
    pub message: String,
}

/// Message some control planes return instead of a bare 404.
pub const NOT_FOUND_MESSAGE: &str = "Not found";

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404) || self.message == NOT_FOUND_MESSAGE
    }
}

/// Coarse classification of a [`ConvergeError`], stable across `Action` wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    TransientAbsence,
    TerminalAbsence,
    FatalRemoteEvent,
    UnexpectedState,
    Timeout,
    Cancellation,
    Remote,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("{0}")]
    TransientAbsence(String),
    #[error("{0}")]
    TerminalAbsence(String),
    /// An explicit failure event or failure status reported by the remote system.
    #[error("{reason}: {message}")]
    FatalEvent { reason: String, message: String },
    #[error("unexpected state '{label}'{}", detail_suffix(.detail))]
    UnexpectedState { label: String, detail: Option<String> },
    #[error("more than one {what} found ({count})")]
    Ambiguous { what: String, count: usize },
    #[error("timeout while waiting for state to become '{target}' (last state: '{last}', timeout: {timeout:?})")]
    Timeout { target: String, last: String, timeout: Duration },
    #[error("cancelled while waiting for state to become '{target}'")]
    Cancelled { target: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{action}: {source}")]
    Action {
        action: String,
        #[source]
        source: Box<ConvergeError>,
    },
}

pub type ConvergeResult<T> = Result<T, ConvergeError>;

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ConvergeError {
    /// Wrap with the high-level action that failed ("creating cluster", ...).
    pub fn with_action(self, action: impl Into<String>) -> Self {
        ConvergeError::Action { action: action.into(), source: Box::new(self) }
    }

    /// Innermost error below any number of `Action` layers.
    pub fn root(&self) -> &ConvergeError {
        let mut cur = self;
        while let ConvergeError::Action { source, .. } = cur {
            cur = source;
        }
        cur
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvergeError::Validation(_) | ConvergeError::Ambiguous { .. } => ErrorKind::Validation,
            ConvergeError::TransientAbsence(_) => ErrorKind::TransientAbsence,
            ConvergeError::TerminalAbsence(_) => ErrorKind::TerminalAbsence,
            ConvergeError::FatalEvent { .. } => ErrorKind::FatalRemoteEvent,
            ConvergeError::UnexpectedState { .. } => ErrorKind::UnexpectedState,
            ConvergeError::Timeout { .. } => ErrorKind::Timeout,
            ConvergeError::Cancelled { .. } => ErrorKind::Cancellation,
            ConvergeError::Remote(_) => ErrorKind::Remote,
            ConvergeError::Action { source, .. } => source.kind(),
        }
    }

    /// True when the underlying failure is a remote "object does not exist".
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            ConvergeError::Remote(e) => e.is_not_found(),
            ConvergeError::TransientAbsence(_) | ConvergeError::TerminalAbsence(_) => true,
            _ => false,
        }
    }

    pub fn remote(&self) -> Option<&RemoteError> {
        match self.root() {
            ConvergeError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Extension to attach an action description to any fallible call.
pub trait ActionContext<T> {
    fn action(self, action: &str) -> ConvergeResult<T>;
}

impl<T, E: Into<ConvergeError>> ActionContext<T> for Result<T, E> {
    fn action(self, action: &str) -> ConvergeResult<T> {
        self.map_err(|e| e.into().with_action(action))
    }
}

/// Outcome of classifying a raw remote failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Stop polling and surface this message.
    Fatal(String),
    /// The object is gone and that is the desired end state.
    NotFoundAsSuccess,
    /// The object is not visible yet; keep polling under this label.
    Retryable { label: String },
}

/// What the poller knows when it asks for a classification.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub identity: &'a str,
    pub target: &'a str,
    /// A positive timeout was requested.
    pub waiting: bool,
}

/// Maps family-specific remote failures into the [`Classification`] taxonomy.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &RemoteError, ctx: &ClassifyContext<'_>) -> Classification;
}
