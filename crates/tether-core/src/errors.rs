/// Why a user's option selection was rejected. Reported to the immediate
/// caller only, never escalated to the session narrative.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no permission request is outstanding for this session")]
    NoRequestOutstanding,
    #[error("option index {index} out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },
    #[error("this permission request is no longer valid")]
    Stale,
    #[error("could not deliver the selection to the agent: {0}")]
    TransportFailed(String),
    #[error("no session found for key `{0}`")]
    UnknownSession(String),
}

/// Presentation sink failure. `update_message` failures are non-fatal by
/// contract: the core logs and keeps narrating.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink rejected the call: {0}")]
    Rejected(String),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}
