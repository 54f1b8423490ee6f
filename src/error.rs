//! Typed errors the decision pipeline branches on.
//!
//! Per-item failures (`ProviderError`, `ParseError`) are always recovered
//! locally as a skip decision; they never abort a scan. Session-level
//! failures use `anyhow` at the call site and surface through the scan
//! session's `error` field.

use thiserror::Error;

/// Failure of a single provider call (transport, auth, timeout).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("empty or unusable reply: {0}")]
    EmptyReply(String),
}

/// Failure to turn a raw provider reply into a canonical decision,
/// after salvage was attempted.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("reply has no usable action field")]
    MissingAction,

    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

/// Why a scan could not be started. Anything here is surfaced before the
/// session ever enters the running state.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("provider {0:?} is not configured")]
    Unconfigured(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
