//! Shared error types.
//!
//! Three kinds are distinguished per spec.md §7: transient exchange errors
//! (surfaced as data, not panics), semantic errors (handled locally or logged
//! and treated as "unplaced"), and programmer/invariant violations (fatal to
//! the current actor thread, which its supervisor restarts).

use thiserror::Error;

/// Errors from the exchange HTTP boundary. Always transient from the Gate's
/// point of view — it never fails itself, but every call it makes can.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("exchange returned errors: {0:?}")]
    Api(Vec<String>),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Errors from the order placement engine (§4.6).
#[derive(Debug, Error, Clone)]
pub enum OpeError {
    #[error("exchange rejected order: {0}")]
    Rejected(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Invariant violations that are fatal to the owning actor thread (§7.3).
/// A `Supervisor` catches the thread death and respawns it.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("chunked history page count mismatch: expected {expected}, got {got}")]
    PageCountMismatch { expected: usize, got: usize },
}
