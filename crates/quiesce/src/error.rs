#![forbid(unsafe_code)]

//! Error types for the scope engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DigestError>;

/// Failures surfaced synchronously by [`Scope::digest`](crate::Scope::digest).
///
/// Panics raised by caller-supplied watch functions or listeners are not
/// captured here; they unwind through the digest to the caller.
#[derive(Debug, Error)]
pub enum DigestError {
    /// The watcher graph kept producing changes on every pass and the
    /// iteration budget ran out. At least one watcher (or a cycle of
    /// watchers) dirties itself forever; retrying will not help.
    #[error(
        "digest did not converge within {budget} dirty passes ({watchers} watchers registered)"
    )]
    NonConvergent { budget: u32, watchers: usize },
}
