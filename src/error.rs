//! Error identities the controller needs to branch on, as opposed to the
//! `anyhow::Error` every fallible function otherwise returns.
//!
//! Grounded on the teacher's `models/scope.rs::ScopeError` (a small
//! `thiserror` enum used for identity comparison rather than message
//! matching). The Go original distinguishes these cases by substring
//! (`strings.Contains(err.Error(), "InvalidActionOrNotAction")`); giving
//! each one its own enum variant lets callers `matches!` instead.

use crate::models::result::MpfResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpfError {
    /// The template itself is malformed; retrying will never help.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// The deployment engine's error text didn't match any known
    /// authorization-failure dialect.
    #[error("unable to parse authorization error: {0}")]
    ParseFailure(String),

    /// A transient condition (e.g. Azure hasn't finished propagating a
    /// role change, or a data-plane dependency isn't ready yet); the
    /// caller should retry the same attempt without changing the role.
    #[error("transient failure, retry without changing RBAC state")]
    RetryWithoutChange,

    /// The candidate action was rejected by the role-definition API as
    /// not matching any registered provider action.
    #[error("action rejected by Azure as invalid: {0}")]
    InvalidAction(String),

    /// The iteration cap was reached without a successful deployment.
    #[error("exhausted {0} iterations without a successful deployment")]
    IterationLimitReached(u32),

    /// Anything else: a plain I/O, network, or deserialization failure
    /// that the controller cannot meaningfully branch on, only report.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A non-recoverable run outcome, carrying whatever permissions had
/// already been discovered before the failure. `result` is empty for
/// [`MpfError::InvalidTemplate`] (spec.md §8 scenario 6: "no permissions
/// are returned"); every other abort path keeps its partial result so
/// the CLI can still print it before exiting non-zero (spec.md §7's
/// propagation policy).
#[derive(Debug)]
pub struct PartialFailure {
    pub result: MpfResult,
    pub source: anyhow::Error,
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for PartialFailure {}
