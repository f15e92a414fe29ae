//! Public error taxonomy for the query engine.
//!
//! The split matters to callers: `Validation` and `ContractViolation` are
//! structured failures reported as-is, `Database` failures propagate hard
//! (a wrong or silent row set is worse than a visible failure), and
//! `Upstream` marks a dependency call that could not be recovered. Paths
//! that are allowed to degrade (document retrieval, answer generation)
//! never surface here; they produce a degraded `Ok` result instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad caller input: empty query, unknown/invalid session, malformed
    /// connection string. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A stage produced output outside its contract (undecodable tool
    /// payload, unknown tool identity, unexpected terminal message).
    /// Always fatal: this is a defect upstream, not a user error.
    #[error("tool contract violated: {0}")]
    ContractViolation(String),

    /// Connection, reflection, or execution failure against the user's
    /// database.
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    /// An external dependency (LLM call) failed where the design does not
    /// permit degradation.
    #[error("upstream call failed: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }
}
