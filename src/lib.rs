//! trivium: agentic query routing and finalization.
//!
//! Routes a natural-language query to one of three answer paths (general
//! knowledge, document-grounded retrieval, or database query) and
//! produces a single normalized [`FinalAnswer`] with provenance. The
//! pipeline is a three-node acyclic graph: intent classification, optional
//! tool execution (document retrieval or NL→SQL with a fail-closed safety
//! gate), and finalization over conversation memory.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod providers;
pub mod rag;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

pub use agent::Engine;
pub use config::AppConfig;
pub use error::EngineError;
pub use types::{AnswerMode, Citation, Confidence, FinalAnswer};
