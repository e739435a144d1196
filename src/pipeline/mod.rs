//! Document classification pipeline.
//!
//! A request flows through filename heuristics, a summary model call, a
//! classification model call, the deterministic verifier, checklist
//! matching, and an optional critic arbitration, with a content-hash cache
//! in front and a correction feedback loop behind.

pub mod cache;
pub mod canonical;
pub mod corrections;
pub mod events;
pub mod filename;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod reference;
pub mod retry;
pub mod stages;
pub mod types;
pub mod verifier;

pub use orchestrator::ClassificationPipeline;
pub use types::{ClassificationResult, PipelineInput, PipelineOutput};
