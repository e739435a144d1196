//! docroute — document classification for financial and legal filing.
//!
//! Classifies uploaded documents into a caller-supplied taxonomy of file
//! types, categories, and folders. Model calls are wrapped in deterministic
//! safety nets (filename heuristics, a keyword verifier, canonical
//! enumeration matching) so the pipeline always produces a usable decision,
//! and human corrections feed back through context tiers and cache
//! invalidation.

pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::PipelineConfig;
pub use pipeline::{ClassificationPipeline, ClassificationResult, PipelineInput, PipelineOutput};

/// Initialize structured logging from `RUST_LOG`, defaulting to info for
/// this crate. Call once at host startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docroute=info")),
        )
        .init();

    tracing::info!("docroute v{}", config::APP_VERSION);
}
