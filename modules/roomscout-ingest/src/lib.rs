pub mod batch;
pub mod bootstrap;
pub mod config;
pub mod dedup;
pub mod extractor;
pub mod fingerprint;
pub mod intake;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use config::PipelineConfig;
pub use dedup::DedupOptions;
pub use pipeline::IngestPipeline;
pub use report::PipelineReport;
