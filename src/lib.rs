pub mod aggregation;
pub mod analysis;
pub mod capture;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod scoring;
pub mod settings;
pub mod storage;
pub mod utils;

pub use aggregation::{AggregationStore, UpdateOutcome};
pub use analysis::{AnalysisOutcome, AnalysisTrigger, Extraction, FeatureExtractor};
pub use capture::{FrameCaptureController, Uploader, VideoSource};
pub use db::{Database, DocumentTxn, TransactionalStore};
pub use error::{PipelineError, PipelineResult};
pub use scoring::{ScoringConfig, ScoringEngine};
pub use settings::PipelineSettings;
pub use storage::{FsObjectStore, ObjectStore};

/// Initialise `env_logger` at `Info`, letting `RUST_LOG` override it.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
