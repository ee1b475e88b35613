pub mod deployment;
pub mod extractor;
pub mod trigger;

pub use deployment::validate_model_deployment;
pub use extractor::{Extraction, FeatureExtractor};
pub use trigger::{AnalysisOutcome, AnalysisTrigger};
