pub mod config;
pub mod engine;

pub use config::{EmotionWeights, ScoringConfig};
pub use engine::ScoringEngine;
