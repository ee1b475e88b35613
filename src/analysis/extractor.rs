use anyhow::Result;
use async_trait::async_trait;

use crate::models::FeatureSet;

/// What the face model found in one image.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Exactly one face, with its features.
    Face(FeatureSet),
    /// Nothing detected. Distinct from a low-confidence face.
    NoFace,
}

/// Black-box feature extractor: image bytes in, facial features out.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<Extraction>;
}
