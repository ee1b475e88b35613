use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

/// Where a capture session gets its stills from. Implementations may block;
/// the controller calls them on the blocking pool.
pub trait VideoSource: Send + Sync {
    fn grab_frame(&self) -> Result<DynamicImage>;
}

/// Source that always yields the same still, decoded once up front.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    image: DynamicImage,
}

impl StillImageSource {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("failed to decode still image")?;
        Ok(Self { image })
    }
}

impl VideoSource for StillImageSource {
    fn grab_frame(&self) -> Result<DynamicImage> {
        Ok(self.image.clone())
    }
}

/// Compress a still to JPEG. Alpha is dropped; quality is clamped to 1..=100.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .context("jpeg encoding failed")?;
    Ok(buffer)
}
