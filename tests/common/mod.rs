#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use engagement_lib::analysis::{Extraction, FeatureExtractor};
use engagement_lib::capture::VideoSource;
use engagement_lib::models::{EmotionDistribution, FeatureSet, GazeVector, HeadPose};
use engagement_lib::ObjectStore;
use image::{DynamicImage, RgbImage};
use tokio::sync::Semaphore;

/// In-memory object store that records every put.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Object store whose puts hang until `release` is called.
pub struct BlockingStore {
    gate: Semaphore,
    pub inner: MemoryStore,
}

impl BlockingStore {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            inner: MemoryStore::default(),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1_000);
    }
}

#[async_trait]
impl ObjectStore for BlockingStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let _permit = self.gate.acquire().await?;
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

/// Fails the first `failures` puts, then behaves.
pub struct FlakyStore {
    failures: usize,
    pub attempts: AtomicUsize,
    pub inner: MemoryStore,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
            inner: MemoryStore::default(),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(anyhow!("connection reset (attempt {})", attempt + 1));
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

pub struct SolidColorSource;

impl VideoSource for SolidColorSource {
    fn grab_frame(&self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            8,
            image::Rgb([30, 120, 200]),
        )))
    }
}

pub struct BrokenSource;

impl VideoSource for BrokenSource {
    fn grab_frame(&self) -> Result<DynamicImage> {
        Err(anyhow!("camera track ended"))
    }
}

/// Engaged, forward-facing participant.
pub fn attentive_features() -> FeatureSet {
    FeatureSet {
        head_pose: HeadPose {
            roll: 0.0,
            pitch: 2.0,
            yaw: 5.0,
        },
        eyes_open: true,
        emotion_distribution: EmotionDistribution {
            happy: 0.7,
            neutral: 0.3,
            ..EmotionDistribution::default()
        },
        emotion_confidence: 0.9,
        gaze_vector: GazeVector {
            x: 0.1,
            y: 0.0,
            z: 1.0,
        },
        is_looking_at_screen: true,
        gaze_confidence: 0.8,
        ..FeatureSet::default()
    }
}

/// Looking away with a flat expression.
pub fn distracted_features() -> FeatureSet {
    FeatureSet {
        head_pose: HeadPose {
            yaw: 50.0,
            ..HeadPose::default()
        },
        emotion_distribution: EmotionDistribution {
            neutral: 0.8,
            sad: 0.2,
            ..EmotionDistribution::default()
        },
        emotion_confidence: 0.6,
        gaze_confidence: 0.4,
        ..FeatureSet::default()
    }
}

/// Maps image bytes to a canned extraction; unknown bytes mean no face.
#[derive(Default)]
pub struct StubExtractor {
    pub responses: Mutex<HashMap<Vec<u8>, FeatureSet>>,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl StubExtractor {
    pub fn with_face(self, image: &[u8], features: FeatureSet) -> Self {
        self.responses.lock().unwrap().insert(image.to_vec(), features);
        self
    }
}

#[async_trait]
impl FeatureExtractor for StubExtractor {
    async fn extract(&self, image: &[u8]) -> Result<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(anyhow!("model runtime crashed"));
        }
        Ok(match self.responses.lock().unwrap().get(image) {
            Some(features) => Extraction::Face(features.clone()),
            None => Extraction::NoFace,
        })
    }
}

pub fn shared<T: ObjectStore + 'static>(store: T) -> (Arc<T>, Arc<dyn ObjectStore>) {
    let concrete = Arc::new(store);
    let erased: Arc<dyn ObjectStore> = concrete.clone();
    (concrete, erased)
}
