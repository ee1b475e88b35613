use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::PipelineError;
use crate::scoring::ScoringConfig;

/// Environment variable naming the settings file when none is passed explicitly.
pub const SETTINGS_ENV: &str = "ENGAGEMENT_SETTINGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// Requested intervals below this are raised to it
    pub min_interval_ms: u64,
    pub default_interval_ms: u64,
    /// Process-wide ceiling on in-flight uploads; ticks over it are dropped
    pub max_concurrent_uploads: usize,
    pub jpeg_quality: u8,
    pub capture_timeout_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            default_interval_ms: 3_000,
            max_concurrent_uploads: 3,
            jpeg_quality: 80,
            capture_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// 1.0 keeps the delay fixed; above 1.0 grows it per attempt
    pub backoff_factor: f64,
    pub jitter_ms: u64,
    pub image_extension: String,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_000,
            backoff_factor: 1.0,
            jitter_ms: 0,
            image_extension: "jpg".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    pub input_prefix: String,
    pub results_prefix: String,
    pub mirror_results: bool,
    pub delete_on_no_face: bool,
    pub smoothing_enabled: bool,
    pub timeout_ms: u64,
    pub models_dir: String,
    pub required_models: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            input_prefix: "frames/".into(),
            results_prefix: "results/".into(),
            mirror_results: false,
            delete_on_no_face: true,
            smoothing_enabled: false,
            timeout_ms: 540_000,
            models_dir: "models".into(),
            required_models: vec![
                "blazeface.json".into(),
                "emotion.json".into(),
                "iris.json".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationSettings {
    pub bucket_width_ms: i64,
    pub max_transaction_attempts: u32,
    /// Window used for "recent analyses" queries
    pub recent_window_ms: i64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            bucket_width_ms: 60_000,
            max_transaction_attempts: 5,
            recent_window_ms: 5 * 60 * 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub capture: CaptureSettings,
    pub upload: UploadSettings,
    pub analysis: AnalysisSettings,
    pub scoring: ScoringConfig,
    pub aggregation: AggregationSettings,
}

impl PipelineSettings {
    /// Load settings from a JSON file. A missing file means defaults; a file
    /// that exists but can't be read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|err| {
                PipelineError::Configuration(format!(
                    "failed to read settings from {}: {err}",
                    path.display()
                ))
            })?;
            serde_json::from_str(&contents).map_err(|err| {
                PipelineError::Configuration(format!(
                    "invalid settings in {}: {err}",
                    path.display()
                ))
            })?
        } else {
            log::info!(
                "No settings file at {}; using defaults",
                path.display()
            );
            PipelineSettings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Settings from `ENGAGEMENT_SETTINGS` if set, otherwise defaults.
    pub fn from_env() -> Result<Self, PipelineError> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::Configuration(msg));

        if self.capture.max_concurrent_uploads == 0 {
            return fail("capture.maxConcurrentUploads must be at least 1".into());
        }
        if self.capture.min_interval_ms == 0 {
            return fail("capture.minIntervalMs must be positive".into());
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return fail("capture.jpegQuality must be in 1..=100".into());
        }
        if self.upload.max_attempts == 0 {
            return fail("upload.maxAttempts must be at least 1".into());
        }
        if !(self.upload.backoff_factor.is_finite() && self.upload.backoff_factor >= 1.0) {
            return fail("upload.backoffFactor must be >= 1.0".into());
        }
        if self.aggregation.bucket_width_ms <= 0 {
            return fail("aggregation.bucketWidthMs must be positive".into());
        }
        if self.aggregation.max_transaction_attempts == 0 {
            return fail("aggregation.maxTransactionAttempts must be at least 1".into());
        }
        if self.analysis.input_prefix.is_empty() {
            return fail("analysis.inputPrefix must not be empty".into());
        }
        self.scoring
            .validate()
            .map_err(|msg| PipelineError::Configuration(format!("scoring: {msg}")))
    }
}
