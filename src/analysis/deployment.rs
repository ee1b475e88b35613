use std::{fs, path::Path};

use log::{error, info};

use crate::error::PipelineError;

/// Check that every required model file is present, readable and valid JSON.
/// All problems are collected into one error so a deploy fails once, loudly.
pub fn validate_model_deployment(models_dir: &Path, required: &[String]) -> Result<(), PipelineError> {
    if !models_dir.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "model directory not found at {}",
            models_dir.display()
        )));
    }

    let mut missing = Vec::new();
    let mut invalid = Vec::new();

    for model in required {
        let path = models_dir.join(model);
        if !path.is_file() {
            error!("missing model {}", path.display());
            missing.push(model.as_str());
            continue;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|err| err.to_string())
            .and_then(|content| {
                serde_json::from_str::<serde_json::Value>(&content).map_err(|err| err.to_string())
            });
        match parsed {
            Ok(_) => info!("model {model} ok"),
            Err(reason) => {
                error!("invalid model {}: {reason}", path.display());
                invalid.push(format!("{model} ({reason})"));
            }
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        info!("all {} models validated in {}", required.len(), models_dir.display());
        return Ok(());
    }

    let mut report = String::from("model validation failed");
    if !missing.is_empty() {
        report.push_str(&format!("; missing: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        report.push_str(&format!("; invalid: {}", invalid.join(", ")));
    }
    Err(PipelineError::Configuration(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn required() -> Vec<String> {
        vec!["blazeface.json".into(), "emotion.json".into(), "iris.json".into()]
    }

    #[test]
    fn test_all_models_present() {
        let dir = TempDir::new().unwrap();
        for name in required() {
            fs::write(dir.path().join(name), r#"{"format": "graph-model"}"#).unwrap();
        }
        assert!(validate_model_deployment(dir.path(), &required()).is_ok());
    }

    #[test]
    fn test_reports_missing_and_invalid_together() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blazeface.json"), "{}").unwrap();
        fs::write(dir.path().join("emotion.json"), "not json").unwrap();

        let err = validate_model_deployment(dir.path(), &required()).unwrap_err();
        let PipelineError::Configuration(message) = err else {
            panic!("expected configuration error");
        };
        assert!(message.contains("missing: iris.json"), "{message}");
        assert!(message.contains("invalid: emotion.json"), "{message}");
        assert!(!message.contains("blazeface"), "{message}");
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = validate_model_deployment(&dir.path().join("nope"), &required());
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }
}
