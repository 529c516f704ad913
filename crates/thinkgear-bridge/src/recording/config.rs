//! Recording session settings, stored as JSON next to the recorder.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Default settings file name.
pub const DEFAULT_RECORDING_CONFIG_FILE: &str = "config.json";

/// Steps and sample counts for one recording run.
///
/// Each iteration walks every mode in order. A step records
/// `samples_before` raw samples labelled `baseline_label`, shows the cue,
/// records `samples_after` samples labelled with the mode, then pauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingConfig {
    pub modes: Vec<String>,
    pub iterations: u32,
    pub samples_before: u32,
    /// 2560 samples is about five seconds at the 512 Hz raw rate.
    pub samples_after: u32,
    pub pause_ms: u64,
    pub baseline_label: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            modes: vec!["left".into(), "none".into(), "right".into()],
            iterations: 1,
            samples_before: 0,
            samples_after: 2560,
            pause_ms: 1000,
            baseline_label: "none".into(),
        }
    }
}

impl RecordingConfig {
    /// Reject settings that would record nothing.
    ///
    /// # Errors
    /// Returns [`BridgeError::ConfigError`] describing the first problem.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.modes.is_empty() {
            return Err(BridgeError::ConfigError {
                reason: "recording config needs at least one mode".into(),
            });
        }
        if self.modes.iter().any(|m| m.trim().is_empty()) {
            return Err(BridgeError::ConfigError {
                reason: "recording modes must not be blank".into(),
            });
        }
        if self.iterations == 0 {
            return Err(BridgeError::ConfigError {
                reason: "iterations must be at least 1".into(),
            });
        }
        if self.samples_before == 0 && self.samples_after == 0 {
            return Err(BridgeError::ConfigError {
                reason: "samples_before and samples_after are both 0".into(),
            });
        }
        Ok(())
    }

    /// Total number of steps (`iterations × modes`).
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.iterations as usize * self.modes.len()
    }

    /// Load and validate settings from a JSON file.
    ///
    /// # Errors
    /// Returns I/O, JSON or validation errors.
    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings, falling back to defaults when the file is missing,
    /// unreadable, or invalid. The defaults are then written back so the
    /// user has a file to edit; a failed write is only logged.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Recording config unusable, writing defaults"
                );
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to write default recording config");
                }
                config
            }
        }
    }

    /// Write the settings as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns I/O or JSON errors.
    pub fn save(&self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(label: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "thinkgear-recording-config-{}-{}-{}",
            label,
            std::process::id(),
            now
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RecordingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.modes, vec!["left", "none", "right"]);
        assert_eq!(config.total_steps(), 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RecordingConfig =
            serde_json::from_str(r#"{"modes":["up","down"],"iterations":2,"samplesBefore":10}"#)
                .unwrap();
        assert_eq!(config.modes, vec!["up", "down"]);
        assert_eq!(config.iterations, 2);
        assert_eq!(config.samples_before, 10);
        assert_eq!(config.samples_after, 2560);
        assert_eq!(config.total_steps(), 4);
    }

    #[test]
    fn test_validate_rejects_empty_recordings() {
        let mut config = RecordingConfig {
            modes: vec![],
            ..RecordingConfig::default()
        };
        assert!(config.validate().is_err());

        config.modes = vec!["left".into()];
        config.iterations = 0;
        assert!(config.validate().is_err());

        config.iterations = 1;
        config.samples_before = 0;
        config.samples_after = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError { .. }));
    }

    #[test]
    fn test_load_or_default_writes_defaults_for_missing_file() {
        let dir = unique_temp_dir("missing");
        let path = dir.join(DEFAULT_RECORDING_CONFIG_FILE);

        let config = RecordingConfig::load_or_default(&path);
        assert_eq!(config, RecordingConfig::default());
        assert_eq!(RecordingConfig::from_file(&path).unwrap(), config);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_load_or_default_replaces_corrupt_file() {
        let dir = unique_temp_dir("corrupt");
        let path = dir.join(DEFAULT_RECORDING_CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        let config = RecordingConfig::load_or_default(&path);
        assert_eq!(config, RecordingConfig::default());
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("\"samplesAfter\""));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_load_or_default_keeps_valid_file() {
        let dir = unique_temp_dir("valid");
        let path = dir.join(DEFAULT_RECORDING_CONFIG_FILE);
        let custom = RecordingConfig {
            modes: vec!["blink".into()],
            pause_ms: 0,
            ..RecordingConfig::default()
        };
        custom.save(&path).unwrap();

        assert_eq!(RecordingConfig::load_or_default(&path), custom);

        fs::remove_dir_all(dir).unwrap();
    }
}
