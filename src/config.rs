use crate::defaults;
use crate::error::{Result, StreamscribeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowSettings,
    pub vad: VadSettings,
    pub queue: QueueSettings,
    pub engine: EngineSettings,
}

/// Windowing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowSettings {
    /// Nominal window length `W` in seconds.
    pub window_size_sec: f64,
    /// Heartbeat period; 0 means "use window_size_sec".
    pub step_sec: f64,
    /// Lookback included before speech onset, seconds.
    pub pre_roll_sec: f64,
    /// Maximum extension past the nominal size, seconds.
    pub max_extension_sec: f64,
    /// Extension cap as a ratio of the window size.
    pub max_extension_ratio: f64,
    /// Contiguous silence accepted as an inter-word pause, seconds.
    pub word_pause_sec: f64,
    /// Directory for emitted window WAVs; system temp dir when unset.
    pub wav_dir: Option<PathBuf>,
}

/// Voice activity detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadSettings {
    /// RMS threshold for speech (0.0 to 1.0).
    pub silence_threshold_rms: f32,
    /// Silence duration before the phrase is considered ended, seconds.
    pub silence_hold_sec: f64,
}

/// Queueing and parallelism configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueSettings {
    /// Bounded intake capacity; oldest windows dropped on overflow.
    pub intake_capacity: usize,
    /// Number of parallel transcription runners.
    pub worker_count: usize,
}

/// Engine supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Seconds an engine gets to signal readiness.
    pub warm_up_timeout_sec: f64,
    /// Seconds a transcribe call may take before the worker gives up.
    pub transcribe_timeout_sec: f64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            window_size_sec: defaults::WINDOW_SIZE_SEC,
            step_sec: defaults::STEP_SEC,
            pre_roll_sec: defaults::PRE_ROLL_SEC,
            max_extension_sec: defaults::MAX_EXTENSION_SEC,
            max_extension_ratio: defaults::MAX_EXTENSION_RATIO,
            word_pause_sec: defaults::WORD_PAUSE_SEC,
            wav_dir: None,
        }
    }
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            silence_threshold_rms: defaults::SILENCE_THRESHOLD_RMS,
            silence_hold_sec: defaults::SILENCE_HOLD_SEC,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            intake_capacity: defaults::INTAKE_CAPACITY,
            worker_count: defaults::WORKER_COUNT,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            warm_up_timeout_sec: defaults::WARM_UP_TIMEOUT_SEC,
            transcribe_timeout_sec: defaults::TRANSCRIBE_TIMEOUT_SEC,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StreamscribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                StreamscribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(StreamscribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - STREAMSCRIBE_WORKER_COUNT → queue.worker_count
    /// - STREAMSCRIBE_WINDOW_SIZE_SEC → window.window_size_sec
    /// - STREAMSCRIBE_WAV_DIR → window.wav_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(count) = std::env::var("STREAMSCRIBE_WORKER_COUNT")
            && let Ok(count) = count.parse::<usize>()
            && count > 0
        {
            self.queue.worker_count = count;
        }

        if let Ok(size) = std::env::var("STREAMSCRIBE_WINDOW_SIZE_SEC")
            && let Ok(size) = size.parse::<f64>()
            && size > 0.0
        {
            self.window.window_size_sec = size;
        }

        if let Ok(dir) = std::env::var("STREAMSCRIBE_WAV_DIR")
            && !dir.is_empty()
        {
            self.window.wav_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.window_size_sec <= 0.0 {
            return Err(StreamscribeError::ConfigInvalidValue {
                key: "window.window_size_sec".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.queue.worker_count == 0 {
            return Err(StreamscribeError::ConfigInvalidValue {
                key: "queue.worker_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue.intake_capacity == 0 {
            return Err(StreamscribeError::ConfigInvalidValue {
                key: "queue.intake_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.vad.silence_threshold_rms) {
            return Err(StreamscribeError::ConfigInvalidValue {
                key: "vad.silence_threshold_rms".to_string(),
                message: "must lie in [0.0, 1.0]".to_string(),
            });
        }
        Ok(())
    }

    /// Effective heartbeat period: `step_sec`, or the window size when 0.
    pub fn heartbeat_period_sec(&self) -> f64 {
        if self.window.step_sec > 0.0 {
            self.window.step_sec
        } else {
            self.window.window_size_sec
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.window.window_size_sec, 3.0);
        assert_eq!(config.window.step_sec, 0.0);
        assert_eq!(config.window.pre_roll_sec, 0.4);
        assert_eq!(config.window.max_extension_sec, 0.5);
        assert_eq!(config.window.max_extension_ratio, 1.5);
        assert_eq!(config.window.word_pause_sec, 0.05);
        assert_eq!(config.vad.silence_threshold_rms, 0.007);
        assert_eq!(config.vad.silence_hold_sec, 1.0);
        assert_eq!(config.queue.intake_capacity, 10);
        assert_eq!(config.queue.worker_count, 2);
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nworker_count = 4").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.queue.worker_count, 4);
        assert_eq!(config.queue.intake_capacity, 10);
        assert_eq!(config.window.window_size_sec, 3.0);
    }

    #[test]
    fn load_missing_file_is_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/streamscribe.toml"));
        assert!(matches!(
            result,
            Err(StreamscribeError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/streamscribe.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_propagates_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window = 'not a table'").unwrap();

        let result = Config::load_or_default(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = Config {
            queue: QueueSettings {
                worker_count: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StreamscribeError::ConfigInvalidValue { key, .. }) if key == "queue.worker_count"
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let config = Config {
            vad: VadSettings {
                silence_threshold_rms: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn heartbeat_period_uses_window_size_when_step_zero() {
        let config = Config::default();
        assert_eq!(config.heartbeat_period_sec(), 3.0);

        let config = Config {
            window: WindowSettings {
                step_sec: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.heartbeat_period_sec(), 0.5);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
