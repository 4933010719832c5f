use crate::error::ConfigError;
use crate::models::OutputMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_volume: f32,
    pub crossfade_secs: f64,
    pub preload_lead_secs: f64,
    pub preload_timeout_secs: f64,
    pub min_crossfade_remaining_ms: u64,
    pub seek_cancel_margin_secs: f64,
    pub max_consecutive_errors: u32,
    pub history_limit: usize,
    pub lazy_lookahead: usize,
    pub prefetch_cache_capacity: usize,
    pub poll_interval_ms: u64,
    pub preferred_output_mode: OutputMode,
    pub graph_suspends_in_background: bool,
    pub persist_debounce_ms: u64,
    pub session_file: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.8,
            crossfade_secs: 5.0,
            preload_lead_secs: 3.0,
            preload_timeout_secs: 10.0,
            min_crossfade_remaining_ms: 100,
            seek_cancel_margin_secs: 1.0,
            max_consecutive_errors: 3,
            history_limit: 50,
            lazy_lookahead: 3,
            prefetch_cache_capacity: 64,
            poll_interval_ms: 250,
            preferred_output_mode: OutputMode::Graph,
            graph_suspends_in_background: true,
            persist_debounce_ms: 1000,
            session_file: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("segue")
                .join("session.json"),
        }
    }
}

impl PlayerConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(ConfigError::InvalidValue {
                field: "default_volume".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        for (field, value) in [
            ("crossfade_secs", self.crossfade_secs),
            ("preload_lead_secs", self.preload_lead_secs),
            ("preload_timeout_secs", self.preload_timeout_secs),
            ("seek_cancel_margin_secs", self.seek_cancel_margin_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be a non-negative number of seconds".to_string(),
                });
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Timing and sizing knobs consumed by the playback controller
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            initial_volume: self.default_volume.clamp(0.0, 1.0),
            crossfade: Duration::from_secs_f64(self.crossfade_secs.max(0.0)),
            preload_lead: Duration::from_secs_f64(self.preload_lead_secs.max(0.0)),
            preload_timeout: Duration::from_secs_f64(self.preload_timeout_secs.max(0.0)),
            min_crossfade_remaining: Duration::from_millis(self.min_crossfade_remaining_ms),
            seek_cancel_margin: Duration::from_secs_f64(self.seek_cancel_margin_secs.max(0.0)),
            max_consecutive_errors: self.max_consecutive_errors,
            history_limit: self.history_limit,
            lazy_lookahead: self.lazy_lookahead,
            prefetch_cache_capacity: self.prefetch_cache_capacity,
            preferred_output_mode: self.preferred_output_mode,
            graph_suspends_in_background: self.graph_suspends_in_background,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Settings the controller is built with
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub initial_volume: f32,
    pub crossfade: Duration,
    pub preload_lead: Duration,
    pub preload_timeout: Duration,
    pub min_crossfade_remaining: Duration,
    pub seek_cancel_margin: Duration,
    pub max_consecutive_errors: u32,
    pub history_limit: usize,
    pub lazy_lookahead: usize,
    pub prefetch_cache_capacity: usize,
    pub preferred_output_mode: OutputMode,
    pub graph_suspends_in_background: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        PlayerConfig::default().engine_settings()
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Use an explicit configuration file
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        config.validate()?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        let mut candidate = self.config.clone();
        updater(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_crossfade(&mut self, duration: Duration) -> Result<(), ConfigError> {
        self.config.crossfade_secs = duration.as_secs_f64();
        self.save_config()
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) -> Result<(), ConfigError> {
        self.config.preferred_output_mode = mode;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("segue");

        std::fs::create_dir_all(&config_dir).map_err(ConfigError::IoError)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: PlayerConfig =
            toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content =
            toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;

        Ok(())
    }
}
