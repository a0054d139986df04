//! Replay configuration
//!
//! Every tuning constant the recorder and player use lives here, so a robot
//! can be retuned from a JSON file without rebuilding.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::replay::format::MAX_FILE_FRAMES;
use crate::replay::{Button, DEFAULT_MAX_FRAMES};

/// Errors loading or validating a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Recording file, relative to the storage root
    pub storage_path: PathBuf,
    /// Recorder tuning
    pub recorder: RecorderConfig,
    /// Player tuning
    pub pursuit: PursuitConfig,
    /// Which recorded buttons toggle which digital lines
    pub toggles: Vec<ToggleBinding>,
    /// Raise task priority while recording or replaying
    pub elevate_priority: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("position_recording.bin"),
            recorder: RecorderConfig::default(),
            pursuit: PursuitConfig::default(),
            toggles: ToggleBinding::defaults(),
            elevate_priority: true,
        }
    }
}

impl ReplayConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would make recording or playback misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.recorder;
        if r.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("sample_interval_ms must be > 0".into()));
        }
        if r.max_frames == 0 || r.max_frames > MAX_FILE_FRAMES as usize {
            return Err(ConfigError::Invalid(format!(
                "max_frames must be within 1..={MAX_FILE_FRAMES}"
            )));
        }

        let p = &self.pursuit;
        if p.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be > 0".into()));
        }
        if !(p.arrive_tolerance.is_finite() && p.arrive_tolerance >= 0.0) {
            return Err(ConfigError::Invalid("arrive_tolerance must be >= 0".into()));
        }
        let g = &p.gains;
        if [g.kp_forward, g.kd_forward, g.kp_turn, g.kd_turn]
            .iter()
            .any(|k| !(k.is_finite() && *k >= 0.0))
        {
            return Err(ConfigError::Invalid("gains must be finite and >= 0".into()));
        }

        let mut seen = 0u8;
        for binding in &self.toggles {
            if binding.line >= 8 {
                return Err(ConfigError::Invalid(format!(
                    "digital line {} out of range",
                    binding.line
                )));
            }
            if seen & (1 << binding.line) != 0 {
                return Err(ConfigError::Invalid(format!(
                    "digital line {} bound twice",
                    binding.line
                )));
            }
            seen |= 1 << binding.line;
        }
        Ok(())
    }
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Minimum spacing between accepted samples (ms)
    pub sample_interval_ms: u32,
    /// Motor power magnitude above which a frame counts as an action
    pub action_power_threshold: u8,
    /// Frame store capacity
    pub max_frames: usize,
    /// Delay between arming and the first sample (ms)
    pub countdown_ms: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 25, // 40 samples/sec
            action_power_threshold: 10,
            max_frames: DEFAULT_MAX_FRAMES,
            countdown_ms: 0,
        }
    }
}

impl RecorderConfig {
    /// Sample spacing in microseconds
    pub fn sample_interval_us(&self) -> u64 {
        self.sample_interval_ms as u64 * 1000
    }

    /// Countdown as a duration
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms as u64)
    }
}

/// PD gains for the pursuit controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitGains {
    /// Proportional gain on distance
    pub kp_forward: f32,
    /// Derivative gain on distance
    pub kd_forward: f32,
    /// Proportional gain on heading error
    pub kp_turn: f32,
    /// Derivative gain on heading error
    pub kd_turn: f32,
}

impl Default for PursuitGains {
    fn default() -> Self {
        Self {
            kp_forward: 4.25,
            kd_forward: 1.0,
            kp_turn: 0.863,
            kd_turn: 0.235,
        }
    }
}

/// Player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    /// Controller gains
    pub gains: PursuitGains,
    /// Distance (inches) under which the robot only turns to the recorded heading
    pub arrive_tolerance: f32,
    /// Control loop period (ms)
    pub tick_period_ms: u32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            gains: PursuitGains::default(),
            arrive_tolerance: 0.5,
            tick_period_ms: 20,
        }
    }
}

impl PursuitConfig {
    /// Tick period in microseconds
    pub fn tick_period_us(&self) -> u64 {
        self.tick_period_ms as u64 * 1000
    }
}

/// Maps a recorded toggle button to a digital output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleBinding {
    /// Recorded button whose presses flip the line
    pub button: Button,
    /// Digital output line id
    pub line: u8,
    /// Line state when playback starts
    #[serde(default)]
    pub rest: bool,
}

impl ToggleBinding {
    /// Mid-scoring, descore and unloader pistons on lines 0..=2, all resting low
    pub fn defaults() -> Vec<ToggleBinding> {
        vec![
            ToggleBinding {
                button: Button::MidScoring,
                line: 0,
                rest: false,
            },
            ToggleBinding {
                button: Button::Descore,
                line: 1,
                rest: false,
            },
            ToggleBinding {
                button: Button::Unloader,
                line: 2,
                rest: false,
            },
        ]
    }
}
