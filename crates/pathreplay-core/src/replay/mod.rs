//! Record and Replay
//!
//! Records pose-tagged waypoints while a driver demonstrates a routine and
//! replays them autonomously with a time-synchronized pursuit controller.

mod buttons;
mod controller;
mod error;
pub mod format;
mod playback;
mod pursuit;
mod recorder;
mod store;

pub use buttons::{Button, ButtonSet};
pub use controller::{ReplayController, ReplayStatus, StopReport};
pub use error::{ReplayError, StoreError};
pub use playback::{PlaybackStatus, PlaybackTick, PursuitPlayer};
pub use pursuit::{wrap_degrees, DriveCommand, PursuitController};
pub use recorder::{Recorder, RecorderState, Sample};
pub use store::{FrameStore, DEFAULT_MAX_FRAMES};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::robot::Pose;

/// A single recorded frame: where the robot was and what its mechanisms were
/// doing at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    /// X position (inches)
    pub x: f32,
    /// Y position (inches)
    pub y: f32,
    /// Heading (degrees, unwrapped)
    pub theta: f32,
    /// Microseconds since recording started
    pub timestamp: u64,
    /// Intake power, -127..=127
    pub intake_power: i8,
    /// Outtake power, -127..=127
    pub outtake_power: i8,
    /// Toggle sources held at this instant
    pub buttons: ButtonSet,
    /// Whether this frame carries a discrete event (toggle edge or power
    /// spike) that playback must not skip
    pub has_action: bool,
}

impl Waypoint {
    /// Recorded pose
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }

    /// Reject values the file format cannot carry: a non-finite pose or a
    /// power of -128
    pub fn check(&self) -> Result<(), &'static str> {
        if !(self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()) {
            return Err("non-finite pose");
        }
        if self.intake_power == i8::MIN || self.outtake_power == i8::MIN {
            return Err("power out of range");
        }
        Ok(())
    }
}

/// Which role currently owns the frame store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Nothing running
    Idle,
    /// Recording countdown in progress
    Armed,
    /// Recording
    Recording,
    /// Replaying
    Playing,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Idle => "idle",
            Mode::Armed => "arming",
            Mode::Recording => "recording",
            Mode::Playing => "playing",
        })
    }
}
