//! Robot collaborator interfaces
//!
//! The replay core never talks to hardware directly. Pose estimation, motor
//! output, operator input, storage and timing are all injected through the
//! traits in this module so that the recorder and player can run against real
//! hardware or against [`crate::sim::SimRobot`].

mod clock;
mod storage;

pub use clock::{Clock, ManualClock, MonotonicClock, TaskPriority};
pub use storage::{FileStorage, MemoryStorage, Storage};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::replay::Button;

/// Full-scale motor voltage in millivolts
pub const FULL_SCALE_MILLIVOLTS: i32 = 12_000;

/// Full-scale motor power command
pub const FULL_SCALE_POWER: i8 = 127;

/// Planar robot pose as reported by odometry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position (inches)
    pub x: f32,
    /// Y position (inches)
    pub y: f32,
    /// Heading (degrees)
    pub theta: f32,
}

impl Pose {
    /// The pose both recording and playback reset to
    pub const ORIGIN: Pose = Pose {
        x: 0.0,
        y: 0.0,
        theta: 0.0,
    };

    /// Create a new pose
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self { x, y, theta }
    }

    /// Euclidean distance to another pose's position
    pub fn distance_to(&self, other: &Pose) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Absolute pose estimator (odometry)
pub trait PoseSource {
    /// Current pose estimate
    fn pose(&self) -> Pose;

    /// Redefine the current physical position as `pose`
    fn reset_pose(&mut self, pose: Pose);
}

/// Differential drivetrain
pub trait DriveActuator {
    /// Command the left side, -127..=127
    fn set_left_power(&mut self, power: i8);

    /// Command the right side, -127..=127
    fn set_right_power(&mut self, power: i8);
}

/// Intake/outtake motors and pneumatic digital outputs
pub trait MechanismActuator {
    /// Command the intake motor, -127..=127
    fn set_intake_power(&mut self, power: i8);

    /// Command the outtake motor, -127..=127
    fn set_outtake_power(&mut self, power: i8);

    /// Drive a digital output line (solenoid) high or low
    fn set_digital_line(&mut self, line: u8, high: bool);
}

/// Operator input, only read while recording
pub trait InputSource {
    /// Whether the control bound to `button` is currently held
    fn button(&self, button: Button) -> bool;

    /// Current (intake, outtake) power derived from motor feedback
    fn actuator_feedback(&self) -> (i8, i8);
}

/// Cooperative abort condition, polled once per playback tick
pub trait AbortSignal {
    /// Whether playback should stop now
    fn abort_requested(&self) -> bool;
}

impl AbortSignal for AtomicBool {
    fn abort_requested(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl AbortSignal for bool {
    fn abort_requested(&self) -> bool {
        *self
    }
}

impl<F> AbortSignal for F
where
    F: Fn() -> bool,
{
    fn abort_requested(&self) -> bool {
        self()
    }
}

/// Shareable cancellation flag, settable from any thread
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a cleared handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the running playback stop at its next tick
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Clear a pending request
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether an abort is pending
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl AbortSignal for AbortHandle {
    fn abort_requested(&self) -> bool {
        self.is_aborted()
    }
}

/// Convert motor voltage feedback to a power command
///
/// Uses the fixed linear scale ±12000 mV ↔ ±127 with rounding, so every
/// power produced by [`millivolts_from_power`] converts back exactly.
pub fn power_from_millivolts(millivolts: i32) -> i8 {
    let scaled = millivolts as f64 * FULL_SCALE_POWER as f64 / FULL_SCALE_MILLIVOLTS as f64;
    scaled
        .round()
        .clamp(-(FULL_SCALE_POWER as f64), FULL_SCALE_POWER as f64) as i8
}

/// Convert a power command to the motor voltage it requests
pub fn millivolts_from_power(power: i8) -> i32 {
    let power = power.clamp(-FULL_SCALE_POWER, FULL_SCALE_POWER);
    (power as f64 * FULL_SCALE_MILLIVOLTS as f64 / FULL_SCALE_POWER as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_scale_is_lossless() {
        for power in -127i8..=127 {
            assert_eq!(power_from_millivolts(millivolts_from_power(power)), power);
        }
    }

    #[test]
    fn test_power_scale_clamps() {
        assert_eq!(power_from_millivolts(12_000), 127);
        assert_eq!(power_from_millivolts(20_000), 127);
        assert_eq!(power_from_millivolts(-20_000), -127);
        assert_eq!(millivolts_from_power(-128), -12_000);
    }

    #[test]
    fn test_abort_handle_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.abort_requested());

        clone.abort();
        assert!(handle.abort_requested());

        handle.reset();
        assert!(!clone.abort_requested());
    }

    #[test]
    fn test_closure_abort_signal() {
        let estop = || true;
        assert!(estop.abort_requested());
        assert!(!false.abort_requested());
    }
}
