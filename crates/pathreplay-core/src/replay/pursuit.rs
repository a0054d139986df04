//! Pursuit steering law
//!
//! A PD controller on distance and heading error that turns the current pose
//! and a target waypoint into left/right drive powers. Pure math; timing and
//! actuation live in [`super::PursuitPlayer`].

use super::Waypoint;
use crate::config::{PursuitConfig, PursuitGains};
use crate::robot::Pose;

const MAX_POWER: f32 = 127.0;

/// Wrap an angle in degrees into `[-180, 180]`
pub fn wrap_degrees(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can land exactly on the upper bound through rounding
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// One controller output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveCommand {
    /// Forward effort after clamping
    pub forward: f32,
    /// Turn effort after clamping; positive turns toward increasing heading
    pub turn: f32,
    /// Left drive power
    pub left: i8,
    /// Right drive power
    pub right: i8,
    /// Distance to the target (inches)
    pub distance: f32,
    /// Heading error the turn term acted on (degrees)
    pub heading_error: f32,
    /// Within the arrive tolerance, holding the recorded heading
    pub arrived: bool,
}

impl DriveCommand {
    /// All outputs zero
    pub const STOP: DriveCommand = DriveCommand {
        forward: 0.0,
        turn: 0.0,
        left: 0,
        right: 0,
        distance: 0.0,
        heading_error: 0.0,
        arrived: true,
    };
}

/// PD pursuit controller with derivative memory
#[derive(Debug, Clone)]
pub struct PursuitController {
    gains: PursuitGains,
    tolerance: f32,
    prev_distance: f32,
    prev_heading_error: f32,
}

impl PursuitController {
    /// Create a controller with zeroed derivative memory
    pub fn new(config: &PursuitConfig) -> Self {
        Self {
            gains: config.gains,
            tolerance: config.arrive_tolerance,
            prev_distance: 0.0,
            prev_heading_error: 0.0,
        }
    }

    /// Controller gains
    pub fn gains(&self) -> &PursuitGains {
        &self.gains
    }

    /// Forget previous errors
    pub fn reset(&mut self) {
        self.prev_distance = 0.0;
        self.prev_heading_error = 0.0;
    }

    /// Compute drive powers steering `current` toward `target`
    ///
    /// Far from the target the turn term steers toward the bearing of the
    /// target point. Inside the arrive tolerance forward effort is dropped and
    /// the turn term instead settles the robot onto the recorded heading.
    pub fn update(&mut self, current: Pose, target: &Waypoint) -> DriveCommand {
        let g = self.gains;
        let dx = target.x - current.x;
        let dy = target.y - current.y;
        let distance = dx.hypot(dy);
        let arrived = distance < self.tolerance;

        let heading_error = if arrived {
            wrap_degrees(target.theta - current.theta)
        } else {
            wrap_degrees(dy.atan2(dx).to_degrees() - current.theta)
        };

        let forward = distance * g.kp_forward + (distance - self.prev_distance) * g.kd_forward;
        let turn = heading_error * g.kp_turn
            + (heading_error - self.prev_heading_error) * g.kd_turn;

        self.prev_distance = distance;
        self.prev_heading_error = heading_error;

        let forward = if arrived {
            0.0
        } else {
            forward.clamp(-MAX_POWER, MAX_POWER)
        };
        let turn = turn.clamp(-MAX_POWER, MAX_POWER);

        DriveCommand {
            forward,
            turn,
            left: to_power(forward + turn),
            right: to_power(forward - turn),
            distance,
            heading_error,
            arrived,
        }
    }
}

fn to_power(effort: f32) -> i8 {
    if effort.is_nan() {
        return 0;
    }
    effort.clamp(-MAX_POWER, MAX_POWER).round() as i8
}
