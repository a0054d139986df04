//! Simulated Robot - differential drive model for testing without hardware
//!
//! Integrates drive power commands into a pose, stores mechanism outputs and
//! exposes settable operator inputs. Optional wheel slip noise (seeded, so
//! runs are repeatable) stands in for the motion disturbances real playback
//! has to correct for.
//!
//! Heading convention: heading increases when the left side outpaces the
//! right, and the robot moves along `(cos θ, sin θ)`. This matches the
//! pursuit controller, where a positive turn command means `left > right`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::replay::{Button, ButtonSet};
use crate::robot::{
    millivolts_from_power, power_from_millivolts, DriveActuator, InputSource, MechanismActuator,
    Pose, PoseSource,
};

/// Physical parameters of the simulated drivetrain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Wheel surface speed at full power (inches/sec)
    pub max_speed: f32,
    /// Distance between left and right wheels (inches)
    pub track_width: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            max_speed: 60.0,
            track_width: 12.0,
        }
    }
}

/// Simulated robot implementing every collaborator interface
pub struct SimRobot {
    /// True pose in the world
    world: Pose,
    /// Where odometry considers the origin to be
    reference: Pose,
    params: SimParams,
    left: i8,
    right: i8,
    /// Mechanism motor voltages (mV)
    intake_mv: i32,
    outtake_mv: i32,
    lines: [bool; 8],
    line_writes: Vec<(u8, bool)>,
    buttons: ButtonSet,
    pose_resets: u32,
    /// Slip noise source and magnitude (fraction of commanded speed)
    noise: Option<(StdRng, f32)>,
}

impl Default for SimRobot {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRobot {
    /// Create a robot at the world origin with default parameters
    pub fn new() -> Self {
        Self::with_params(SimParams::default())
    }

    /// Create a robot with custom drivetrain parameters
    pub fn with_params(params: SimParams) -> Self {
        Self {
            world: Pose::ORIGIN,
            reference: Pose::ORIGIN,
            params,
            left: 0,
            right: 0,
            intake_mv: 0,
            outtake_mv: 0,
            lines: [false; 8],
            line_writes: Vec::new(),
            buttons: ButtonSet::EMPTY,
            pose_resets: 0,
            noise: None,
        }
    }

    /// Add per-step wheel slip of up to `slip` (fraction of commanded speed)
    pub fn with_noise(mut self, seed: u64, slip: f32) -> Self {
        self.noise = Some((StdRng::seed_from_u64(seed), slip.abs()));
        self
    }

    /// Advance the simulation by `dt` seconds under the current drive command
    pub fn step(&mut self, dt: f32) {
        let mut v_left = self.left as f32 / 127.0 * self.params.max_speed;
        let mut v_right = self.right as f32 / 127.0 * self.params.max_speed;

        if let Some((rng, slip)) = self.noise.as_mut() {
            if *slip > 0.0 {
                v_left *= 1.0 + rng.gen_range(-*slip..*slip);
                v_right *= 1.0 + rng.gen_range(-*slip..*slip);
            }
        }

        let v = (v_left + v_right) / 2.0;
        let omega = (v_left - v_right) / self.params.track_width; // rad/s

        let heading = self.world.theta.to_radians();
        self.world.x += v * heading.cos() * dt;
        self.world.y += v * heading.sin() * dt;
        self.world.theta += omega.to_degrees() * dt;
    }

    /// Teleport the robot in the world without touching odometry's reference
    pub fn place(&mut self, pose: Pose) {
        self.world = pose;
    }

    /// True world pose
    pub fn world_pose(&self) -> Pose {
        self.world
    }

    /// Hold or release an operator button
    pub fn set_button(&mut self, button: Button, held: bool) {
        self.buttons.set(button, held);
    }

    /// Replace the held button set
    pub fn set_buttons(&mut self, buttons: ButtonSet) {
        self.buttons = buttons;
    }

    /// Last (left, right) drive command
    pub fn drive_powers(&self) -> (i8, i8) {
        (self.left, self.right)
    }

    /// Last (intake, outtake) command
    pub fn mechanism_powers(&self) -> (i8, i8) {
        (
            power_from_millivolts(self.intake_mv),
            power_from_millivolts(self.outtake_mv),
        )
    }

    /// Current state of a digital line
    pub fn line(&self, line: u8) -> bool {
        self.lines.get(line as usize).copied().unwrap_or(false)
    }

    /// Every digital line write, in order
    pub fn line_writes(&self) -> &[(u8, bool)] {
        &self.line_writes
    }

    /// Number of odometry resets
    pub fn pose_resets(&self) -> u32 {
        self.pose_resets
    }
}

impl PoseSource for SimRobot {
    fn pose(&self) -> Pose {
        // World pose expressed relative to the last reset reference
        let dx = self.world.x - self.reference.x;
        let dy = self.world.y - self.reference.y;
        let (sin, cos) = (-self.reference.theta).to_radians().sin_cos();
        Pose {
            x: dx * cos - dy * sin,
            y: dx * sin + dy * cos,
            theta: self.world.theta - self.reference.theta,
        }
    }

    fn reset_pose(&mut self, pose: Pose) {
        // Choose the reference so that pose() now reads `pose`
        let theta = self.world.theta - pose.theta;
        let (sin, cos) = theta.to_radians().sin_cos();
        self.reference = Pose {
            x: self.world.x - (pose.x * cos - pose.y * sin),
            y: self.world.y - (pose.x * sin + pose.y * cos),
            theta,
        };
        self.pose_resets += 1;
    }
}

impl DriveActuator for SimRobot {
    fn set_left_power(&mut self, power: i8) {
        self.left = power.clamp(-127, 127);
    }

    fn set_right_power(&mut self, power: i8) {
        self.right = power.clamp(-127, 127);
    }
}

impl MechanismActuator for SimRobot {
    fn set_intake_power(&mut self, power: i8) {
        self.intake_mv = millivolts_from_power(power);
    }

    fn set_outtake_power(&mut self, power: i8) {
        self.outtake_mv = millivolts_from_power(power);
    }

    fn set_digital_line(&mut self, line: u8, high: bool) {
        if let Some(slot) = self.lines.get_mut(line as usize) {
            *slot = high;
        }
        self.line_writes.push((line, high));
    }
}

impl InputSource for SimRobot {
    fn button(&self, button: Button) -> bool {
        self.buttons.contains(button)
    }

    fn actuator_feedback(&self) -> (i8, i8) {
        self.mechanism_powers()
    }
}
