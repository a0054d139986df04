//! Time-synchronized playback
//!
//! Each tick picks the waypoint the recording had reached at the same elapsed
//! time and steers toward it, so replay keeps the recorded pace even when the
//! robot is pushed off course. Mechanism powers are replayed every tick;
//! toggle buttons fire their digital line once per press.

use std::time::Duration;

use super::{ButtonSet, DriveCommand, FrameStore, PursuitController, ReplayError};
use crate::config::{PursuitConfig, ToggleBinding};
use crate::robot::{AbortSignal, DriveActuator, MechanismActuator, Pose, PoseSource};

const LINE_COUNT: usize = 8;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Reached the last waypoint's timestamp
    Completed,
    /// Stopped by an abort request
    Aborted,
}

/// Result of one playback tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackTick {
    /// Still playing
    Running {
        /// Index of the waypoint steered toward this tick
        target_index: usize,
        /// Drive output issued this tick
        command: DriveCommand,
    },
    /// Playback ended and outputs were zeroed
    Finished(PlaybackStatus),
}

#[derive(Debug)]
struct Session {
    started_at: u64,
    /// Buttons as of the last applied waypoint
    prev_buttons: ButtonSet,
    /// Highest waypoint index whose toggles have been applied
    applied: Option<usize>,
    lines: [bool; LINE_COUNT],
    ticks: u32,
}

/// Pursuit player state machine (`Idle -> Playing -> Idle`)
///
/// Borrows the frame store per call; the caller guarantees nobody mutates it
/// between [`PursuitPlayer::start`] and the final tick.
pub struct PursuitPlayer {
    toggles: Vec<ToggleBinding>,
    controller: PursuitController,
    session: Option<Session>,
}

impl PursuitPlayer {
    /// Create an idle player
    pub fn new(config: &PursuitConfig, toggles: Vec<ToggleBinding>) -> Self {
        Self {
            toggles,
            controller: PursuitController::new(config),
            session: None,
        }
    }

    /// Check if a playback is in progress
    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    /// Time since playback started
    pub fn elapsed(&self, now: u64) -> Option<Duration> {
        self.session
            .as_ref()
            .map(|s| Duration::from_micros(now.saturating_sub(s.started_at)))
    }

    /// Begin playback of `store`
    ///
    /// Resets odometry to the origin (recordings are relative to the same
    /// reset), drives every bound digital line to its rest state and clears
    /// the controller's derivative memory.
    pub fn start<H>(&mut self, store: &FrameStore, hw: &mut H, now: u64) -> Result<(), ReplayError>
    where
        H: PoseSource + DriveActuator + MechanismActuator + ?Sized,
    {
        if store.is_empty() {
            return Err(ReplayError::EmptyRecording);
        }

        hw.reset_pose(Pose::ORIGIN);

        let mut lines = [false; LINE_COUNT];
        for binding in &self.toggles {
            if let Some(state) = lines.get_mut(binding.line as usize) {
                *state = binding.rest;
                hw.set_digital_line(binding.line, binding.rest);
            }
        }

        self.controller.reset();
        self.session = Some(Session {
            started_at: now,
            prev_buttons: ButtonSet::EMPTY,
            applied: None,
            lines,
            ticks: 0,
        });

        tracing::info!(
            frames = store.len(),
            duration_ms = store.duration().as_millis() as u64,
            "playback started"
        );
        Ok(())
    }

    /// Run one control period
    ///
    /// `abort` is polled once, after this tick's outputs are issued. When
    /// playback ends for any reason every drive and mechanism power is
    /// zeroed before returning `Finished`.
    pub fn tick<H, A>(
        &mut self,
        store: &FrameStore,
        hw: &mut H,
        now: u64,
        abort: &A,
    ) -> Result<PlaybackTick, ReplayError>
    where
        H: PoseSource + DriveActuator + MechanismActuator + ?Sized,
        A: AbortSignal + ?Sized,
    {
        let Some(session) = self.session.as_mut() else {
            return Err(ReplayError::NotPlaying);
        };

        let elapsed = now.saturating_sub(session.started_at);
        let (Some(last_timestamp), Some(last_index)) =
            (store.last_timestamp(), store.len().checked_sub(1))
        else {
            return Ok(self.finish(hw, PlaybackStatus::Completed, now));
        };

        if elapsed >= last_timestamp {
            // Presses recorded after the last tick still happen
            Self::apply_toggles(&self.toggles, session, store, last_index, hw);
            return Ok(self.finish(hw, PlaybackStatus::Completed, now));
        }

        let target_index = store
            .find_index_at_time(elapsed)
            .unwrap_or(last_index);
        let Some(target) = store.at(target_index) else {
            return Ok(self.finish(hw, PlaybackStatus::Completed, now));
        };

        let command = self.controller.update(hw.pose(), target);
        hw.set_left_power(command.left);
        hw.set_right_power(command.right);

        hw.set_intake_power(target.intake_power);
        hw.set_outtake_power(target.outtake_power);

        Self::apply_toggles(&self.toggles, session, store, target_index, hw);
        session.ticks += 1;

        tracing::trace!(
            t = elapsed,
            target = target_index,
            distance = command.distance,
            left = command.left,
            right = command.right,
            "playback tick"
        );

        if abort.abort_requested() {
            return Ok(self.finish(hw, PlaybackStatus::Aborted, now));
        }

        Ok(PlaybackTick::Running {
            target_index,
            command,
        })
    }

    /// Stop immediately, zeroing outputs
    pub fn cancel<H>(&mut self, hw: &mut H, now: u64) -> Result<PlaybackStatus, ReplayError>
    where
        H: DriveActuator + MechanismActuator + ?Sized,
    {
        if self.session.is_none() {
            return Err(ReplayError::NotPlaying);
        }
        self.finish(hw, PlaybackStatus::Aborted, now);
        Ok(PlaybackStatus::Aborted)
    }

    /// Fire one toggle per button press between the last applied waypoint
    /// and `upto`
    ///
    /// Each frame is compared with the frame before it, not with the bitset
    /// seen on the previous tick, so every recorded press fires exactly once
    /// even when several frames are skipped in one tick. Comparing only tick
    /// targets would merge or lose presses that start and end between ticks.
    fn apply_toggles<H>(
        toggles: &[ToggleBinding],
        session: &mut Session,
        store: &FrameStore,
        upto: usize,
        hw: &mut H,
    ) where
        H: MechanismActuator + ?Sized,
    {
        let from = session.applied.map_or(0, |i| i + 1);
        if from > upto {
            return;
        }

        for frame in &store.frames()[from..=upto] {
            let pressed = frame.buttons.rising_edges(session.prev_buttons);
            for binding in toggles.iter().filter(|b| pressed.contains(b.button)) {
                if let Some(state) = session.lines.get_mut(binding.line as usize) {
                    *state = !*state;
                    hw.set_digital_line(binding.line, *state);
                    tracing::debug!(
                        button = %binding.button,
                        line = binding.line,
                        high = *state,
                        t = frame.timestamp,
                        "toggle"
                    );
                }
            }
            session.prev_buttons = frame.buttons;
        }
        session.applied = Some(upto);
    }

    fn finish<H>(&mut self, hw: &mut H, status: PlaybackStatus, now: u64) -> PlaybackTick
    where
        H: DriveActuator + MechanismActuator + ?Sized,
    {
        hw.set_left_power(0);
        hw.set_right_power(0);
        hw.set_intake_power(0);
        hw.set_outtake_power(0);

        if let Some(session) = self.session.take() {
            let elapsed_ms = now.saturating_sub(session.started_at) / 1000;
            match status {
                PlaybackStatus::Completed => {
                    tracing::info!(ticks = session.ticks, elapsed_ms, "playback completed")
                }
                PlaybackStatus::Aborted => {
                    tracing::warn!(ticks = session.ticks, elapsed_ms, "playback aborted")
                }
            }
        }
        PlaybackTick::Finished(status)
    }
}
