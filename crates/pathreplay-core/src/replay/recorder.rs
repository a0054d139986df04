//! Waypoint recorder
//!
//! Samples pose, mechanism power and toggle buttons into the frame store at a
//! fixed cadence while the driver demonstrates a routine.

use std::time::Duration;

use super::{ButtonSet, FrameStore, Mode, StoreError, Waypoint};
use crate::config::RecorderConfig;
use crate::robot::{InputSource, Pose, PoseSource};

/// Recorder state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Not recording
    Idle,
    /// Counting down
    Armed {
        /// Clock time (µs) at which recording begins
        begins_at: u64,
    },
    /// Recording
    Recording {
        /// Clock time of the first sample
        origin: u64,
        /// Elapsed time of the last accepted sample
        last_sample: u64,
        /// Buttons seen at the last accepted sample
        prev_buttons: ButtonSet,
    },
}

/// Outcome of one recorder tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Not recording; nothing happened
    Idle,
    /// Countdown still running
    Counting {
        /// Time until the first sample
        remaining: Duration,
    },
    /// Too soon after the last sample
    Throttled,
    /// Pose estimate was not finite; nothing stored, the next tick retries
    Dropped,
    /// A frame was appended
    Recorded {
        /// Store index of the new frame
        index: usize,
        /// Whether the frame was flagged as an action
        has_action: bool,
    },
}

/// Fixed-cadence waypoint recorder
///
/// Owns the frame store. Clock times are passed in by the caller so the
/// recorder itself stays deterministic.
pub struct Recorder {
    config: RecorderConfig,
    store: FrameStore,
    state: RecorderState,
}

impl Recorder {
    /// Create an idle recorder with an empty store sized from `config`
    pub fn new(config: RecorderConfig) -> Self {
        let store = FrameStore::with_capacity(config.max_frames);
        Self {
            config,
            store,
            state: RecorderState::Idle,
        }
    }

    /// Recorder settings
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Idle, armed or recording
    pub fn mode(&self) -> Mode {
        match self.state {
            RecorderState::Idle => Mode::Idle,
            RecorderState::Armed { .. } => Mode::Armed,
            RecorderState::Recording { .. } => Mode::Recording,
        }
    }

    /// Check if recording (countdown excluded)
    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    /// Check if armed or recording
    pub fn is_active(&self) -> bool {
        !matches!(self.state, RecorderState::Idle)
    }

    /// The recorded frames
    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Mutable access to the store, only while idle
    pub fn store_mut(&mut self) -> Option<&mut FrameStore> {
        match self.state {
            RecorderState::Idle => Some(&mut self.store),
            _ => None,
        }
    }

    /// Time left on the countdown
    pub fn countdown_remaining(&self, now: u64) -> Option<Duration> {
        match self.state {
            RecorderState::Armed { begins_at } => {
                Some(Duration::from_micros(begins_at.saturating_sub(now)))
            }
            _ => None,
        }
    }

    /// Start a session
    ///
    /// With a countdown configured the recorder only arms; the session begins
    /// on the first tick after the countdown. Otherwise it begins now: the
    /// pose estimator is reset to the origin, the store is cleared and the
    /// first frame is captured with `timestamp == 0`.
    pub fn start_recording<H>(&mut self, hw: &mut H, now: u64) -> Result<Sample, StoreError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        let countdown = self.config.countdown();
        if countdown.is_zero() {
            return self.begin(hw, now);
        }

        self.state = RecorderState::Armed {
            begins_at: now + countdown.as_micros() as u64,
        };
        tracing::info!(countdown_ms = self.config.countdown_ms, "recording armed");
        Ok(Sample::Counting {
            remaining: countdown,
        })
    }

    /// Take a sample if the interval since the last one has elapsed
    ///
    /// The interval is measured from the previous *accepted* sample's
    /// timestamp, so sample spacing stays exact when the caller's loop
    /// jitters. A full store stops the session and returns the error; the
    /// caller must persist what was recorded.
    pub fn record_tick<H>(&mut self, hw: &mut H, now: u64) -> Result<Sample, StoreError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        match self.state {
            RecorderState::Idle => Ok(Sample::Idle),
            RecorderState::Armed { begins_at } if now < begins_at => Ok(Sample::Counting {
                remaining: Duration::from_micros(begins_at - now),
            }),
            RecorderState::Armed { .. } => self.begin(hw, now),
            RecorderState::Recording {
                origin,
                last_sample,
                prev_buttons,
            } => {
                let elapsed = now.saturating_sub(origin);
                // Until the first frame lands every tick samples
                if !self.store.is_empty()
                    && elapsed < last_sample + self.config.sample_interval_us()
                {
                    return Ok(Sample::Throttled);
                }
                self.capture(hw, origin, elapsed, last_sample, prev_buttons)
            }
        }
    }

    /// End the session. Returns whether anything was running.
    pub fn stop_recording(&mut self) -> bool {
        let was = self.state;
        self.state = RecorderState::Idle;

        match was {
            RecorderState::Idle => false,
            RecorderState::Armed { .. } => {
                tracing::info!("recording countdown cancelled");
                true
            }
            RecorderState::Recording { last_sample, .. } => {
                tracing::info!(
                    frames = self.store.len(),
                    duration_ms = last_sample / 1000,
                    actions = self.store.action_count(),
                    "recording stopped"
                );
                true
            }
        }
    }

    fn begin<H>(&mut self, hw: &mut H, now: u64) -> Result<Sample, StoreError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        // Recorded poses are relative to this reset, which playback mirrors
        hw.reset_pose(Pose::ORIGIN);
        self.store.clear();
        tracing::info!(capacity = self.store.capacity(), "recording started");
        self.capture(hw, now, 0, 0, ButtonSet::EMPTY)
    }

    fn capture<H>(
        &mut self,
        hw: &mut H,
        origin: u64,
        elapsed: u64,
        last_sample: u64,
        prev_buttons: ButtonSet,
    ) -> Result<Sample, StoreError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        let pose = hw.pose();
        let buttons = ButtonSet::from_fn(|b| hw.button(b));
        let (intake, outtake) = hw.actuator_feedback();
        let intake_power = intake.max(-127);
        let outtake_power = outtake.max(-127);

        let threshold = self.config.action_power_threshold;
        let has_action = !buttons.changed(prev_buttons).is_empty()
            || intake_power.unsigned_abs() > threshold
            || outtake_power.unsigned_abs() > threshold;

        let frame = Waypoint {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            timestamp: elapsed,
            intake_power,
            outtake_power,
            buttons,
            has_action,
        };

        // Only store what the file format can load back
        if let Err(reason) = frame.check() {
            tracing::warn!(t = elapsed, reason, "sample dropped");
            self.state = RecorderState::Recording {
                origin,
                last_sample,
                prev_buttons,
            };
            return Ok(Sample::Dropped);
        }

        if let Err(e) = self.store.append(frame) {
            tracing::warn!(frames = self.store.len(), "frame store full, stopping recording");
            self.state = RecorderState::Idle;
            return Err(e);
        }

        self.state = RecorderState::Recording {
            origin,
            last_sample: elapsed,
            prev_buttons: buttons,
        };
        tracing::trace!(t = elapsed, x = pose.x, y = pose.y, has_action, "sample");

        Ok(Sample::Recorded {
            index: self.store.len() - 1,
            has_action,
        })
    }
}
