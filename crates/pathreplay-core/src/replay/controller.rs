//! Replay controller
//!
//! Owns the frame store (through the recorder), the storage medium and the
//! clock, and keeps recording and playback from ever running at once.

use serde::Serialize;

use super::{
    format, FrameStore, Mode, PlaybackStatus, PlaybackTick, PursuitPlayer, Recorder,
    ReplayError, Sample, StoreError,
};
use crate::config::ReplayConfig;
use crate::robot::{
    AbortHandle, AbortSignal, Clock, DriveActuator, InputSource, MechanismActuator, PoseSource,
    Storage, TaskPriority,
};

/// Snapshot for an operator display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStatus {
    /// What is running
    pub mode: Mode,
    /// Frames in memory
    pub frame_count: usize,
    /// Timestamp of the last frame (ms)
    pub duration_ms: u64,
    /// Frames flagged as actions
    pub action_frames: usize,
    /// Whether the storage medium is present
    pub storage_available: bool,
    /// Time left on the recording countdown (ms)
    pub countdown_remaining_ms: Option<u64>,
}

/// Outcome of stopping a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Frames recorded
    pub frames: usize,
    /// Whether the recording was written to storage
    pub persisted: bool,
}

/// Record/replay facade
///
/// # Example
///
/// ```rust,ignore
/// let mut replay = ReplayController::new(config, MemoryStorage::new(), MonotonicClock::new())?;
/// replay.start_recording(&mut robot)?;
/// // ... call record_tick from the driver control loop ...
/// replay.stop_recording(true)?;
/// let status = replay.run_playback(&mut robot, &false)?;
/// ```
pub struct ReplayController<S: Storage, C: Clock> {
    config: ReplayConfig,
    storage: S,
    clock: C,
    recorder: Recorder,
    player: PursuitPlayer,
    abort: AbortHandle,
}

impl<S: Storage, C: Clock> ReplayController<S, C> {
    /// Create an idle controller with an empty store
    pub fn new(config: ReplayConfig, storage: S, clock: C) -> Result<Self, ReplayError> {
        config
            .validate()
            .map_err(|e| ReplayError::InvalidConfig(e.to_string()))?;

        let recorder = Recorder::new(config.recorder.clone());
        let player = PursuitPlayer::new(&config.pursuit, config.toggles.clone());

        Ok(Self {
            config,
            storage,
            clock,
            recorder,
            player,
            abort: AbortHandle::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// The storage medium
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The clock
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Recorded frames
    pub fn store(&self) -> &FrameStore {
        self.recorder.store()
    }

    /// What is running
    pub fn mode(&self) -> Mode {
        if self.player.is_playing() {
            Mode::Playing
        } else {
            self.recorder.mode()
        }
    }

    /// Status snapshot
    pub fn status(&self) -> ReplayStatus {
        let store = self.store();
        ReplayStatus {
            mode: self.mode(),
            frame_count: store.len(),
            duration_ms: store.duration().as_millis() as u64,
            action_frames: store.action_count(),
            storage_available: self.storage.is_available(),
            countdown_remaining_ms: self
                .recorder
                .countdown_remaining(self.clock.now_micros())
                .map(|d| d.as_millis() as u64),
        }
    }

    /// Handle that aborts a running playback from another thread
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Start (or arm) a recording session
    pub fn start_recording<H>(&mut self, hw: &mut H) -> Result<Sample, ReplayError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        self.ensure_idle()?;

        if !self.storage.is_available() {
            tracing::warn!("storage not present, recording will not be saved");
        }

        self.elevate();
        let now = self.clock.now_micros();
        let result = self.recorder.start_recording(hw, now);
        self.after_sample(result)
    }

    /// Sample if the interval has elapsed; call every driver-control loop
    ///
    /// When the store fills up the session stops, the recording is saved
    /// once, and `CapacityExceeded` reports whether that save succeeded.
    pub fn record_tick<H>(&mut self, hw: &mut H) -> Result<Sample, ReplayError>
    where
        H: PoseSource + InputSource + ?Sized,
    {
        let now = self.clock.now_micros();
        let result = self.recorder.record_tick(hw, now);
        self.after_sample(result)
    }

    /// End the recording session, optionally saving it
    ///
    /// An empty session is never saved, so cancelling during the countdown
    /// leaves the previous file alone.
    pub fn stop_recording(&mut self, persist: bool) -> Result<StopReport, ReplayError> {
        if !self.recorder.stop_recording() {
            return Err(ReplayError::NotRecording);
        }
        self.restore_priority();

        let frames = self.store().len();
        let persisted = if persist && frames > 0 {
            self.save()?;
            true
        } else {
            false
        };
        Ok(StopReport { frames, persisted })
    }

    /// Begin playback, loading the saved recording if nothing is in memory
    pub fn start_playback<H>(&mut self, hw: &mut H) -> Result<(), ReplayError>
    where
        H: PoseSource + DriveActuator + MechanismActuator + ?Sized,
    {
        self.ensure_idle()?;

        if self.store().is_empty() {
            let path = &self.config.storage_path;
            if !(self.storage.is_available() && self.storage.exists(path)) {
                return Err(ReplayError::EmptyRecording);
            }
            self.load()?;
        }

        self.abort.reset();
        let now = self.clock.now_micros();
        self.player.start(self.recorder.store(), hw, now)?;
        self.elevate();
        Ok(())
    }

    /// Run one playback control period
    ///
    /// Stops on either the controller's abort handle or `estop`.
    pub fn playback_tick<H, A>(&mut self, hw: &mut H, estop: &A) -> Result<PlaybackTick, ReplayError>
    where
        H: PoseSource + DriveActuator + MechanismActuator + ?Sized,
        A: AbortSignal + ?Sized,
    {
        let now = self.clock.now_micros();
        let abort = &self.abort;
        let abort_requested = || abort.is_aborted() || estop.abort_requested();

        let tick = self
            .player
            .tick(self.recorder.store(), hw, now, &abort_requested)?;
        if let PlaybackTick::Finished(_) = tick {
            self.restore_priority();
        }
        Ok(tick)
    }

    /// Play the recording to the end, one tick per control period
    pub fn run_playback<H, A>(&mut self, hw: &mut H, estop: &A) -> Result<PlaybackStatus, ReplayError>
    where
        H: PoseSource + DriveActuator + MechanismActuator + ?Sized,
        A: AbortSignal + ?Sized,
    {
        self.start_playback(hw)?;

        let period = self.config.pursuit.tick_period_us();
        let mut deadline = self.clock.now_micros();
        loop {
            if let PlaybackTick::Finished(status) = self.playback_tick(hw, estop)? {
                return Ok(status);
            }
            deadline += period;
            self.clock.sleep_until(deadline);
        }
    }

    /// Abort a running playback now
    pub fn stop_playback<H>(&mut self, hw: &mut H) -> Result<PlaybackStatus, ReplayError>
    where
        H: DriveActuator + MechanismActuator + ?Sized,
    {
        let status = self.player.cancel(hw, self.clock.now_micros())?;
        self.restore_priority();
        Ok(status)
    }

    /// Save the in-memory recording. Returns bytes written.
    pub fn save(&mut self) -> Result<usize, ReplayError> {
        if self.recorder.is_active() {
            return Err(ReplayError::Busy { mode: self.mode() });
        }
        format::save(
            self.recorder.store(),
            &mut self.storage,
            &self.config.storage_path,
        )
    }

    /// Replace the in-memory recording with the saved one
    ///
    /// The store is left untouched if the file is missing or invalid.
    pub fn load(&mut self) -> Result<usize, ReplayError> {
        self.ensure_idle()?;
        let mode = self.mode();
        let store = self
            .recorder
            .store_mut()
            .ok_or(ReplayError::Busy { mode })?;
        format::load_into(store, &self.storage, &self.config.storage_path)
    }

    /// Drop the in-memory recording
    pub fn clear(&mut self) -> Result<(), ReplayError> {
        self.ensure_idle()?;
        if let Some(store) = self.recorder.store_mut() {
            store.clear();
        }
        tracing::info!("recording cleared");
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), ReplayError> {
        match self.mode() {
            Mode::Idle => Ok(()),
            mode => Err(ReplayError::Busy { mode }),
        }
    }

    fn after_sample(&mut self, result: Result<Sample, StoreError>) -> Result<Sample, ReplayError> {
        match result {
            Ok(sample) => Ok(sample),
            Err(StoreError::CapacityExceeded { capacity }) => {
                // Recorder already stopped; this is the only save for the session
                self.restore_priority();
                let persisted = match self.save() {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to save full recording");
                        false
                    }
                };
                Err(ReplayError::CapacityExceeded {
                    max_frames: capacity,
                    persisted,
                })
            }
            Err(StoreError::OutOfOrder { index }) => Err(ReplayError::CorruptFormat(format!(
                "frame {index} goes back in time"
            ))),
        }
    }

    fn elevate(&self) {
        if self.config.elevate_priority {
            self.clock.set_priority(TaskPriority::Elevated);
        }
    }

    fn restore_priority(&self) {
        if self.config.elevate_priority {
            self.clock.set_priority(TaskPriority::Normal);
        }
    }
}
