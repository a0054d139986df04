//! # PathReplay Core Library
//!
//! Record a driven robot routine once, persist it, and replay it autonomously
//! with closed-loop correction.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A bounded, time-ordered store of pose-tagged waypoints
//! - A fixed-cadence recorder that samples pose, mechanism power and toggles
//! - A compact versioned binary file format for recordings
//! - A time-synchronized pursuit player with edge-triggered mechanism toggles
//! - A simulated differential-drive robot for testing without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use pathreplay_core::prelude::*;
//!
//! let config = ReplayConfig::default();
//! let storage = FileStorage::new("/usd");
//! let mut replay = ReplayController::new(config, storage, MonotonicClock::new())?;
//!
//! // Driver demonstrates the routine
//! replay.start_recording(&mut robot)?;
//! loop {
//!     replay.record_tick(&mut robot)?;
//! #   break;
//! }
//! replay.stop_recording(true)?;
//!
//! // Autonomous period
//! let status = replay.run_playback(&mut robot, &estop)?;
//! ```

pub mod config;
pub mod replay;
pub mod robot;
pub mod sim;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{PursuitConfig, PursuitGains, RecorderConfig, ReplayConfig, ToggleBinding};
    pub use crate::replay::{
        Button, ButtonSet, FrameStore, PlaybackStatus, PursuitPlayer, Recorder, ReplayController,
        ReplayError, ReplayStatus, Waypoint,
    };
    pub use crate::robot::{
        AbortHandle, AbortSignal, Clock, DriveActuator, FileStorage, InputSource,
        MechanismActuator, MemoryStorage, MonotonicClock, Pose, PoseSource, Storage,
    };
    pub use crate::sim::SimRobot;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
