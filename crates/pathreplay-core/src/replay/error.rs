//! Replay errors

use thiserror::Error;

use super::Mode;

/// Errors reported by recording, persistence and playback
///
/// All of these are recoverable; callers report them to the operator and
/// carry on.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Storage medium not present")]
    StorageUnavailable,

    #[error("Failed to write recording: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to read recording: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Corrupt recording: {0}")]
    CorruptFormat(String),

    #[error("Unsupported recording version {found} (supported: {supported:?})")]
    VersionMismatch { found: u32, supported: &'static [u32] },

    #[error("Recording declares {count} frames, limit is {limit}")]
    TooLarge { count: u32, limit: u32 },

    #[error("Recording full at {max_frames} frames (persisted: {persisted})")]
    CapacityExceeded { max_frames: usize, persisted: bool },

    #[error("No recording in memory or on storage")]
    EmptyRecording,

    #[error("Cannot do that while {mode}")]
    Busy { mode: Mode },

    #[error("Not recording")]
    NotRecording,

    #[error("Not playing")]
    NotPlaying,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from [`super::FrameStore`] mutation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("Frame store full ({capacity} frames)")]
    CapacityExceeded { capacity: usize },

    #[error("Frame {index} is earlier than its predecessor")]
    OutOfOrder { index: usize },
}
