//! Tests for recording, persistence and recovery of saved recordings

use pathreplay_core::prelude::*;
use pathreplay_core::replay::format::{self, FORMAT_VERSION, MAGIC};
use pathreplay_core::replay::{Mode, Sample};
use pathreplay_core::robot::ManualClock;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Drive the simulated robot through a short routine while recording
fn record_routine<S: Storage>(replay: &mut ReplayController<S, &ManualClock>, clock: &ManualClock, robot: &mut SimRobot) {
    replay.start_recording(robot).unwrap();
    robot.set_left_power(90);
    robot.set_right_power(60);
    for tick in 0..80 {
        if tick == 20 {
            robot.set_button(Button::MidScoring, true);
            robot.set_intake_power(127);
        }
        if tick == 30 {
            robot.set_button(Button::MidScoring, false);
        }
        robot.step(0.01);
        clock.advance(10_000);
        replay.record_tick(robot).unwrap();
    }
    robot.set_left_power(0);
    robot.set_right_power(0);
}

#[test]
fn test_save_load_round_trip_on_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();

    let mut replay = ReplayController::new(
        ReplayConfig::default(),
        FileStorage::new(dir.path()),
        &clock,
    )
    .unwrap();
    record_routine(&mut replay, &clock, &mut robot);
    let report = replay.stop_recording(true).unwrap();
    assert!(report.persisted);
    assert!(dir.path().join("position_recording.bin").exists());

    let recorded = replay.store().frames().to_vec();
    assert!(recorded.len() > 10);

    let mut reloaded = ReplayController::new(
        ReplayConfig::default(),
        FileStorage::new(dir.path()),
        &clock,
    )
    .unwrap();
    assert_eq!(reloaded.load().unwrap(), recorded.len());
    assert_eq!(reloaded.store().frames(), recorded.as_slice());
}

#[test]
fn test_recording_timestamps_are_ordered() {
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut replay = ReplayController::new(ReplayConfig::default(), MemoryStorage::new(), &clock).unwrap();

    clock.advance(7_777);
    replay.start_recording(&mut robot).unwrap();
    // Jittery control loop: 5..40 ms between calls
    for _ in 0..300 {
        clock.advance(rng.gen_range(5_000..40_000));
        replay.record_tick(&mut robot).unwrap();
    }
    replay.stop_recording(false).unwrap();

    let frames = replay.store().frames();
    assert_eq!(frames[0].timestamp, 0);
    for pair in frames.windows(2) {
        assert!(pair[1].timestamp >= pair[0].timestamp + 25_000);
    }
}

#[test]
fn test_actions_flagged() {
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();
    let mut replay = ReplayController::new(ReplayConfig::default(), MemoryStorage::new(), &clock).unwrap();
    record_routine(&mut replay, &clock, &mut robot);
    replay.stop_recording(false).unwrap();

    let frames = replay.store().frames();
    assert!(frames.iter().take_while(|f| f.intake_power == 0).all(|f| !f.has_action));
    // Intake running from the press onward keeps every later frame flagged
    let first_action = frames.iter().position(|f| f.has_action).unwrap();
    assert!(frames[first_action].buttons.contains(Button::MidScoring));
    assert!(frames[first_action..].iter().all(|f| f.has_action));
    assert_eq!(replay.status().action_frames, frames.len() - first_action);
}

#[test]
fn test_capacity_bound_persists_once() {
    init_tracing();
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();
    let mut storage = MemoryStorage::new();

    let mut config = ReplayConfig::default();
    config.recorder.max_frames = 50;
    let mut replay = ReplayController::new(config, &mut storage, &clock).unwrap();

    replay.start_recording(&mut robot).unwrap();
    let mut errors = Vec::new();
    for _ in 0..60 {
        clock.advance(25_000);
        match replay.record_tick(&mut robot) {
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
    }

    assert_eq!(errors, vec!["Recording full at 50 frames (persisted: true)".to_string()]);
    assert_eq!(replay.store().len(), 50);
    assert_eq!(replay.mode(), Mode::Idle);
    assert!(matches!(
        replay.stop_recording(true),
        Err(ReplayError::NotRecording)
    ));
    drop(replay);

    assert_eq!(storage.commit_count(), 1);
    let saved = format::decode(storage.get(Path::new("position_recording.bin")).unwrap(), 100).unwrap();
    assert_eq!(saved.len(), 50);
}

#[test]
fn test_bad_magic_leaves_store_untouched() {
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();
    let mut storage = MemoryStorage::new();
    let mut bytes = format::encode(&[Waypoint::default()]);
    bytes[0] ^= 0xFF;
    storage.insert("position_recording.bin", bytes);

    let mut replay = ReplayController::new(ReplayConfig::default(), storage, &clock).unwrap();
    replay.start_recording(&mut robot).unwrap();
    clock.advance(25_000);
    replay.record_tick(&mut robot).unwrap();
    replay.stop_recording(false).unwrap();
    let before = replay.store().frames().to_vec();

    assert!(matches!(replay.load(), Err(ReplayError::CorruptFormat(_))));
    assert_eq!(replay.store().frames(), before.as_slice());
}

#[test]
fn test_huge_frame_count_rejected_before_reading() {
    let clock = ManualClock::new();
    let mut storage = MemoryStorage::new();

    // Header only: a body would be 240 MB
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC.to_le_bytes());
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&10_000_000u32.to_le_bytes());
    storage.insert("position_recording.bin", bytes);

    let mut replay = ReplayController::new(ReplayConfig::default(), storage, &clock).unwrap();
    assert!(matches!(
        replay.load(),
        Err(ReplayError::TooLarge {
            count: 10_000_000,
            ..
        })
    ));
    assert!(replay.store().is_empty());

    let mut robot = SimRobot::new();
    assert!(matches!(
        replay.start_playback(&mut robot),
        Err(ReplayError::TooLarge { .. })
    ));
}

#[test]
fn test_binary_search_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut frames = Vec::new();
    let mut t = 0u64;
    for _ in 0..500 {
        frames.push(Waypoint {
            timestamp: t,
            ..Waypoint::default()
        });
        t += rng.gen_range(0..50_000);
    }
    let mut store = FrameStore::default();
    store.replace_all(frames).unwrap();
    let last = store.last_timestamp().unwrap();

    for _ in 0..2_000 {
        let query = rng.gen_range(0..last + 100_000);
        let expected = store
            .frames()
            .iter()
            .position(|f| f.timestamp >= query)
            .unwrap_or(store.len() - 1);
        assert_eq!(store.find_index_at_time(query), Some(expected), "t={query}");
    }
}

#[test]
fn test_countdown_then_first_frame_at_zero() {
    let clock = ManualClock::new();
    let mut robot = SimRobot::new();
    let mut config = ReplayConfig::default();
    config.recorder.countdown_ms = 3000;
    let mut replay = ReplayController::new(config, MemoryStorage::new(), &clock).unwrap();

    assert!(matches!(
        replay.start_recording(&mut robot).unwrap(),
        Sample::Counting { .. }
    ));
    for _ in 0..119 {
        clock.advance(25_000);
        assert!(matches!(
            replay.record_tick(&mut robot).unwrap(),
            Sample::Counting { .. }
        ));
    }
    clock.advance(25_000);
    assert_eq!(
        replay.record_tick(&mut robot).unwrap(),
        Sample::Recorded {
            index: 0,
            has_action: false
        }
    );
    assert_eq!(replay.store().at(0).unwrap().timestamp, 0);
    assert_eq!(replay.mode(), Mode::Recording);
}
