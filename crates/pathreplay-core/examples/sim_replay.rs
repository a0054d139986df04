//! Simulated record/replay session
//!
//! Drives a simulated robot through an S-curve while recording, saves the
//! recording, then replays it from a different starting point with wheel
//! slip and reports how closely the replay tracked.
//!
//! Usage:
//!   cargo run --example sim_replay -- [CONFIG.json]
//!
//! Set RUST_LOG=debug to see toggle events, trace for every tick.

use anyhow::{Context, Result};
use pathreplay_core::prelude::*;
use pathreplay_core::replay::PlaybackTick;
use pathreplay_core::robot::ManualClock;
use tracing_subscriber::EnvFilter;

const DEMO_SECONDS: u32 = 6;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ReplayConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => ReplayConfig::default(),
    };

    let dir = std::env::temp_dir().join("pathreplay-demo");
    std::fs::create_dir_all(&dir)?;
    let clock = ManualClock::new();
    let mut replay = ReplayController::new(config, FileStorage::new(&dir), &clock)?;

    // Driver demonstration
    let mut robot = SimRobot::new();
    replay.start_recording(&mut robot)?;
    let steps = DEMO_SECONDS * 100;
    for step in 0..steps {
        let phase = step as f32 / steps as f32;
        let bias = if phase < 0.5 { 25 } else { -25 };
        robot.set_left_power(80 + bias);
        robot.set_right_power(80 - bias);
        robot.set_intake_power(if (0.2..0.4).contains(&phase) { 127 } else { 0 });
        robot.set_button(Button::MidScoring, (0.6..0.65).contains(&phase));

        robot.step(0.01);
        clock.advance(10_000);
        replay.record_tick(&mut robot)?;
    }
    robot.set_left_power(0);
    robot.set_right_power(0);
    robot.set_intake_power(0);

    let report = replay.stop_recording(true)?;
    let recorded_end = robot.pose();
    println!(
        "Recorded {} frames to {}",
        report.frames,
        dir.join(&replay.config().storage_path).display()
    );
    println!("{}", serde_json::to_string_pretty(&replay.status())?);

    // Autonomous replay from elsewhere on the field
    let mut robot = SimRobot::new().with_noise(2024, 0.08);
    robot.place(Pose::new(40.0, -20.0, 120.0));
    replay.start_playback(&mut robot)?;

    let mut worst = 0.0f32;
    let status = loop {
        match replay.playback_tick(&mut robot, &false)? {
            PlaybackTick::Running { command, .. } => worst = worst.max(command.distance),
            PlaybackTick::Finished(status) => break status,
        }
        robot.step(0.02);
        clock.advance(20_000);
    };

    let end = robot.pose();
    println!("Playback {:?}", status);
    println!(
        "  recorded end ({:.1}, {:.1}, {:.1}deg)",
        recorded_end.x, recorded_end.y, recorded_end.theta
    );
    println!("  replayed end ({:.1}, {:.1}, {:.1}deg)", end.x, end.y, end.theta);
    println!("  end error {:.2} in, worst lag {:.2} in", end.distance_to(&recorded_end), worst);
    println!("  mid-scoring line: {}", robot.line(0));

    Ok(())
}
