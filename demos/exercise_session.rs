//! Stream a JPEG to an analysis backend as if it were a camera feed
//!
//! Usage: `cargo run --example exercise_session -- <frame.jpg> [exercise] [config.yaml]`
//!
//! Set `RUST_LOG=sessionlink=debug` to watch the link lifecycle.

use anyhow::{Context, Result, bail};
use sessionlink::{
    ConnectionState, ExerciseId, Feedback, LinkConfig, SessionLink, SessionMessage, SessionSnapshot,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CAMERA_TICK: Duration = Duration::from_millis(33);
const SESSION_LENGTH: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(frame_path) = args.next() else {
        bail!("usage: exercise_session <frame.jpg> [exercise] [config.yaml]");
    };
    let exercise = ExerciseId::from(args.next().unwrap_or_else(|| "squats".to_string()));
    let config = match args.next() {
        Some(path) => LinkConfig::from_yaml_file(&path)
            .with_context(|| format!("loading link config from {path}"))?,
        None => LinkConfig::default(),
    };

    let jpeg = std::fs::read(&frame_path).with_context(|| format!("reading {frame_path}"))?;
    let link = SessionLink::new(config.for_exercise(&exercise))?;

    let (message_tx, mut messages) = mpsc::unbounded_channel();
    link.on_message(move |message| {
        let _ = message_tx.send(message);
    });
    link.on_state_change(|status| info!("Link {}", status.state));

    link.start_session(exercise.clone());
    link.connect();
    link.wait_for(|s| matches!(s.state, ConnectionState::Connected | ConnectionState::Error)).await?;
    if !link.is_connected() {
        bail!("could not connect: {}", link.status().last_error.unwrap_or_default());
    }

    let mut snapshot = SessionSnapshot::default();
    let mut camera = tokio::time::interval(CAMERA_TICK);
    let deadline = tokio::time::sleep(SESSION_LENGTH);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = camera.tick() => link.process_frame(exercise.clone(), jpeg.clone()),
            Some(message) = messages.recv() => {
                if let SessionMessage::Exercises { catalog } = &message {
                    info!("Backend offers {} exercises", catalog.len());
                }
                for cue in snapshot.apply(&message) {
                    match cue {
                        Feedback::RepCompleted { rep_count } => info!("Good rep! ({rep_count})"),
                        Feedback::AdjustPosture => warn!("Adjust your posture"),
                    }
                }
            }
        }
    }

    info!(
        "Session over: {} reps over {} frames{}",
        snapshot.rep_count(),
        snapshot.frames_received,
        snapshot.last_error.map(|e| format!(", last backend error: {e}")).unwrap_or_default()
    );
    link.disconnect();
    link.wait_for_state(ConnectionState::Disconnected).await?;
    Ok(())
}
