//! JSON wire codec for the session protocol.
//!
//! Both directions use JSON objects tagged by a `type` field:
//!
//! - inbound: `exercises`, `frame_data` (alias `frame_processed`), `session_started`,
//!   `counter_reset`, `error`, `pong`
//! - outbound: `get_exercises`, `start_session`, `process_frame`, `reset_counter`, `ping`
//!
//! Frame payloads travel as base64 JPEG strings. Inbound frames may carry a
//! `data:image/jpeg;base64,` prefix which is stripped before decoding.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{
    ExerciseCatalog, ExerciseDescriptor, ExerciseId, FrameResult, OutboundCommand, PostureState,
    SessionMessage,
};
use crate::{LinkError, Result};

/// Inbound `type` values this codec understands.
pub const KNOWN_INBOUND_TYPES: &[&str] =
    &["exercises", "frame_data", "frame_processed", "session_started", "counter_reset", "error", "pong"];

/// Timestamps below this are float seconds, at or above it milliseconds.
const SECONDS_CUTOFF: f64 = 1e11;

const DEFAULT_STAGE: &str = "detecting";
const DEFAULT_ERROR: &str = "Unknown error";

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireInbound {
    Exercises {
        #[serde(default)]
        exercises: BTreeMap<String, WireExercise>,
    },
    #[serde(alias = "frame_processed")]
    FrameData(WireFrame),
    SessionStarted {
        exercise_type: String,
        #[serde(default)]
        message: Option<String>,
    },
    CounterReset {
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    Pong,
}

#[derive(Deserialize)]
struct WireExercise {
    #[serde(alias = "display_name")]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    reps: Option<u32>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    angle: Option<f64>,
    #[serde(default)]
    pose_detected: Option<bool>,
    #[serde(default)]
    posture_state: Option<PostureState>,
    #[serde(default)]
    frame: Option<String>,
    #[serde(default)]
    rep_completed: Option<bool>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    exercise_type: Option<String>,
    #[serde(default)]
    frame_count: Option<u64>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireOutbound<'a> {
    GetExercises,
    StartSession { exercise_type: &'a str },
    ProcessFrame { exercise_type: &'a str, frame: String },
    ResetCounter,
    Ping,
}

/// Decode one inbound text payload.
///
/// Returns `Ok(None)` for well-formed messages with an unknown `type`; those are
/// ignored by the link. Malformed payloads are errors.
pub fn decode_inbound(text: &str) -> Result<Option<SessionMessage>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| LinkError::decode_error("inbound message", e.to_string()))?;

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(kind) => kind,
        None => return Err(LinkError::decode_error("inbound message", "missing 'type' field")),
    };

    if !KNOWN_INBOUND_TYPES.contains(&kind) {
        return Ok(None);
    }

    let context = format!("'{kind}' message");
    let wire: WireInbound =
        serde_json::from_value(value).map_err(|e| LinkError::decode_error(context, e.to_string()))?;

    let message = match wire {
        WireInbound::Exercises { exercises } => {
            SessionMessage::Exercises { catalog: catalog_from_wire(exercises) }
        }
        WireInbound::FrameData(frame) => SessionMessage::FrameResult(frame_from_wire(frame)?),
        WireInbound::SessionStarted { exercise_type, message } => {
            SessionMessage::SessionStarted { exercise_id: ExerciseId::from(exercise_type), message }
        }
        WireInbound::CounterReset { message } => SessionMessage::CounterReset { message },
        WireInbound::Error { message } => SessionMessage::ErrorNotice {
            message: message.unwrap_or_else(|| DEFAULT_ERROR.to_string()),
        },
        WireInbound::Pong => SessionMessage::Pong,
    };

    Ok(Some(message))
}

/// Encode one outbound command as a JSON text payload.
pub fn encode_command(command: &OutboundCommand) -> Result<String> {
    let wire = match command {
        OutboundCommand::GetExercises => WireOutbound::GetExercises,
        OutboundCommand::StartSession { exercise_id } => {
            WireOutbound::StartSession { exercise_type: exercise_id.as_str() }
        }
        OutboundCommand::ProcessFrame { exercise_id, encoded_frame } => WireOutbound::ProcessFrame {
            exercise_type: exercise_id.as_str(),
            frame: STANDARD.encode(encoded_frame),
        },
        OutboundCommand::ResetCounter => WireOutbound::ResetCounter,
        OutboundCommand::Ping => WireOutbound::Ping,
    };

    serde_json::to_string(&wire).map_err(|e| LinkError::Encode { details: e.to_string() })
}

/// Decode a base64 frame payload, with or without a data URL prefix.
pub fn decode_frame_payload(payload: &str) -> Result<Vec<u8>> {
    let data = match payload.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, data)) => data,
            None => return Err(LinkError::decode_error("frame payload", "data URL without ','")),
        },
        None => payload,
    };

    STANDARD.decode(data.trim()).map_err(|e| LinkError::decode_error("frame payload", e.to_string()))
}

/// Normalize a backend timestamp to epoch milliseconds.
///
/// Backends report float seconds; values at or above `1e11` are taken as
/// milliseconds already. Missing or negative values take the current time.
pub fn normalize_timestamp_ms(raw: Option<f64>) -> u64 {
    match raw {
        Some(ts) if ts.is_finite() && ts >= 0.0 => {
            if ts < SECONDS_CUTOFF {
                (ts * 1000.0).round() as u64
            } else {
                ts.round() as u64
            }
        }
        _ => now_ms(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn catalog_from_wire(exercises: BTreeMap<String, WireExercise>) -> ExerciseCatalog {
    exercises
        .into_iter()
        .map(|(id, entry)| {
            let id = ExerciseId::from(id);
            let descriptor = ExerciseDescriptor::new(id.clone(), entry.name, entry.description);
            (id, descriptor)
        })
        .collect()
}

fn frame_from_wire(frame: WireFrame) -> Result<FrameResult> {
    let encoded_frame = match frame.frame.as_deref() {
        Some(payload) if !payload.is_empty() => Some(decode_frame_payload(payload)?),
        _ => None,
    };

    Ok(FrameResult {
        rep_count: frame.reps.unwrap_or(0),
        stage: frame.stage.unwrap_or_else(|| DEFAULT_STAGE.to_string()),
        joint_angle_degrees: frame.angle.unwrap_or(0.0),
        pose_detected: frame.pose_detected.unwrap_or(false),
        posture_state: frame.posture_state.unwrap_or_default(),
        encoded_frame,
        rep_just_completed: frame.rep_completed.unwrap_or(false),
        timestamp_ms: normalize_timestamp_ms(frame.timestamp),
        exercise_id: frame.exercise_type.map(ExerciseId::from),
        frame_count: frame.frame_count,
    })
}
