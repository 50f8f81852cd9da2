//! Inbound messages from the analysis backend

use serde::{Deserialize, Serialize};

use super::exercise::{ExerciseCatalog, ExerciseId, FrameResult};

/// A decoded message received from the backend.
///
/// Messages are handed to the registered handler in arrival order. The link
/// never reorders, deduplicates or buffers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SessionMessage {
    Exercises { catalog: ExerciseCatalog },
    FrameResult(FrameResult),
    SessionStarted { exercise_id: ExerciseId, message: Option<String> },
    CounterReset { message: Option<String> },

    /// Backend-originated error over an open connection.
    ErrorNotice { message: String },
    Pong,
}

impl SessionMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Exercises { .. } => "exercises",
            SessionMessage::FrameResult(_) => "frame_data",
            SessionMessage::SessionStarted { .. } => "session_started",
            SessionMessage::CounterReset { .. } => "counter_reset",
            SessionMessage::ErrorNotice { .. } => "error",
            SessionMessage::Pong => "pong",
        }
    }
}
