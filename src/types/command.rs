//! Outbound commands sent to the analysis backend

use serde::{Deserialize, Serialize};

use super::exercise::ExerciseId;

/// A command for the backend.
///
/// `ProcessFrame` is the only variant subject to frame throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum OutboundCommand {
    GetExercises,
    StartSession {
        exercise_id: ExerciseId,
    },
    ProcessFrame {
        exercise_id: ExerciseId,
        /// Raw JPEG bytes; base64-encoded on the wire.
        #[cfg_attr(feature = "tauri", specta(skip))]
        encoded_frame: Vec<u8>,
    },
    ResetCounter,
    Ping,
}

impl OutboundCommand {
    pub fn start_session(exercise_id: impl Into<ExerciseId>) -> Self {
        OutboundCommand::StartSession { exercise_id: exercise_id.into() }
    }

    pub fn process_frame(exercise_id: impl Into<ExerciseId>, encoded_frame: Vec<u8>) -> Self {
        OutboundCommand::ProcessFrame { exercise_id: exercise_id.into(), encoded_frame }
    }

    /// Wire name of the command type.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundCommand::GetExercises => "get_exercises",
            OutboundCommand::StartSession { .. } => "start_session",
            OutboundCommand::ProcessFrame { .. } => "process_frame",
            OutboundCommand::ResetCounter => "reset_counter",
            OutboundCommand::Ping => "ping",
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, OutboundCommand::ProcessFrame { .. })
    }
}
