//! Derived session state for host UIs
//!
//! [`SessionSnapshot`] folds the message stream into the values a session screen
//! shows: the catalog, the active exercise, the latest frame result and the last
//! backend error. Every field is last-write-wins.
//!
//! ```rust
//! use sessionlink::{SessionMessage, SessionSnapshot, ExerciseId};
//!
//! let mut snapshot = SessionSnapshot::default();
//! snapshot.apply(&SessionMessage::SessionStarted {
//!     exercise_id: ExerciseId::from("squats"),
//!     message: None,
//! });
//! assert_eq!(snapshot.active_exercise.as_ref().map(|id| id.as_str()), Some("squats"));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ExerciseCatalog, ExerciseId, FrameResult, PostureState, SessionMessage};

/// Completed reps closer together than this produce a single cue.
pub const REP_FEEDBACK_DEBOUNCE_MS: u64 = 500;

/// While posture stays bad, a cue is raised on every Nth frame.
pub const POSTURE_FEEDBACK_EVERY: u64 = 30;

/// Cue a host may turn into audio or haptics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Feedback {
    RepCompleted { rep_count: u32 },
    AdjustPosture,
}

/// Last-write-wins view of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub catalog: ExerciseCatalog,
    pub active_exercise: Option<ExerciseId>,

    /// Latest frame result, without its image.
    pub latest_frame: Option<FrameResult>,

    /// Latest annotated image. Frames without one keep the previous image.
    pub latest_image: Option<Vec<u8>>,

    pub last_error: Option<String>,

    /// Frame results applied since the last reset.
    pub frames_received: u64,

    last_rep_feedback_ms: Option<u64>,
}

impl SessionSnapshot {
    pub fn rep_count(&self) -> u32 {
        self.latest_frame.as_ref().map_or(0, |frame| frame.rep_count)
    }

    pub fn posture(&self) -> PostureState {
        self.latest_frame.as_ref().map_or(PostureState::Good, |frame| frame.posture_state)
    }

    /// Fold one message in, returning any cues it raises.
    pub fn apply(&mut self, message: &SessionMessage) -> Vec<Feedback> {
        match message {
            SessionMessage::Exercises { catalog } => {
                self.catalog = catalog.clone();
                Vec::new()
            }
            SessionMessage::SessionStarted { exercise_id, .. } => {
                self.active_exercise = Some(exercise_id.clone());
                self.last_error = None;
                self.reset_progress();
                Vec::new()
            }
            SessionMessage::CounterReset { .. } => {
                self.reset_progress();
                Vec::new()
            }
            SessionMessage::ErrorNotice { message } => {
                self.last_error = Some(message.clone());
                Vec::new()
            }
            SessionMessage::FrameResult(frame) => self.apply_frame(frame),
            SessionMessage::Pong => Vec::new(),
        }
    }

    fn apply_frame(&mut self, frame: &FrameResult) -> Vec<Feedback> {
        self.frames_received += 1;

        let mut frame = frame.clone();
        if let Some(image) = frame.encoded_frame.take() {
            self.latest_image = Some(image);
        }
        if self.active_exercise.is_none() {
            self.active_exercise = frame.exercise_id.clone();
        }

        let mut cues = Vec::new();
        if frame.rep_just_completed {
            let due = self
                .last_rep_feedback_ms
                .is_none_or(|last| frame.timestamp_ms.saturating_sub(last) > REP_FEEDBACK_DEBOUNCE_MS);
            if due {
                self.last_rep_feedback_ms = Some(frame.timestamp_ms);
                cues.push(Feedback::RepCompleted { rep_count: frame.rep_count });
            }
        }
        if frame.posture_state == PostureState::Bad
            && self.frames_received % POSTURE_FEEDBACK_EVERY == 0
        {
            cues.push(Feedback::AdjustPosture);
        }

        self.latest_frame = Some(frame);
        cues
    }

    fn reset_progress(&mut self) {
        self.latest_frame = None;
        self.latest_image = None;
        self.frames_received = 0;
        self.last_rep_feedback_ms = None;
    }
}
