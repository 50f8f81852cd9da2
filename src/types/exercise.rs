//! Exercise catalog and per-frame analysis results

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Backend identifier of an exercise, e.g. `"bicep_curls"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(transparent)]
pub struct ExerciseId(String);

impl ExerciseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExerciseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExerciseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ExerciseId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ExerciseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static catalog entry. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ExerciseDescriptor {
    pub id: ExerciseId,
    pub display_name: String,
    pub description: String,
}

impl ExerciseDescriptor {
    pub fn new(
        id: impl Into<ExerciseId>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), display_name: display_name.into(), description: description.into() }
    }
}

/// Exercise catalog keyed by id, ordered for stable iteration.
pub type ExerciseCatalog = BTreeMap<ExerciseId, ExerciseDescriptor>;

/// Posture classification reported with each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    #[default]
    Good,
    Ok,
    Bad,
}

/// Analysis result for a single processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FrameResult {
    pub rep_count: u32,
    pub stage: String,
    pub joint_angle_degrees: f64,
    pub pose_detected: bool,
    pub posture_state: PostureState,

    /// Annotated JPEG returned by the backend, already base64-decoded.
    #[cfg_attr(feature = "tauri", specta(skip))]
    pub encoded_frame: Option<Vec<u8>>,

    pub rep_just_completed: bool,

    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,

    pub exercise_id: Option<ExerciseId>,

    /// Backend-side frame counter, when reported.
    pub frame_count: Option<u64>,
}
