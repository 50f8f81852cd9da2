//! Core types for the exercise session protocol.
//!
//! These are the domain values a host application works with. They are decoupled
//! from the JSON wire shapes, which live in [`crate::codec`].
//!
//! - [`ConnectionState`] / [`LinkStatus`] describe the link lifecycle
//! - [`SessionMessage`] is everything the analysis backend can send us
//! - [`OutboundCommand`] is everything we can send the backend
//! - [`ReconnectPolicy`] bounds automatic reconnection
//!
//! ## Usage Example
//!
//! ```rust
//! use sessionlink::types::{ExerciseId, OutboundCommand};
//!
//! let command = OutboundCommand::start_session("bicep_curls");
//! assert_eq!(command.kind(), "start_session");
//! assert!(!command.is_frame());
//!
//! let id = ExerciseId::from("squats");
//! assert_eq!(id.as_str(), "squats");
//! ```

mod command;
mod exercise;
mod message;
mod policy;
mod state;

pub use command::OutboundCommand;
pub use exercise::{ExerciseCatalog, ExerciseDescriptor, ExerciseId, FrameResult, PostureState};
pub use message::SessionMessage;
pub use policy::ReconnectPolicy;
pub use state::{ConnectionState, LinkStatus};
