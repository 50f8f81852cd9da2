//! Real-time exercise session link.
//!
//! `sessionlink` is the client side of the channel between an exercise coaching
//! UI and a pose-analysis backend. The host streams camera frames and session
//! commands out; the backend streams rep counts, posture and annotated frames back.
//!
//! # Features
//!
//! - **Bounded reconnect**: abnormal closes retry at a fixed interval, a fixed number of times
//! - **Frame throttle**: at most one frame per window reaches the wire, the rest are dropped
//! - **Offline queue**: commands issued while disconnected are flushed in order on open
//! - **Typed protocol**: JSON envelopes decoded into [`SessionMessage`], malformed input is logged and dropped
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sessionlink::{ConnectionState, LinkConfig, SessionLink, SessionMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = SessionLink::new(LinkConfig::new("ws://localhost:8001"))?;
//!
//!     link.on_message(|message| match message {
//!         SessionMessage::FrameResult(frame) => println!("reps: {}", frame.rep_count),
//!         SessionMessage::ErrorNotice { message } => eprintln!("backend: {message}"),
//!         _ => {}
//!     });
//!
//!     link.connect();
//!     link.wait_for_state(ConnectionState::Connected).await?;
//!     link.start_session("squats");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod driver;
mod error;
mod link;
pub mod machine;
pub mod snapshot;
pub mod throttle;
pub mod transport;
pub mod transports;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::LinkConfig;
pub use error::*;
pub use link::SessionLink;
pub use snapshot::{Feedback, SessionSnapshot};
pub use transport::{CloseCode, Connector, Transport, TransportEvent};
pub use transports::WebSocketConnector;
pub use types::*;
