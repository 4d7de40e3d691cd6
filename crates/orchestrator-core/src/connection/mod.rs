//! Signaling connection lifecycle
//!
//! - [`state`] - guarded state machine interpreting signaling events
//! - [`handle`] - [`ConnectionHandle`] owning one connection attempt

pub mod handle;
pub mod state;

pub use handle::{build_signaling_url, ConnectionHandle, ConnectionInfo, CLIENT_DISCONNECT_REASON};
pub use state::{ConnectionState, ConnectionStateMachine, Transition};
