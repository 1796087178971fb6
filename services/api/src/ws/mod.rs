//! WebSocket Voice Bridge
//!
//! This module relays a browser client's realtime voice session to the
//! upstream conversational-AI endpoint. It is structured into submodules:
//!
//! - `protocol`: the JSON message format spoken with the browser client.
//! - `bridge`: the per-session connection state machine.
//! - `limits`: size ceilings for outbound audio frames.
//! - `session`: the connection lifecycle, from upgrade to teardown.

pub mod bridge;
pub mod limits;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
