//! Voicebridge API Library Crate
//!
//! This library contains the core logic for the realtime voice bridge
//! service: configuration, shared state, routing, and the WebSocket bridge
//! between browser clients and the upstream conversational-AI endpoint.
//! The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod router;
pub mod state;
pub mod ws;
