//! Realtime client for the conversational-AI agent WebSocket protocol.
//!
//! This crate owns the two things the bridge service should not have to care
//! about: how an upstream conversation socket is obtained (`client`), and the
//! typed wire format spoken over it (`events`).

pub mod client;
pub mod events;

pub use client::{ConvaiConfig, UpstreamSocket, connect};
