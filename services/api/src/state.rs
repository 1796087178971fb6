//! Shared Application State
//!
//! This module defines the `AppState` struct holding the shared, clonable
//! resources, and the collaborator seam that supplies the per-session
//! contextual briefing.

use crate::config::Config;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Supplies the opaque contextual briefing for a new session.
///
/// The text is derived from business data elsewhere in the platform; the
/// bridge only buffers it until the upstream link is ready and forwards it
/// once. `None` means the session starts with no briefing.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(&self, session_id: Uuid) -> anyhow::Result<Option<String>>;
}

/// A context builder backed by a fixed configured string.
pub struct StaticContext(pub Option<String>);

#[async_trait]
impl ContextBuilder for StaticContext {
    async fn build(&self, _session_id: Uuid) -> anyhow::Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub context_builder: Arc<dyn ContextBuilder>,
}
