//! Per-session connection state.
//!
//! The upstream requires an explicit initialization handshake before it will
//! accept audio, so readiness is a state transition driven by its metadata
//! event, never by socket-open. All checks and mutations of the shared
//! session state go through this type; the reader loops hold it behind a
//! mutex with short critical sections.

/// Lifecycle of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The outbound dial is in flight.
    Dialing,
    /// Socket open, waiting for the initiation-metadata event.
    AwaitingMetadata,
    /// Initialization acknowledged; audio and context may flow.
    Ready,
    /// One side signalled close; teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

/// The result of the first metadata event: the link became ready, and the
/// buffered context (if any) must be flushed now.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTransition {
    pub context: Option<String>,
}

/// Mutable state shared between the two reader loops of a session.
#[derive(Debug)]
pub struct SessionState {
    link: LinkState,
    pending_context: Option<String>,
    close_notified: bool,
}

impl SessionState {
    pub fn new(pending_context: Option<String>) -> Self {
        Self {
            link: LinkState::Dialing,
            pending_context,
            close_notified: false,
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    /// The upstream socket is open; metadata has not arrived yet.
    pub fn upstream_connected(&mut self) {
        if self.link == LinkState::Dialing {
            self.link = LinkState::AwaitingMetadata;
        }
    }

    /// Drives the `AwaitingMetadata -> Ready` transition.
    ///
    /// Returns `Some` on the first metadata event only, handing out the
    /// buffered context exactly once. A duplicate metadata event returns
    /// `None` and changes nothing.
    pub fn mark_ready(&mut self) -> Option<ReadyTransition> {
        if self.link != LinkState::AwaitingMetadata {
            return None;
        }
        self.link = LinkState::Ready;
        Some(ReadyTransition {
            context: self.pending_context.take(),
        })
    }

    /// Whether a client audio frame may be forwarded right now.
    pub fn accepts_audio(&self) -> bool {
        self.link == LinkState::Ready
    }

    /// Buffers a contextual update that arrived before readiness, replacing
    /// any earlier buffer. Returns `false` when the link is already ready
    /// and the update should be forwarded directly instead.
    pub fn buffer_context(&mut self, text: String) -> bool {
        if self.link == LinkState::Ready {
            return false;
        }
        self.pending_context = Some(text);
        true
    }

    /// Latches the closing state. `true` only for the first caller.
    pub fn begin_close(&mut self) -> bool {
        match self.link {
            LinkState::Closing | LinkState::Closed => false,
            _ => {
                self.link = LinkState::Closing;
                true
            }
        }
    }

    /// `true` exactly once per session: guards the single structured close
    /// notification sent to the client.
    pub fn take_close_notification(&mut self) -> bool {
        if self.close_notified {
            return false;
        }
        self.close_notified = true;
        true
    }

    pub fn finish_close(&mut self) {
        self.link = LinkState::Closed;
    }
}
