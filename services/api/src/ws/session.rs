//! Manages the bridge session lifecycle: upgrade, upstream dial, the two
//! relay loops, and teardown.
//!
//! Each session runs two reader loops, client-inbound and upstream-inbound,
//! that share the [`SessionState`] and the two outbound sinks. Reads proceed
//! independently; writes are serialized per socket by a mutex around each
//! sink. A cancellation token, observed by both loops between reads, makes
//! the close of one side promptly terminate the other.

use crate::{
    state::AppState,
    ws::{
        bridge::{LinkState, SessionState},
        limits,
        protocol::{ClientFrame, ServerMessage},
    },
};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use base64::Engine as _;
use convai_realtime::{
    client::{UpstreamSocket, connect},
    events::{ClientEvent, ServerEvent, UserAudioChunk},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, instrument, warn};
use uuid::Uuid;

type ClientSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;
type UpstreamSink = Arc<Mutex<SplitSink<UpstreamSocket, WsMessage>>>;
type Shared = Arc<Mutex<SessionState>>;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Entry point for one bridge session.
///
/// Runs the bridge to completion and, on a session-fatal error, reports it
/// to the client with a structured `error` frame before closing.
#[instrument(name = "bridge_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", &session_id.to_string());
    info!("New client connection. Dialing upstream...");

    let (client_tx, client_rx) = socket.split();
    let client_tx: ClientSink = Arc::new(Mutex::new(client_tx));

    if let Err(e) = run_bridge(&state, session_id, &client_tx, client_rx).await {
        error!(error = ?e, "Bridge session terminated with error.");
        let mut sink = client_tx.lock().await;
        let _ = send_control(
            &mut sink,
            ServerMessage::Error {
                message: "voice connection failed".to_string(),
                error: format!("{e:#}"),
            },
        )
        .await;
    }

    // The client socket is closed here, exactly once, so the error frame
    // above is never raced by an earlier close.
    let _ = client_tx.lock().await.send(Message::Close(None)).await;
    info!("Bridge session finished.");
}

/// Dials the upstream and relays frames in both directions until either side
/// disconnects or a session-fatal error occurs.
async fn run_bridge(
    state: &Arc<AppState>,
    session_id: Uuid,
    client_tx: &ClientSink,
    mut client_rx: SplitStream<WebSocket>,
) -> Result<()> {
    let pending_context = match state.context_builder.build(session_id).await {
        Ok(context) => context,
        Err(e) => {
            warn!(error = ?e, "Context builder failed. Continuing without a contextual update.");
            None
        }
    };
    let shared: Shared = Arc::new(Mutex::new(SessionState::new(pending_context)));

    let upstream = connect(&state.http, &state.config.convai_config())
        .await
        .context("upstream dial failed")?;
    shared.lock().await.upstream_connected();
    info!("Upstream connected. Awaiting initiation metadata.");

    let (upstream_tx, upstream_rx) = upstream.split();
    let upstream_tx: UpstreamSink = Arc::new(Mutex::new(upstream_tx));

    // The upstream refuses everything else until this greeting arrives. A
    // write failure this early still gets the explicit close handshake; the
    // socket is never abandoned to Drop.
    if let Err(e) = send_upstream(&upstream_tx, &ClientEvent::initiation()).await {
        shared.lock().await.begin_close();
        let _ = upstream_tx.lock().await.send(WsMessage::Close(None)).await;
        shared.lock().await.finish_close();
        return Err(e.context("failed to send initiation greeting"));
    }

    let cancel = CancellationToken::new();
    let upstream_task = tokio::spawn(
        upstream_reader(
            shared.clone(),
            client_tx.clone(),
            upstream_tx.clone(),
            upstream_rx,
            cancel.clone(),
        )
        .in_current_span(),
    );

    let client_result = client_reader(&shared, &upstream_tx, &mut client_rx, &cancel).await;

    // Whichever loop exited first, both sides come down together.
    cancel.cancel();
    shared.lock().await.begin_close();
    let _ = upstream_tx.lock().await.send(WsMessage::Close(None)).await;
    let upstream_result = match upstream_task.await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("upstream reader task failed: {e}")),
    };
    shared.lock().await.finish_close();
    info!("Bridge torn down.");

    client_result?;
    upstream_result?;
    Ok(())
}

/// Reads frames from the client and forwards them upstream.
async fn client_reader(
    shared: &Shared,
    upstream_tx: &UpstreamSink,
    client_rx: &mut SplitStream<WebSocket>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = client_rx.next() => message,
        };
        let Some(message) = message else {
            info!("Client stream ended.");
            break;
        };
        let message = message.context("client socket read failed")?;

        match message {
            Message::Binary(data) => {
                forward_client_audio(shared, upstream_tx, &data).await?;
            }
            Message::Text(text) => match ClientFrame::parse(&text)? {
                ClientFrame::AudioChunk { audio_base_64 } => {
                    forward_wrapped_audio(shared, upstream_tx, audio_base_64).await?;
                }
                ClientFrame::ContextualUpdate { text } => {
                    let buffered = shared.lock().await.buffer_context(text.clone());
                    if buffered {
                        info!("Buffered contextual update until the upstream link is ready.");
                    } else {
                        send_upstream(upstream_tx, &ClientEvent::ContextualUpdate { text }).await?;
                    }
                }
                ClientFrame::Passthrough(value) => {
                    send_upstream_text(upstream_tx, serde_json::to_string(&value)?).await?;
                }
            },
            Message::Close(_) => {
                info!("Client sent close frame.");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    Ok(())
}

/// Reads frames from the upstream and relays or answers them.
async fn upstream_reader(
    shared: Shared,
    client_tx: ClientSink,
    upstream_tx: UpstreamSink,
    mut upstream_rx: SplitStream<UpstreamSocket>,
    cancel: CancellationToken,
) -> Result<()> {
    // Wakes the client loop no matter how this one exits.
    let _guard = cancel.clone().drop_guard();

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = upstream_rx.next() => message,
        };
        let Some(message) = message else {
            // Stream ended without a close frame.
            notify_closed(&shared, &client_tx, 1006, "upstream connection lost").await;
            break;
        };
        let message = message.context("upstream socket read failed")?;

        match message {
            WsMessage::Text(text) => {
                handle_upstream_frame(&shared, &client_tx, &upstream_tx, text.as_str()).await?;
            }
            WsMessage::Close(frame) => {
                let (code, reason) = match frame {
                    Some(f) => (u16::from(f.code), f.reason.to_string()),
                    None => (1000, String::new()),
                };
                info!(code, reason = %reason, "Upstream closed the connection.");
                notify_closed(&shared, &client_tx, code, &reason).await;
                break;
            }
            // Transport-level keepalive, answered by tungstenite itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {
                warn!("Ignoring unexpected binary frame from upstream.");
            }
            WsMessage::Frame(_) => {}
        }
    }
    Ok(())
}

/// Dispatches one decoded upstream frame.
async fn handle_upstream_frame(
    shared: &Shared,
    client_tx: &ClientSink,
    upstream_tx: &UpstreamSink,
    text: &str,
) -> Result<()> {
    match ServerEvent::parse(text)? {
        ServerEvent::InitiationMetadata(metadata) => {
            let transition = shared.lock().await.mark_ready();
            let Some(transition) = transition else {
                warn!("Ignoring duplicate initiation metadata from upstream.");
                return Ok(());
            };
            info!(conversation_id = %metadata.conversation_id, "Upstream link is ready.");

            if let Some(text) = transition.context {
                send_upstream(upstream_tx, &ClientEvent::ContextualUpdate { text }).await?;
            }

            let audio_format = metadata
                .agent_output_audio_format
                .unwrap_or_else(|| "pcm_16000".to_string());
            let mut sink = client_tx.lock().await;
            send_control(
                &mut sink,
                ServerMessage::ConnectionReady {
                    conversation_id: metadata.conversation_id,
                    audio_format,
                },
            )
            .await?;
        }
        ServerEvent::Ping(ping) => {
            // Keepalive contract: answered in the same dispatch step, never
            // relayed to the client.
            send_upstream(
                upstream_tx,
                &ClientEvent::Pong {
                    event_id: ping.event_id,
                },
            )
            .await?;
        }
        ServerEvent::Audio(_) | ServerEvent::Passthrough(_) => {
            relay_to_client(client_tx, text).await?;
        }
    }
    Ok(())
}

/// Relays one raw binary audio frame from the client.
async fn forward_client_audio(
    shared: &Shared,
    upstream_tx: &UpstreamSink,
    data: &[u8],
) -> Result<()> {
    if !audio_gate(shared).await {
        return Ok(());
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    report_oversize(data.len(), encoded.len());
    send_upstream(
        upstream_tx,
        &UserAudioChunk {
            user_audio_chunk: encoded,
        },
    )
    .await
}

/// Relays a JSON-wrapped audio frame, preserving the client's base64 payload
/// byte-for-byte.
async fn forward_wrapped_audio(
    shared: &Shared,
    upstream_tx: &UpstreamSink,
    audio_base_64: String,
) -> Result<()> {
    if !audio_gate(shared).await {
        return Ok(());
    }
    report_oversize(
        limits::raw_len_of_encoded(&audio_base_64),
        audio_base_64.len(),
    );
    send_upstream(
        upstream_tx,
        &UserAudioChunk {
            user_audio_chunk: audio_base_64,
        },
    )
    .await
}

/// Audio may only flow while the link is ready; anything else is dropped
/// with a warning and never surfaced to the client as an error.
async fn audio_gate(shared: &Shared) -> bool {
    match shared.lock().await.link() {
        LinkState::Ready => true,
        LinkState::Closing | LinkState::Closed => {
            // Shutdown race: the client kept talking while we were tearing down.
            warn!("Dropping audio frame received during teardown.");
            false
        }
        _ => {
            warn!("Dropping audio frame received before the upstream acknowledged initialization.");
            false
        }
    }
}

fn report_oversize(raw_bytes: usize, encoded_bytes: usize) {
    if let Some(report) = limits::inspect(raw_bytes, encoded_bytes) {
        warn!(
            raw_bytes = report.raw_bytes,
            encoded_bytes = report.encoded_bytes,
            "Oversized audio frame; forwarding anyway. Reduce the client capture buffer size."
        );
    }
}

/// Tells the client the upstream link is gone. At most one notification per
/// session, however many paths race to report it.
async fn notify_closed(shared: &Shared, client_tx: &ClientSink, code: u16, reason: &str) {
    let notify = {
        let mut state = shared.lock().await;
        state.begin_close();
        state.take_close_notification()
    };
    if notify {
        let mut sink = client_tx.lock().await;
        let _ = send_control(
            &mut sink,
            ServerMessage::ConnectionClosed {
                code,
                reason: reason.to_string(),
            },
        )
        .await;
    }
}

/// Serializes and sends one control message to the client.
pub(crate) async fn send_control(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    sink.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Forwards an upstream text frame to the client unchanged.
async fn relay_to_client(client_tx: &ClientSink, text: &str) -> Result<()> {
    client_tx
        .lock()
        .await
        .send(Message::Text(text.to_string().into()))
        .await
        .context("client socket write failed")
}

async fn send_upstream<T: Serialize>(upstream_tx: &UpstreamSink, event: &T) -> Result<()> {
    send_upstream_text(upstream_tx, serde_json::to_string(event)?).await
}

async fn send_upstream_text(upstream_tx: &UpstreamSink, text: String) -> Result<()> {
    upstream_tx
        .lock()
        .await
        .send(WsMessage::Text(text.into()))
        .await
        .context("upstream socket write failed")
}
