//! Outbound connection to the conversational-AI realtime endpoint.
//!
//! The connector first asks the HTTP API for a short-lived signed WebSocket
//! URL. That call failing is recoverable: the public endpoint also accepts
//! the API key as a request header, so we fall back to it with a warning.
//! Only the WebSocket handshake itself is fatal.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::client::IntoClientRequest,
};
use tracing::{info, warn};

/// An established realtime connection to the upstream agent endpoint.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for one upstream dial.
#[derive(Debug, Clone)]
pub struct ConvaiConfig {
    /// Base URL of the plain HTTP API, e.g. `https://api.elevenlabs.io`.
    pub http_base: String,
    /// Public realtime endpoint, used when no signed URL could be obtained.
    pub ws_url: String,
    pub api_key: String,
    pub agent_id: String,
    pub connect_timeout: Duration,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// Asks the credential provider for a short-lived signed connection URL.
async fn fetch_signed_url(http: &reqwest::Client, cfg: &ConvaiConfig) -> Result<String> {
    let endpoint = format!(
        "{}/v1/convai/conversation/get-signed-url?agent_id={}",
        cfg.http_base.trim_end_matches('/'),
        cfg.agent_id
    );
    let response = http
        .get(&endpoint)
        .header("xi-api-key", &cfg.api_key)
        .timeout(cfg.connect_timeout)
        .send()
        .await
        .context("signed-url request failed")?
        .error_for_status()
        .context("signed-url request rejected")?;
    let body: SignedUrlResponse = response
        .json()
        .await
        .context("signed-url response body was malformed")?;
    Ok(body.signed_url)
}

/// Dials the upstream realtime endpoint.
///
/// A signed URL is a capability in itself and needs no extra header; on the
/// fallback path the API key is attached as `xi-api-key` before the
/// handshake. Exactly one dial is attempted; retry policy belongs to the
/// caller.
pub async fn connect(http: &reqwest::Client, cfg: &ConvaiConfig) -> Result<UpstreamSocket> {
    let request = match fetch_signed_url(http, cfg).await {
        Ok(signed_url) => {
            info!("Obtained signed upstream URL.");
            signed_url
                .into_client_request()
                .context("signed URL is not a valid WebSocket URL")?
        }
        Err(e) => {
            warn!(error = ?e, "Signed-URL acquisition failed. Falling back to the public endpoint.");
            let url = format!("{}?agent_id={}", cfg.ws_url, cfg.agent_id);
            let mut request = url
                .into_client_request()
                .context("upstream URL is not a valid WebSocket URL")?;
            request.headers_mut().insert(
                "xi-api-key",
                cfg.api_key
                    .parse()
                    .context("API key is not a valid header value")?,
            );
            request
        }
    };

    let (socket, _response) = tokio::time::timeout(cfg.connect_timeout, connect_async(request))
        .await
        .map_err(|_| anyhow!("upstream connect timed out"))?
        .context("upstream WebSocket handshake failed")?;
    Ok(socket)
}
