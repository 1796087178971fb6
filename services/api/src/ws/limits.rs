//! Size ceilings for outbound audio frames.
//!
//! The upstream silently terminates the connection when a single audio
//! message is too large, so oversized frames are reported but never dropped
//! or truncated: cutting bytes out of a PCM stream corrupts the audio.
//! Frames near the ceiling indicate a misconfigured capture buffer on the
//! client, which is the actionable part of the diagnostic.

/// Raw PCM bytes per frame above which the upstream link becomes unreliable.
pub const MAX_RAW_AUDIO_BYTES: usize = 22 * 1024;

/// The same ceiling measured after base64 framing.
pub const MAX_ENCODED_AUDIO_BYTES: usize = 30 * 1024;

/// Diagnostic for one frame that exceeded a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizeReport {
    pub raw_bytes: usize,
    pub encoded_bytes: usize,
}

/// Checks one outbound audio payload against the ceilings.
///
/// Advisory only: the caller forwards the frame regardless and logs the
/// report.
pub fn inspect(raw_bytes: usize, encoded_bytes: usize) -> Option<OversizeReport> {
    if raw_bytes > MAX_RAW_AUDIO_BYTES || encoded_bytes > MAX_ENCODED_AUDIO_BYTES {
        Some(OversizeReport {
            raw_bytes,
            encoded_bytes,
        })
    } else {
        None
    }
}

/// Raw size of a base64 payload, computed without decoding it.
pub fn raw_len_of_encoded(encoded: &str) -> usize {
    let padding = encoded.bytes().rev().take_while(|&b| b == b'=').count();
    ((encoded.len() / 4) * 3).saturating_sub(padding.min(2))
}
