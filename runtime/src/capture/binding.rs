//! Messages page-side instrumentation delivers through the binding.
//!
//! Payloads arrive as untrusted JSON strings and are validated here into a
//! tagged message before anything else touches them.

use blobtap::{AudioSampleSet, Candidate, DetectionChannel};
use serde::Deserialize;
use tracing::warn;

/// Wire shape of a binding payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum PagePayload {
    Inline {
        #[serde(default = "default_channel")]
        channel: DetectionChannel,
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        #[serde(default = "default_channel")]
        channel: DetectionChannel,
        #[serde(default)]
        source: Option<String>,
        sample_rate: u32,
        frame_count: usize,
        channel_count: usize,
        channels: Vec<String>,
    },
    HookError {
        hook: String,
        #[serde(default)]
        message: String,
    },
}

fn default_channel() -> DetectionChannel {
    DetectionChannel::Interception
}

/// A validated binding message.
#[derive(Debug)]
pub enum BindingMessage {
    /// Something for the dispatcher.
    Candidate {
        channel: DetectionChannel,
        candidate: Candidate,
        /// Which audio hook produced it, when known.
        source: Option<String>,
    },
    /// A page-side wrapper could not be installed.
    HookFailed { hook: String, message: String },
}

/// Parse one binding payload.
///
/// Anything that is not a known message becomes an `Unrecognized` candidate,
/// so the dispatcher still accounts for it.
pub fn parse_binding_payload(payload: &str) -> BindingMessage {
    let parsed: PagePayload = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(_) => {
            return BindingMessage::Candidate {
                channel: DetectionChannel::Interception,
                candidate: Candidate::Unrecognized(payload.to_string()),
                source: None,
            }
        }
    };

    match parsed {
        PagePayload::Inline { channel, token } => BindingMessage::Candidate {
            channel,
            candidate: Candidate::InlineToken(token),
            source: None,
        },
        PagePayload::Audio {
            channel,
            source,
            sample_rate,
            frame_count,
            channel_count,
            channels,
        } => {
            let candidate =
                match AudioSampleSet::from_packed(sample_rate, frame_count, channel_count, &channels)
                {
                    Ok(set) => Candidate::Audio(set),
                    Err(e) => {
                        warn!(source = source.as_deref().unwrap_or("unknown"), "malformed audio payload: {e}");
                        Candidate::Unrecognized(format!("audio payload: {e}"))
                    }
                };
            BindingMessage::Candidate {
                channel,
                candidate,
                source,
            }
        }
        PagePayload::HookError { hook, message } => BindingMessage::HookFailed { hook, message },
    }
}
