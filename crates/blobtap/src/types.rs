//! Core data types shared by the decoder, encoder, ledger, and dispatcher.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::AudioSampleSet;

/// The independent discovery mechanism that surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionChannel {
    /// Outbound request / inbound response URLs seen by the network layer.
    Transport,
    /// Wrapped page APIs (fetch, XHR, Web Audio construction points).
    Interception,
    /// Structural change listener on the document subtree.
    Mutation,
    /// Periodic or load-triggered walk over the entire document.
    Rescan,
}

impl std::fmt::Display for DetectionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Interception => write!(f, "interception"),
            Self::Mutation => write!(f, "mutation"),
            Self::Rescan => write!(f, "rescan"),
        }
    }
}

/// A value offered to the dispatcher by a detection channel, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    /// A string that may be an inline resource token.
    InlineToken(String),
    /// A sample buffer captured from the page's audio subsystem.
    Audio(AudioSampleSet),
    /// Anything the host delivered that has no known shape.
    Unrecognized(String),
}

/// Raw bytes plus declared media type, produced from a well-formed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResource {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Which identity scheme a persisted resource was deduplicated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Inline,
    Audio,
}

/// Record of one resource written to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFile {
    pub sequence_index: u64,
    /// Declared media type for inline resources, container format for audio.
    pub media_type: String,
    pub kind: ResourceKind,
    pub channel: DetectionChannel,
    pub path: PathBuf,
    pub size_bytes: usize,
}

/// Errors raised while turning a candidate into a stored file.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Audio shape violation: {0}")]
    ShapeViolation(String),

    #[error("Invalid packed samples: {0}")]
    InvalidSamples(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type CaptureResult<T> = Result<T, CaptureError>;
