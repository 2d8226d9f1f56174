//! Identity ledger: the single gate that makes persistence exactly-once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFingerprint;

/// How a resource is identified for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ResourceIdentity {
    /// The verbatim inline token text.
    Token { text: String },
    /// Shape plus prefix hash of an audio buffer.
    Audio { fingerprint: AudioFingerprint },
}

/// Append-only record of every identity seen during one run.
///
/// The two schemes are kept in separate sets; entries are never removed.
#[derive(Debug, Default)]
pub struct Ledger {
    tokens: HashSet<String>,
    audio: HashSet<AudioFingerprint>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity` and return `true` the first time it is seen;
    /// return `false` without recording anything on every later call.
    pub fn check_and_record(&mut self, identity: &ResourceIdentity) -> bool {
        match identity {
            ResourceIdentity::Token { text } => self.check_and_record_token(text),
            ResourceIdentity::Audio { fingerprint } => self.check_and_record_audio(*fingerprint),
        }
    }

    /// Avoids cloning when the token is already known.
    fn check_and_record_token(&mut self, text: &str) -> bool {
        if self.tokens.contains(text) {
            return false;
        }
        self.tokens.insert(text.to_string())
    }

    fn check_and_record_audio(&mut self, fingerprint: AudioFingerprint) -> bool {
        self.audio.insert(fingerprint)
    }

    /// Number of distinct inline tokens recorded.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of distinct audio fingerprints recorded.
    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }
}
