//! The dispatcher: one funnel from every detection channel to storage.
//!
//! Each candidate is identified, checked against the [`Ledger`], converted,
//! given the next sequence index, and written. The dispatcher is the only
//! component that mutates the ledger or touches storage.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::AudioSampleSet;
use crate::ledger::{Ledger, ResourceIdentity};
use crate::storage::ResourceStore;
use crate::token::InlineToken;
use crate::types::{Candidate, DetectionChannel, PersistedFile, ResourceKind};
use crate::wav::{encode_wav, WAV_EXTENSION, WAV_MEDIA_TYPE};

/// What happened to one candidate.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// First sight: the resource was written.
    Persisted(PersistedFile),
    /// The identity was already in the ledger.
    Duplicate(ResourceKind),
    /// Not a resource at all. Not an error.
    Ignored,
    /// A resource that could not be decoded, encoded, or written.
    Dropped { kind: ResourceKind, reason: String },
}

impl DispatchOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

/// Running totals, reported by status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub persisted: u64,
    pub duplicates: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub inline_identities: usize,
    pub audio_identities: usize,
}

/// Owns the ledger, the sequence counter, and the store.
pub struct Dispatcher<S: ResourceStore> {
    ledger: Ledger,
    next_sequence: u64,
    store: S,
    stats: DispatchStats,
}

impl<S: ResourceStore> Dispatcher<S> {
    /// Create a dispatcher with a fresh ledger. Sequence indices start at 1.
    pub fn new(store: S) -> Self {
        Self {
            ledger: Ledger::new(),
            next_sequence: 1,
            store,
            stats: DispatchStats::default(),
        }
    }

    /// Process one candidate and report whether a new file was written.
    pub fn handle_candidate(&mut self, channel: DetectionChannel, candidate: Candidate) -> bool {
        self.dispatch(channel, candidate).is_persisted()
    }

    /// Process one candidate and report the detailed outcome.
    pub fn dispatch(&mut self, channel: DetectionChannel, candidate: Candidate) -> DispatchOutcome {
        let outcome = match candidate {
            Candidate::InlineToken(text) => self.dispatch_inline(channel, &text),
            Candidate::Audio(set) => self.dispatch_audio(channel, &set),
            Candidate::Unrecognized(raw) => {
                debug!(%channel, len = raw.len(), "ignoring unrecognized candidate");
                DispatchOutcome::Ignored
            }
        };

        match &outcome {
            DispatchOutcome::Persisted(_) => self.stats.persisted += 1,
            DispatchOutcome::Duplicate(_) => self.stats.duplicates += 1,
            DispatchOutcome::Ignored => self.stats.ignored += 1,
            DispatchOutcome::Dropped { .. } => self.stats.dropped += 1,
        }
        outcome
    }

    fn dispatch_inline(&mut self, channel: DetectionChannel, text: &str) -> DispatchOutcome {
        let Some(token) = InlineToken::parse(text) else {
            return DispatchOutcome::Ignored;
        };

        // Gate before decoding so duplicates cost nothing.
        let identity = ResourceIdentity::Token {
            text: token.as_str().to_string(),
        };
        if !self.ledger.check_and_record(&identity) {
            debug!(%channel, media_type = token.media_type(), "duplicate inline token");
            return DispatchOutcome::Duplicate(ResourceKind::Inline);
        }

        let decoded = match token.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%channel, media_type = token.media_type(), "dropping inline token: {e}");
                return DispatchOutcome::Dropped {
                    kind: ResourceKind::Inline,
                    reason: e.to_string(),
                };
            }
        };

        self.write(
            channel,
            ResourceKind::Inline,
            decoded.media_type,
            token.extension(),
            &decoded.bytes,
        )
    }

    fn dispatch_audio(&mut self, channel: DetectionChannel, set: &AudioSampleSet) -> DispatchOutcome {
        if let Err(e) = set.validate() {
            warn!(%channel, "dropping audio buffer: {e}");
            return DispatchOutcome::Dropped {
                kind: ResourceKind::Audio,
                reason: e.to_string(),
            };
        }

        let identity = ResourceIdentity::Audio {
            fingerprint: set.fingerprint(),
        };
        if !self.ledger.check_and_record(&identity) {
            debug!(
                %channel,
                sample_rate = set.sample_rate,
                frames = set.frame_count,
                "duplicate audio buffer"
            );
            return DispatchOutcome::Duplicate(ResourceKind::Audio);
        }

        let wav = match encode_wav(set) {
            Ok(wav) => wav,
            Err(e) => {
                warn!(%channel, "dropping audio buffer: {e}");
                return DispatchOutcome::Dropped {
                    kind: ResourceKind::Audio,
                    reason: e.to_string(),
                };
            }
        };
        self.write(
            channel,
            ResourceKind::Audio,
            WAV_MEDIA_TYPE.to_string(),
            WAV_EXTENSION,
            &wav,
        )
    }

    fn write(
        &mut self,
        channel: DetectionChannel,
        kind: ResourceKind,
        media_type: String,
        extension: &str,
        bytes: &[u8],
    ) -> DispatchOutcome {
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;

        match self.store.persist(sequence_index, extension, bytes) {
            Ok(path) => {
                info!(
                    %channel,
                    sequence = sequence_index,
                    %media_type,
                    bytes = bytes.len(),
                    path = %path.display(),
                    "saved resource"
                );
                DispatchOutcome::Persisted(PersistedFile {
                    sequence_index,
                    media_type,
                    kind,
                    channel,
                    path,
                    size_bytes: bytes.len(),
                })
            }
            Err(e) => {
                warn!(%channel, sequence = sequence_index, "failed to write resource: {e}");
                DispatchOutcome::Dropped {
                    kind,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Current totals.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            inline_identities: self.ledger.token_count(),
            audio_identities: self.ledger.audio_count(),
            ..self.stats
        }
    }

    /// The sequence index the next new resource will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
