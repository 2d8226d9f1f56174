//! Blobtap — core capture engine: inline resource decoding, PCM-to-WAV
//! encoding, and exactly-once deduplication of resources found on live pages.

pub mod audio;
pub mod dispatcher;
pub mod ledger;
pub mod storage;
pub mod token;
pub mod types;
pub mod wav;

pub use audio::{AudioFingerprint, AudioSampleSet, FINGERPRINT_PREFIX};
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher};
pub use ledger::{Ledger, ResourceIdentity};
pub use storage::{DirectoryStore, ResourceStore};
pub use token::{extension_for, looks_like_token, InlineToken, FALLBACK_EXTENSION};
pub use types::*;
pub use wav::{encode_wav, sample_to_i16, WavLayout};
