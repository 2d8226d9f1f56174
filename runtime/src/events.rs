// Copyright 2026 Blobtap Contributors
// SPDX-License-Identifier: Apache-2.0

//! Blobtap Event Bus — typed events from every capture component.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`CaptureEvent`] values. Any consumer (console reporter, status line,
//! tests) can subscribe independently. When no subscribers exist, events
//! are silently dropped.

use blobtap::{DetectionChannel, ResourceKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event Blobtap emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaptureEvent {
    // ── Session Events ────────────────────
    /// A capture session attached to a page.
    SessionStarted {
        target: String,
        output_dir: String,
        timestamp: String,
    },
    /// The session shut down.
    SessionStopped { saved: u64, duplicates: u64 },
    /// The browser went away underneath the session.
    HostDisconnected,

    // ── Resource Events ───────────────────
    /// A new resource was written.
    ResourceSaved {
        sequence: u64,
        kind: ResourceKind,
        media_type: String,
        channel: DetectionChannel,
        path: String,
        size_bytes: usize,
        /// Page-side API that produced the resource, when a hook reported it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// A resource was reported again and skipped.
    DuplicateSkipped {
        kind: ResourceKind,
        channel: DetectionChannel,
    },
    /// A resource could not be decoded, encoded, or written.
    CandidateDropped {
        kind: ResourceKind,
        channel: DetectionChannel,
        reason: String,
    },

    // ── Scan Events ───────────────────────
    /// A full-document scan finished.
    ScanCompleted {
        trigger: String,
        tokens_found: usize,
        elapsed_ms: u64,
    },
    /// A full-document scan threw (e.g. mid-navigation).
    ScanFailed { trigger: String, error: String },
    /// Periodic scanning was switched on or off.
    PeriodicScanToggled { enabled: bool },

    // ── Instrumentation Events ────────────
    /// A page-side wrapper could not be installed.
    HookFailed { hook: String, message: String },
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: CaptureEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CaptureEvent::ResourceSaved {
            sequence: 3,
            kind: ResourceKind::Audio,
            media_type: "audio/wav".to_string(),
            channel: DetectionChannel::Interception,
            path: "captured/00003.wav".to_string(),
            size_bytes: 48,
            source: Some("decodeAudioData".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ResourceSaved\""));
        assert!(json.contains("\"channel\":\"interception\""));
        assert!(json.contains("\"kind\":\"audio\""));
        assert!(json.contains("\"source\":\"decodeAudioData\""));

        let parsed: CaptureEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            CaptureEvent::ResourceSaved {
                sequence, source, ..
            } => {
                assert_eq!(sequence, 3);
                assert_eq!(source.as_deref(), Some("decodeAudioData"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_saved_event_without_source() {
        let json = r#"{"type":"ResourceSaved","sequence":1,"kind":"inline","media_type":"image/png","channel":"rescan","path":"out/00001.png","size_bytes":8}"#;
        match serde_json::from_str::<CaptureEvent>(json).unwrap() {
            CaptureEvent::ResourceSaved { source, .. } => assert!(source.is_none()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(CaptureEvent::HostDisconnected);
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(CaptureEvent::PeriodicScanToggled { enabled: false });

        match rx.try_recv().unwrap() {
            CaptureEvent::PeriodicScanToggled { enabled } => assert!(!enabled),
            _ => panic!("wrong event"),
        }
    }
}
