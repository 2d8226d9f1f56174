//! The funnel: every detection channel hands candidates to a single task
//! that owns the [`Dispatcher`].
//!
//! Channels only hold a cloneable [`FunnelHandle`]. Because one task drains
//! one queue, identity checks, sequence assignment, and writes never
//! interleave, however many channels report the same resource at once.
//!
//! Decoding, WAV encoding, and file writes are blocking work, so each
//! dispatch runs on the blocking pool. The dispatcher moves there and back,
//! which keeps dispatches strictly one at a time.

use std::sync::Arc;

use blobtap::{
    Candidate, DetectionChannel, DispatchOutcome, DispatchStats, Dispatcher, ResourceStore,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::events::{CaptureEvent, EventBus};

enum FunnelMessage {
    Submit {
        channel: DetectionChannel,
        candidate: Candidate,
        source: Option<String>,
        reply: Option<oneshot::Sender<bool>>,
    },
    Stats(oneshot::Sender<DispatchStats>),
}

/// Cloneable entry point into the funnel.
#[derive(Clone)]
pub struct FunnelHandle {
    tx: mpsc::UnboundedSender<FunnelMessage>,
}

impl FunnelHandle {
    /// Queue a candidate without waiting. Returns false once the funnel has
    /// shut down.
    pub fn submit(&self, channel: DetectionChannel, candidate: Candidate) -> bool {
        self.submit_from(channel, candidate, None)
    }

    /// Like [`submit`](Self::submit), tagging the candidate with the page
    /// API that reported it.
    pub fn submit_from(
        &self,
        channel: DetectionChannel,
        candidate: Candidate,
        source: Option<String>,
    ) -> bool {
        self.tx
            .send(FunnelMessage::Submit {
                channel,
                candidate,
                source,
                reply: None,
            })
            .is_ok()
    }

    /// Queue a candidate and wait for its verdict: true iff a new file was
    /// written.
    pub async fn submit_and_wait(&self, channel: DetectionChannel, candidate: Candidate) -> bool {
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(FunnelMessage::Submit {
            channel,
            candidate,
            source: None,
            reply: Some(reply),
        });
        if sent.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Current totals. `None` once the funnel has shut down.
    pub async fn stats(&self) -> Option<DispatchStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(FunnelMessage::Stats(reply)).ok()?;
        rx.await.ok()
    }
}

/// Start the funnel task.
///
/// The task ends when every handle is dropped and returns the final totals.
pub fn spawn_funnel<S>(
    dispatcher: Dispatcher<S>,
    events: Arc<EventBus>,
) -> (FunnelHandle, JoinHandle<DispatchStats>)
where
    S: ResourceStore + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(dispatcher, rx, events));
    (FunnelHandle { tx }, task)
}

async fn run<S: ResourceStore + 'static>(
    mut dispatcher: Dispatcher<S>,
    mut rx: mpsc::UnboundedReceiver<FunnelMessage>,
    events: Arc<EventBus>,
) -> DispatchStats {
    let mut last_stats = dispatcher.stats();
    while let Some(message) = rx.recv().await {
        match message {
            FunnelMessage::Submit {
                channel,
                candidate,
                source,
                reply,
            } => {
                let job = tokio::task::spawn_blocking(move || {
                    let outcome = dispatcher.dispatch(channel, candidate);
                    (dispatcher, outcome)
                });
                let outcome = match job.await {
                    Ok((returned, outcome)) => {
                        dispatcher = returned;
                        outcome
                    }
                    Err(e) => {
                        error!(%channel, "dispatch aborted, funnel stopping: {e}");
                        return last_stats;
                    }
                };
                last_stats = dispatcher.stats();
                let persisted = outcome.is_persisted();
                debug!(
                    %channel,
                    source = source.as_deref().unwrap_or("none"),
                    persisted,
                    "candidate dispatched"
                );
                report(&events, channel, source, outcome);
                if let Some(reply) = reply {
                    let _ = reply.send(persisted);
                }
            }
            FunnelMessage::Stats(reply) => {
                let _ = reply.send(dispatcher.stats());
            }
        }
    }
    debug!("funnel drained");
    dispatcher.stats()
}

fn report(
    events: &EventBus,
    channel: DetectionChannel,
    source: Option<String>,
    outcome: DispatchOutcome,
) {
    let event = match outcome {
        DispatchOutcome::Persisted(file) => CaptureEvent::ResourceSaved {
            sequence: file.sequence_index,
            kind: file.kind,
            media_type: file.media_type,
            channel,
            path: file.path.display().to_string(),
            size_bytes: file.size_bytes,
            source,
        },
        DispatchOutcome::Duplicate(kind) => CaptureEvent::DuplicateSkipped { kind, channel },
        DispatchOutcome::Dropped { kind, reason } => CaptureEvent::CandidateDropped {
            kind,
            channel,
            reason,
        },
        DispatchOutcome::Ignored => return,
    };
    events.emit(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobtap::{AudioSampleSet, DirectoryStore};

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[tokio::test]
    async fn test_first_submit_persists_second_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let (funnel, task) = spawn_funnel(Dispatcher::new(DirectoryStore::new(dir.path())), events);

        assert!(
            funnel
                .submit_and_wait(DetectionChannel::Transport, Candidate::InlineToken(PNG.into()))
                .await
        );
        assert!(
            !funnel
                .submit_and_wait(DetectionChannel::Rescan, Candidate::InlineToken(PNG.into()))
                .await
        );

        match rx.recv().await.unwrap() {
            CaptureEvent::ResourceSaved {
                sequence, channel, ..
            } => {
                assert_eq!(sequence, 1);
                assert_eq!(channel, DetectionChannel::Transport);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            CaptureEvent::DuplicateSkipped {
                channel: DetectionChannel::Rescan,
                ..
            }
        ));

        drop(funnel);
        let stats = task.await.unwrap();
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn test_fire_and_forget_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let (funnel, task) = spawn_funnel(
            Dispatcher::new(DirectoryStore::new(dir.path())),
            Arc::new(EventBus::default()),
        );

        for _ in 0..5 {
            assert!(funnel.submit(DetectionChannel::Mutation, Candidate::InlineToken(PNG.into())));
        }
        assert!(funnel.submit(
            DetectionChannel::Mutation,
            Candidate::Unrecognized("{}".into())
        ));

        let stats = funnel.stats().await.unwrap();
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.duplicates, 4);
        assert_eq!(stats.ignored, 1);

        drop(funnel);
        task.await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_source_reaches_saved_event() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let (funnel, task) = spawn_funnel(Dispatcher::new(DirectoryStore::new(dir.path())), events);

        assert!(funnel.submit_from(
            DetectionChannel::Interception,
            Candidate::InlineToken(PNG.into()),
            Some("fetch".into()),
        ));
        match rx.recv().await.unwrap() {
            CaptureEvent::ResourceSaved { source, .. } => {
                assert_eq!(source.as_deref(), Some("fetch"));
            }
            other => panic!("unexpected {other:?}"),
        }

        drop(funnel);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_keeps_running_after_unencodable_audio() {
        let dir = tempfile::tempdir().unwrap();
        let (funnel, task) = spawn_funnel(
            Dispatcher::new(DirectoryStore::new(dir.path())),
            Arc::new(EventBus::default()),
        );

        let too_fast = AudioSampleSet::new(3_000_000_000, vec![vec![0.5]]);
        let too_wide = AudioSampleSet::new(44100, vec![Vec::new(); 40_000]);
        assert!(
            !funnel
                .submit_and_wait(DetectionChannel::Interception, Candidate::Audio(too_fast))
                .await
        );
        assert!(
            !funnel
                .submit_and_wait(DetectionChannel::Interception, Candidate::Audio(too_wide))
                .await
        );
        assert!(
            funnel
                .submit_and_wait(DetectionChannel::Rescan, Candidate::InlineToken(PNG.into()))
                .await
        );

        drop(funnel);
        let stats = task.await.unwrap();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.persisted, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_drop_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let (funnel, _task) = spawn_funnel(Dispatcher::new(DirectoryStore::new(dir.path())), events);

        assert!(
            !funnel
                .submit_and_wait(
                    DetectionChannel::Interception,
                    Candidate::InlineToken("data:image/png;base64,@@@@".into()),
                )
                .await
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            CaptureEvent::CandidateDropped { .. }
        ));
    }
}
