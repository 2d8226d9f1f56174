//! Full-document re-scan: on demand, on page load, and on a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use blobtap::{Candidate, DetectionChannel};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::dom::parse_scan_result;
use super::funnel::FunnelHandle;
use crate::events::{CaptureEvent, EventBus};
use crate::instrument::scripts::DOCUMENT_SCAN;
use crate::renderer::RenderContext;

/// Why a scan ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    Periodic,
    Load,
    Manual,
}

impl std::fmt::Display for ScanTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Periodic => write!(f, "periodic"),
            Self::Load => write!(f, "load"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

enum ScannerCommand {
    RescanNow(ScanTrigger),
    SetEnabled(bool),
    Shutdown,
}

/// Controls a running scanner task.
#[derive(Clone)]
pub struct ScannerHandle {
    tx: mpsc::UnboundedSender<ScannerCommand>,
    enabled: Arc<AtomicBool>,
}

impl ScannerHandle {
    /// Run a scan as soon as the current one (if any) finishes.
    pub fn rescan_now(&self, trigger: ScanTrigger) {
        let _ = self.tx.send(ScannerCommand::RescanNow(trigger));
    }

    /// Switch periodic scanning. In-flight scans are unaffected.
    pub fn set_periodic(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            let _ = self.tx.send(ScannerCommand::SetEnabled(enabled));
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ScannerCommand::Shutdown);
    }
}

/// Evaluate the document walk once and hand every token to the funnel.
///
/// Returns the number of tokens found, repeats included. The funnel decides
/// which of them are new.
pub async fn scan_document(context: &dyn RenderContext, funnel: &FunnelHandle) -> Result<usize> {
    let raw = context.execute_js(DOCUMENT_SCAN).await?;
    let report = parse_scan_result(&raw)?;
    debug!(
        elements = report.elements,
        tokens = report.tokens.len(),
        "document scanned"
    );
    let found = report.tokens.len();
    for token in report.tokens {
        funnel.submit(DetectionChannel::Rescan, Candidate::InlineToken(token));
    }
    Ok(found)
}

/// Start the scanner task.
pub fn spawn_scanner(
    context: Arc<dyn RenderContext>,
    funnel: FunnelHandle,
    events: Arc<EventBus>,
    interval: Duration,
    periodic: bool,
) -> (ScannerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let enabled = Arc::new(AtomicBool::new(periodic));
    let handle = ScannerHandle {
        tx,
        enabled: enabled.clone(),
    };
    let task = tokio::spawn(run(context, funnel, events, interval, enabled, rx));
    (handle, task)
}

async fn run(
    context: Arc<dyn RenderContext>,
    funnel: FunnelHandle,
    events: Arc<EventBus>,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    mut rx: mpsc::UnboundedReceiver<ScannerCommand>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; periodic scans start one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                None | Some(ScannerCommand::Shutdown) => break,
                Some(ScannerCommand::RescanNow(trigger)) => {
                    run_scan(context.as_ref(), &funnel, &events, trigger).await;
                }
                Some(ScannerCommand::SetEnabled(on)) => {
                    if on {
                        ticker.reset();
                    }
                    events.emit(CaptureEvent::PeriodicScanToggled { enabled: on });
                }
            },
            _ = ticker.tick(), if enabled.load(Ordering::SeqCst) => {
                run_scan(context.as_ref(), &funnel, &events, ScanTrigger::Periodic).await;
            }
        }
    }
    debug!("scanner stopped");
}

async fn run_scan(
    context: &dyn RenderContext,
    funnel: &FunnelHandle,
    events: &EventBus,
    trigger: ScanTrigger,
) {
    let started = Instant::now();
    match scan_document(context, funnel).await {
        Ok(found) => events.emit(CaptureEvent::ScanCompleted {
            trigger: trigger.to_string(),
            tokens_found: found,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
        Err(e) => {
            // Expected while the page is navigating; the next scan retries.
            warn!(%trigger, "document scan failed: {e:#}");
            events.emit(CaptureEvent::ScanFailed {
                trigger: trigger.to_string(),
                error: format!("{e:#}"),
            });
        }
    }
}
