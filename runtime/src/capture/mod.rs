// Copyright 2026 Blobtap Contributors
// SPDX-License-Identifier: Apache-2.0

//! Capture session: attaches every detection channel to one page context.
//!
//! ```text
//!   network events ──(transport)──┐
//!   page hooks ─────(binding)─────┼──▶ funnel ──▶ Dispatcher ──▶ output dir
//!   mutation observer ─(binding)──┤
//!   scanner ─────────(rescan)─────┘
//! ```
//!
//! The session owns the tasks; dropping it without [`CaptureSession::shutdown`]
//! leaves them running until the runtime stops.

pub mod binding;
pub mod dom;
pub mod funnel;
pub mod scanner;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use blobtap::{DetectionChannel, DirectoryStore, DispatchStats, Dispatcher};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::events::{now_timestamp, CaptureEvent, EventBus};
use crate::instrument::{compose_bootstrap, enabled_hooks, BINDING_NAME};
use crate::renderer::{HostEvent, RenderContext, Renderer};
use crate::target::NormalizedTarget;

use binding::{parse_binding_payload, BindingMessage};
use funnel::{spawn_funnel, FunnelHandle};
use scanner::{spawn_scanner, ScanTrigger, ScannerHandle};
use transport::transport_candidate;

/// Snapshot answered by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub target: String,
    pub output_dir: PathBuf,
    pub periodic_scan: bool,
    pub scan_interval_ms: u64,
    pub stats: DispatchStats,
}

/// A live capture against one page context.
pub struct CaptureSession {
    target: NormalizedTarget,
    config: EngineConfig,
    context: Arc<dyn RenderContext>,
    events: Arc<EventBus>,
    funnel: FunnelHandle,
    funnel_task: JoinHandle<DispatchStats>,
    scanner: ScannerHandle,
    scanner_task: JoinHandle<()>,
    pump_task: JoinHandle<()>,
}

impl CaptureSession {
    /// Open a context on `renderer` and attach to it.
    pub async fn start(
        renderer: &dyn Renderer,
        config: EngineConfig,
        target: NormalizedTarget,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let context = renderer
            .new_context()
            .await
            .context("failed to open a browser context")?;
        Self::attach(context, config, target, events).await
    }

    /// Wire every channel into `context`, then navigate to the target.
    ///
    /// Instrumentation is registered before navigation so it precedes every
    /// page script.
    pub async fn attach(
        context: Arc<dyn RenderContext>,
        config: EngineConfig,
        target: NormalizedTarget,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let store = DirectoryStore::new(&config.output_dir);
        let (funnel, funnel_task) = spawn_funnel(Dispatcher::new(store), events.clone());

        if let Err(e) = context.expose_binding(BINDING_NAME).await {
            warn!("page binding unavailable, interception and mutation channels inactive: {e:#}");
        }
        let hooks = enabled_hooks(&config.hooks);
        match context.add_init_script(&compose_bootstrap(&config.hooks)).await {
            Ok(()) => debug!(hooks = hooks.len(), "instrumentation registered"),
            Err(e) => warn!("failed to register instrumentation: {e:#}"),
        }

        let host_events = context
            .events()
            .await
            .context("failed to subscribe to host events")?;

        let (scanner, scanner_task) = spawn_scanner(
            context.clone(),
            funnel.clone(),
            events.clone(),
            Duration::from_millis(config.scan_interval_ms),
            config.periodic_scan,
        );
        let pump_task = tokio::spawn(pump(
            host_events,
            funnel.clone(),
            scanner.clone(),
            events.clone(),
        ));

        events.emit(CaptureEvent::SessionStarted {
            target: target.url.clone(),
            output_dir: config.output_dir.display().to_string(),
            timestamp: now_timestamp(),
        });

        if !target.exists {
            warn!(target = %target.url, "local target does not exist");
        }
        match context
            .navigate(&target.url, config.navigation_timeout_ms)
            .await
        {
            Ok(nav) => info!(
                url = %nav.final_url,
                load_time_ms = nav.load_time_ms,
                "navigation complete"
            ),
            // Capture continues on whatever the page managed to load.
            Err(e) => warn!(target = %target.url, "navigation failed: {e:#}"),
        }

        Ok(Self {
            target,
            config,
            context,
            events,
            funnel,
            funnel_task,
            scanner,
            scanner_task,
            pump_task,
        })
    }

    /// Queue an immediate full-document scan.
    pub fn rescan_now(&self) {
        self.scanner.rescan_now(ScanTrigger::Manual);
    }

    /// Switch periodic scanning on or off.
    pub fn set_periodic(&self, enabled: bool) {
        self.scanner.set_periodic(enabled);
    }

    pub async fn status(&self) -> SessionStatus {
        SessionStatus {
            target: self.target.url.clone(),
            output_dir: self.config.output_dir.clone(),
            periodic_scan: self.scanner.is_periodic(),
            scan_interval_ms: self.config.scan_interval_ms,
            stats: self.funnel.stats().await.unwrap_or_default(),
        }
    }

    /// Stop the channels, drain the funnel, and close the page context.
    pub async fn shutdown(self) -> Result<DispatchStats> {
        self.scanner.shutdown();
        if let Err(e) = self.scanner_task.await {
            warn!("scanner task ended abnormally: {e}");
        }

        self.pump_task.abort();
        let _ = self.pump_task.await;

        // Last handle: the funnel finishes queued work and returns.
        drop(self.funnel);
        let stats = self
            .funnel_task
            .await
            .context("funnel task ended abnormally")?;

        if let Err(e) = self.context.close().await {
            debug!("context close failed: {e:#}");
        }

        self.events.emit(CaptureEvent::SessionStopped {
            saved: stats.persisted,
            duplicates: stats.duplicates,
        });
        info!(
            saved = stats.persisted,
            duplicates = stats.duplicates,
            dropped = stats.dropped,
            "capture session stopped"
        );
        Ok(stats)
    }
}

/// Route host events to their channels until the host stream ends.
async fn pump(
    mut host_events: BoxStream<'static, HostEvent>,
    funnel: FunnelHandle,
    scanner: ScannerHandle,
    events: Arc<EventBus>,
) {
    while let Some(event) = host_events.next().await {
        match event {
            HostEvent::Request(_) | HostEvent::Response(_) => {
                if let Some(candidate) = transport_candidate(&event) {
                    funnel.submit(DetectionChannel::Transport, candidate);
                }
            }
            HostEvent::Binding { name, payload } if name == BINDING_NAME => {
                match parse_binding_payload(&payload) {
                    BindingMessage::Candidate {
                        channel,
                        candidate,
                        source,
                    } => {
                        funnel.submit_from(channel, candidate, source);
                    }
                    BindingMessage::HookFailed { hook, message } => {
                        warn!(%hook, "instrumentation hook not installed: {message}");
                        events.emit(CaptureEvent::HookFailed { hook, message });
                    }
                }
            }
            HostEvent::Binding { name, .. } => debug!(%name, "ignoring foreign binding call"),
            HostEvent::LoadCompleted => scanner.rescan_now(ScanTrigger::Load),
        }
    }
    debug!("host event stream ended");
}
