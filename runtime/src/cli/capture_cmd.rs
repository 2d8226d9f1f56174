//! `blobtap capture <target>`: launch Chromium, capture until told to stop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use blobtap::DispatchStats;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::capture::CaptureSession;
use crate::cli::repl::{self, ReplCommand};
use crate::config::{parse_interval, EngineConfig};
use crate::events::{CaptureEvent, EventBus};
use crate::renderer::chromium::{ChromiumRenderer, LaunchOptions};
use crate::renderer::Renderer;
use crate::target::normalize_target;

/// Command-line overrides for one capture run.
#[derive(Debug, Clone, Default)]
pub struct CaptureArgs {
    pub target: String,
    pub out_dir: Option<PathBuf>,
    pub scan_interval_ms: Option<String>,
    pub no_periodic: bool,
    pub headful: bool,
    pub config: Option<PathBuf>,
    pub chromium: Option<PathBuf>,
    pub no_hook: Vec<String>,
    pub no_repl: bool,
}

impl CaptureArgs {
    /// Layer these flags over the loaded configuration.
    pub fn apply(&self, config: &mut EngineConfig) -> Result<()> {
        if let Some(dir) = &self.out_dir {
            config.output_dir = dir.clone();
        }
        if let Some(raw) = &self.scan_interval_ms {
            config.scan_interval_ms = parse_interval("--scan-interval-ms", raw)?;
        }
        if self.no_periodic {
            config.periodic_scan = false;
        }
        if self.headful {
            config.headless = false;
        }
        if let Some(path) = &self.chromium {
            config.chromium_path = Some(path.clone());
        }
        for name in &self.no_hook {
            config.hooks.set(name, false)?;
        }
        Ok(())
    }
}

/// Why the capture loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    UserExit,
    Signal,
    HostDisconnected,
}

pub async fn run(args: CaptureArgs) -> Result<()> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    args.apply(&mut config)?;

    let target = normalize_target(&args.target)?;
    if !target.exists {
        eprintln!("  \x1b[33mwarning\x1b[0m: {} does not exist", args.target);
    }

    let renderer = ChromiumRenderer::launch(&LaunchOptions {
        chromium_path: config.chromium_path.clone(),
        headless: config.headless,
    })
    .await
    .context("failed to launch Chromium")?;
    let disconnected = renderer.disconnected();

    let events = Arc::new(EventBus::default());
    let reporter = tokio::spawn(report_events(events.subscribe()));

    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mblobtap v{}\x1b[0m \x1b[90mcapturing {}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        target.url
    );
    eprintln!("    Saving to {}", config.output_dir.display());
    eprintln!();

    let session = CaptureSession::start(&renderer, config, target, events.clone()).await?;

    let (repl_tx, mut repl_rx) = mpsc::unbounded_channel();
    if !args.no_repl {
        repl::spawn(repl_tx.clone()).context("failed to start interactive loop")?;
    }

    let reason = loop {
        tokio::select! {
            command = repl_rx.recv() => match command {
                Some(ReplCommand::Rescan) => session.rescan_now(),
                Some(ReplCommand::SetPeriodic(on)) => session.set_periodic(on),
                Some(ReplCommand::Status(reply)) => {
                    let _ = reply.send(session.status().await);
                }
                Some(ReplCommand::Exit) | None => break StopReason::UserExit,
            },
            _ = shutdown_signal() => break StopReason::Signal,
            _ = disconnected.notified() => break StopReason::HostDisconnected,
        }
    };
    info!(?reason, "stopping capture");
    if reason == StopReason::HostDisconnected {
        events.emit(CaptureEvent::HostDisconnected);
    }

    let stats = session.shutdown().await?;
    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    drop(events);
    let _ = reporter.await;

    print_summary(&stats);
    Ok(())
}

/// Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Print one line per saved resource and per noteworthy failure.
async fn report_events(mut rx: broadcast::Receiver<CaptureEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("console reporter skipped {n} events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            CaptureEvent::ResourceSaved {
                sequence,
                media_type,
                channel,
                path,
                size_bytes,
                ..
            } => eprintln!(
                "  \x1b[32m\u{2713}\x1b[0m #{sequence:05} {media_type:<18} {:>10} \x1b[90mvia {channel}\x1b[0m  {path}",
                format_size(size_bytes)
            ),
            CaptureEvent::CandidateDropped {
                kind,
                channel,
                reason,
            } => eprintln!("  \x1b[31m\u{2717}\x1b[0m dropped {kind:?} via {channel}: {reason}"),
            CaptureEvent::HookFailed { hook, message } => {
                eprintln!("  \x1b[33m!\x1b[0m hook {hook} unavailable: {message}")
            }
            CaptureEvent::PeriodicScanToggled { enabled } => eprintln!(
                "  \x1b[90mperiodic scanning {}\x1b[0m",
                if enabled { "on" } else { "off" }
            ),
            CaptureEvent::HostDisconnected => {
                eprintln!("  \x1b[33m!\x1b[0m browser disconnected")
            }
            _ => {}
        }
    }
}

fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn print_summary(stats: &DispatchStats) {
    eprintln!();
    eprintln!(
        "  \x1b[90m\u{2728}\x1b[0m Saved {} resource{} ({} duplicate{} skipped, {} dropped).",
        stats.persisted,
        if stats.persisted == 1 { "" } else { "s" },
        stats.duplicates,
        if stats.duplicates == 1 { "" } else { "s" },
        stats.dropped
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = CaptureArgs {
            target: "page.html".into(),
            out_dir: Some(PathBuf::from("/tmp/grab")),
            scan_interval_ms: Some("500".into()),
            no_periodic: true,
            headful: true,
            no_hook: vec!["xhr".into(), "offline-render".into()],
            ..Default::default()
        };
        let mut config = EngineConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/grab"));
        assert_eq!(config.scan_interval_ms, 500);
        assert!(!config.periodic_scan);
        assert!(!config.headless);
        assert!(!config.hooks.xhr);
        assert!(!config.hooks.offline_render);
        assert!(config.hooks.fetch);
    }

    #[test]
    fn test_bad_flags_rejected() {
        let mut config = EngineConfig::default();
        let bad_hook = CaptureArgs {
            no_hook: vec!["websocket".into()],
            ..Default::default()
        };
        assert!(bad_hook.apply(&mut config).is_err());

        let bad_interval = CaptureArgs {
            scan_interval_ms: Some("0".into()),
            ..Default::default()
        };
        assert!(bad_interval.apply(&mut config).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
