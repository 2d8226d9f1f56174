// Copyright 2026 Blobtap Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use blobtap_runtime::cli::capture_cmd::{self, CaptureArgs};

#[derive(Parser)]
#[command(
    name = "blobtap",
    about = "Blobtap — save every inline resource and Web Audio buffer a live page produces",
    version,
    after_help = "Run 'blobtap <command> --help' for details on each command."
)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a page and capture until told to stop
    Capture {
        /// Web address or local HTML file
        target: String,
        /// Directory saved resources are written into
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Interval between periodic full-document scans
        #[arg(long)]
        scan_interval_ms: Option<String>,
        /// Start with periodic scanning switched off
        #[arg(long)]
        no_periodic: bool,
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Config file (default: $BLOBTAP_CONFIG, then ./blobtap.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Chromium executable to use
        #[arg(long)]
        chromium: Option<PathBuf>,
        /// Skip one interception hook (e.g. "xhr"). Can be repeated.
        #[arg(long = "no-hook", value_name = "NAME")]
        no_hook: Vec<String>,
        /// Run without the interactive prompt; stop with Ctrl-C
        #[arg(long)]
        no_repl: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Capture {
            target,
            out_dir,
            scan_interval_ms,
            no_periodic,
            headful,
            config,
            chromium,
            no_hook,
            no_repl,
        } => {
            init_tracing(&cli.log_level, cli.log_json);
            capture_cmd::run(CaptureArgs {
                target,
                out_dir,
                scan_interval_ms,
                no_periodic,
                headful,
                config,
                chromium,
                no_hook,
                no_repl,
            })
            .await
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "blobtap",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
