//! Interactive control loop for a running capture.
//!
//! rustyline blocks, so the loop runs on its own thread and forwards parsed
//! commands to the async side over a channel. Type `/help` for available
//! commands, Tab for completion.

use std::path::PathBuf;
use std::thread::JoinHandle;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use tokio::sync::{mpsc, oneshot};

use crate::capture::SessionStatus;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/rescan", "Scan the whole document now"),
    ("/scan", "Switch periodic scanning: /scan on | /scan off"),
    ("/status", "Show capture totals"),
    ("/help", "Show available commands"),
    ("/exit", "Stop capturing and quit"),
];

/// A request for the capture session.
#[derive(Debug)]
pub enum ReplCommand {
    Rescan,
    SetPeriodic(bool),
    Status(oneshot::Sender<SessionStatus>),
    Exit,
}

/// What one input line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Empty,
    Rescan,
    SetPeriodic(bool),
    Status,
    Help,
    Exit,
    Invalid(String),
}

/// Parse one input line. The leading `/` is optional.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Empty;
    }
    let input = line.strip_prefix('/').unwrap_or(line);
    let mut parts = input.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    let arg = parts.next();

    match (cmd, arg) {
        ("" | "help" | "h" | "?", _) => ParsedLine::Help,
        ("exit" | "quit" | "q", _) => ParsedLine::Exit,
        ("rescan", _) => ParsedLine::Rescan,
        ("status", _) => ParsedLine::Status,
        ("scan", Some("on")) => ParsedLine::SetPeriodic(true),
        ("scan", Some("off")) => ParsedLine::SetPeriodic(false),
        ("scan", _) => ParsedLine::Invalid("Usage: /scan on | /scan off".to_string()),
        (other, _) => ParsedLine::Invalid(format!(
            "Unknown command '/{other}'. Type /help for commands."
        )),
    }
}

/// REPL helper for tab completion.
#[derive(Default)]
struct CaptureHelper;

impl Completer for CaptureHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<10} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        if let Some(arg) = input.strip_prefix("/scan ") {
            let start = input.len() - arg.len();
            let matches = ["on", "off"]
                .iter()
                .filter(|opt| opt.starts_with(arg.trim()))
                .map(|opt| Pair {
                    display: opt.to_string(),
                    replacement: opt.to_string(),
                })
                .collect();
            return Ok((start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for CaptureHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for CaptureHelper {}
impl Validator for CaptureHelper {}
impl Helper for CaptureHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

fn history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blobtap_history")
}

/// Start the REPL thread. It sends `Exit` when the user quits or input ends.
pub fn spawn(commands: mpsc::UnboundedSender<ReplCommand>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("blobtap-repl".to_string())
        .spawn(move || {
            if let Err(e) = run(&commands) {
                eprintln!("  Error: {e}");
            }
            let _ = commands.send(ReplCommand::Exit);
        })
}

fn run(commands: &mpsc::UnboundedSender<ReplCommand>) -> anyhow::Result<()> {
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<CaptureHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(CaptureHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mblobtap>\x1b[0m ";

    loop {
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            // Ctrl+C inside the prompt means the same as outside it.
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        };

        let command = match parse_line(&line) {
            ParsedLine::Empty => continue,
            ParsedLine::Help => {
                cmd_help();
                continue;
            }
            ParsedLine::Invalid(message) => {
                eprintln!("  {message}");
                continue;
            }
            ParsedLine::Exit => break,
            ParsedLine::Rescan => ReplCommand::Rescan,
            ParsedLine::SetPeriodic(on) => ReplCommand::SetPeriodic(on),
            ParsedLine::Status => {
                let (reply, rx) = oneshot::channel();
                if commands.send(ReplCommand::Status(reply)).is_err() {
                    break;
                }
                match rx.blocking_recv() {
                    Ok(status) => print_status(&status),
                    Err(_) => break,
                }
                continue;
            }
        };

        if commands.send(command).is_err() {
            break;
        }
    }

    let _ = rl.save_history(&hist_path);
    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<12} {desc}");
    }
    eprintln!();
}

/// Print a status snapshot.
pub fn print_status(status: &SessionStatus) {
    let stats = &status.stats;
    eprintln!();
    eprintln!("  Target:      {}", status.target);
    eprintln!("  Output:      {}", status.output_dir.display());
    eprintln!(
        "  Periodic:    {} (every {} ms)",
        if status.periodic_scan { "on" } else { "off" },
        status.scan_interval_ms
    );
    eprintln!("  Saved:       {}", stats.persisted);
    eprintln!("  Duplicates:  {}", stats.duplicates);
    eprintln!("  Dropped:     {}", stats.dropped);
    eprintln!("  Ignored:     {}", stats.ignored);
    eprintln!(
        "  Identities:  {} inline, {} audio",
        stats.inline_identities, stats.audio_identities
    );
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("/rescan"), ParsedLine::Rescan);
        assert_eq!(parse_line("rescan"), ParsedLine::Rescan);
        assert_eq!(parse_line("  /scan on "), ParsedLine::SetPeriodic(true));
        assert_eq!(parse_line("/scan off"), ParsedLine::SetPeriodic(false));
        assert_eq!(parse_line("/status"), ParsedLine::Status);
        assert_eq!(parse_line("/exit"), ParsedLine::Exit);
        assert_eq!(parse_line("/quit"), ParsedLine::Exit);
        assert_eq!(parse_line("/"), ParsedLine::Help);
        assert_eq!(parse_line("/help"), ParsedLine::Help);
        assert_eq!(parse_line("   "), ParsedLine::Empty);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(parse_line("/scan"), ParsedLine::Invalid(_)));
        assert!(matches!(parse_line("/scan maybe"), ParsedLine::Invalid(_)));
        match parse_line("/save") {
            ParsedLine::Invalid(msg) => assert!(msg.contains("/save")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_every_listed_command_parses() {
        for (cmd, _) in COMMANDS {
            let line = if *cmd == "/scan" {
                "/scan on".to_string()
            } else {
                cmd.to_string()
            };
            assert!(!matches!(parse_line(&line), ParsedLine::Invalid(_)), "{cmd}");
        }
    }
}
