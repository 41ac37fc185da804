//! dumbmux - a screen-style terminal multiplexer
//!
//! Runs up to ten shells, each on its own pseudoterminal, and shows one of
//! them at a time on a "dumb" virtual screen: printable ASCII, carriage
//! return, line feed, backspace, tab, form feed and bell. No escape sequences.
//!
//! # Quick Start
//!
//! ```text
//! dumbmux                  # Start with $SHELL
//! dumbmux -o mux.log       # Log to mux.log
//! dumbmux top -d 5         # First session runs `top -d 5`
//! ```
//!
//! # Keybindings (Ctrl+A prefix)
//!
//! | Key | Action |
//! |-----|--------|
//! | n | New session |
//! | 0-9 | Switch to session |
//! | k 0-9 | Kill session |
//! | s | Toggle split view |
//! | h | Help (Esc to leave) |
//! | q | Quit |

mod config;
mod core;
mod mux;
mod ui;

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::core::pty::CommandSpec;
use crate::mux::{Multiplexer, MuxOptions};
use crate::ui::{TerminalDisplay, TerminalKeyboard};

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct Args {
    /// Log file (replaces ~/.dumbmux/dumbmux.log)
    output: Option<PathBuf>,
    /// Shell for new sessions
    shell: Option<String>,
    /// Command and arguments for the first session
    command: Vec<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("dumbmux {}", VERSION);
}

fn print_help() {
    eprintln!("dumbmux {} - A screen-style terminal multiplexer", VERSION);
    eprintln!();
    eprintln!("Usage: dumbmux [OPTIONS] [COMMAND [ARGS...]]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <FILE>   Write the log to FILE");
    eprintln!("  -s, --shell <CMD>     Shell for new sessions");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("COMMAND runs in the first session instead of the shell.");
    eprintln!();
    eprintln!("Keybindings (Ctrl+A prefix, see prefix_key in the config):");
    eprintln!("  Ctrl+A, n             New session");
    eprintln!("  Ctrl+A, 0-9           Switch to session");
    eprintln!("  Ctrl+A, k, 0-9        Kill session");
    eprintln!("  Ctrl+A, s             Toggle split view");
    eprintln!("  Ctrl+A, h             Help screen (Esc to leave)");
    eprintln!("  Ctrl+A, Ctrl+A        Send Ctrl+A to the session");
    eprintln!("  Ctrl+A, q             Quit");
    eprintln!();
    eprintln!("Configuration: ~/.dumbmux/config.toml");
    eprintln!("Log level: log_level in the config, or DUMBMUX_LOG");
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                let file = args.get(i).ok_or("Missing log file argument")?;
                parsed.output = Some(PathBuf::from(file));
            }
            "-s" | "--shell" => {
                i += 1;
                let shell = args.get(i).ok_or("Missing shell argument")?;
                parsed.shell = Some(shell.clone());
            }
            "--" => {
                parsed.command = args[i + 1..].to_vec();
                break;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            _ => {
                // Everything from here on belongs to the command
                parsed.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Send tracing output to a file; the terminal belongs to the sessions
fn init_logging(path: Option<PathBuf>, level: &str) {
    let log_path = path.unwrap_or_else(|| PathBuf::from("dumbmux.log"));
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("DUMBMUX_LOG")
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args(env::args().skip(1).collect()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    // Command line overrides the config file
    let (mut config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    if let Some(shell) = &args.shell {
        config.shell = Some(shell.clone());
    }

    init_logging(
        args.output.clone().or_else(Config::default_log_path),
        &config.log_level,
    );
    info!("dumbmux {} starting", VERSION);
    if let Some(e) = config_error {
        warn!("{}; using defaults", e);
    }

    let options = MuxOptions::from_config(&config).context("invalid configuration")?;
    let initial = match args.command.split_first() {
        Some((program, rest)) => CommandSpec::with_args(program, rest.iter().cloned()),
        None => options.shell.clone(),
    };

    let mut display = TerminalDisplay::new().context("cannot determine terminal size")?;
    display.init().context("cannot initialize terminal")?;

    let mut mux = Multiplexer::new(display, TerminalKeyboard::new(), options);
    if let Err(e) = mux.open_session(&initial) {
        mux.shutdown();
        error!("failed to start {}: {}", initial.program, e);
        return Err(e).with_context(|| format!("failed to start {}", initial.program));
    }

    let result = mux.run();
    info!("dumbmux exiting");
    result.context("event loop failed")
}
