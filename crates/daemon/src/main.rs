// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! possyncd - The position sync daemon.
//!
//! Queues position records received on a Unix socket in the state
//! directory and relays them to the remote store.
//!
//! Usage:
//!   possyncd [--state-dir <path>] [--config <file>] [--base-url <url>]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use possyncd::config::{resolve_state_dir, Config};
use possyncd::{env, runner, DaemonPaths, Result};

#[derive(Parser)]
#[command(name = "possyncd", version)]
#[command(about = "Background agent that relays buffered positions to a remote key-value store")]
struct Args {
    /// State directory for the socket, PID, lock, log and queue files
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Remote store base URL (overrides the config file and POSSYNC_BASE_URL)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    verbose: bool,

    /// Log to stderr instead of <state-dir>/possyncd.log
    #[arg(long)]
    log_stderr: bool,
}

fn main() {
    let args = Args::parse();

    let state_dir = match resolve_state_dir(args.state_dir.clone()) {
        Ok(dir) => dir,
        Err(e) => exit_with(&e),
    };
    if let Err(e) = fs::create_dir_all(&state_dir) {
        eprintln!(
            "error: cannot create state directory {}: {}",
            state_dir.display(),
            e
        );
        std::process::exit(1);
    }
    let paths = DaemonPaths::new(&state_dir);

    setup_logging(&paths.log, args.verbose, args.log_stderr);

    let config = match load_config(&args, &paths) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    tracing::debug!("config: {:?}", config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => exit_with(&possyncd::Error::Io(e)),
    };

    let ready = || {
        // Parent processes wait for this line before connecting.
        println!("READY");
        let _ = std::io::stdout().flush();
    };
    if let Err(e) = runtime.block_on(runner::run(config, paths, ready)) {
        exit_with(&e);
    }
}

fn load_config(args: &Args, paths: &DaemonPaths) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&paths.config)?,
    };
    if let Some(url) = args.base_url.clone().or_else(env::base_url) {
        config.set_base_url(&url)?;
    }
    Ok(config)
}

fn exit_with(error: &possyncd::Error) -> ! {
    tracing::error!("{}", error);
    eprintln!("error: {}", error);
    std::process::exit(1);
}

fn setup_logging(log_path: &Path, verbose: bool, log_stderr: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = env::log_filter(default_level);

    let file = if log_stderr {
        None
    } else {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .ok()
    };

    // Try the log file first, fall back to stderr
    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
