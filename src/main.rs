mod calc;
mod config;
mod export;
mod extract;
mod ipc;
mod model;

use clap::Parser;
use log::{error, info};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::config::ResultdConfig;

/// Exam result sheet extractor and analytics sidecar. Speaks one JSON
/// request per line on stdin and answers one JSON line on stdout.
#[derive(Parser, Debug)]
#[command(name = "resultd", version)]
struct Cli {
    /// JSON configuration file (layout patterns, grading rules, report defaults)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match cli.config.as_deref() {
        Some(path) => match ResultdConfig::load(path) {
            Ok(c) => {
                info!("loaded config {}", path.display());
                c
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(2);
            }
        },
        None => ResultdConfig::default(),
    };
    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
