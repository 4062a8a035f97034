//! Synthetic log writer for demos.
//!
//! `loglens generate` appends random INFO/WARN/ERROR/CRITICAL lines to the
//! configured log file at a random cadence, so the tail pipeline has
//! something to ingest. Lines carry an ISO-8601 local timestamp, which
//! keeps them answerable by time phrases like "last hour".

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::app::shutdown_signal;
use crate::config::Config;
use crate::logfile;

const HOST: &str = "my-server";

const USERS: &[&str] = &["alice", "bob", "admin", "system"];

/// Level and message template. `{ip}`, `{user}`, `{mem}` and `{line}` are
/// filled in per line.
const TEMPLATES: &[(&str, &str)] = &[
    ("INFO", "Connection established from 192.168.1.{ip}"),
    ("INFO", "User {user} authenticated successfully."),
    ("WARN", "High memory usage detected: {mem}%"),
    ("ERROR", "Database connection timeout. Retrying..."),
    ("ERROR", "Payment gateway 502 Bad Gateway."),
    (
        "CRITICAL",
        "SERVICE CRASH: NullPointerException in module auth.py line {line}",
    ),
];

/// Pacing and length of a generator run.
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Stop after this many lines; `None` runs until Ctrl-C.
    pub count: Option<u64>,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl GenerateOptions {
    fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            bail!(
                "min delay ({:?}) must not exceed max delay ({:?})",
                self.min_delay,
                self.max_delay
            );
        }
        Ok(())
    }
}

/// One log line (without the trailing newline).
pub fn render_line<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Local>) -> String {
    let (level, template) = TEMPLATES
        .choose(rng)
        .copied()
        .unwrap_or(("INFO", "heartbeat"));
    let user = USERS.choose(rng).copied().unwrap_or("system");
    let message = template
        .replace("{ip}", &rng.gen_range(2..=255).to_string())
        .replace("{user}", user)
        .replace("{mem}", &rng.gen_range(80..=99).to_string())
        .replace("{line}", &rng.gen_range(10..=500).to_string());
    format!(
        "{} {} {}: {}",
        now.format("%Y-%m-%dT%H:%M:%S"),
        HOST,
        level,
        message
    )
}

fn next_delay<R: Rng + ?Sized>(rng: &mut R, options: &GenerateOptions) -> Duration {
    if options.min_delay == options.max_delay {
        return options.min_delay;
    }
    rng.gen_range(options.min_delay..=options.max_delay)
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .await
        .with_context(|| format!("Failed to write log file: {}", path.display()))?;
    Ok(())
}

/// Append generated lines to `path`, returning how many were written.
pub async fn generate_lines(path: &Path, options: &GenerateOptions) -> Result<u64> {
    options.validate()?;
    logfile::ensure_log_file(path)?;

    let mut written = 0u64;
    loop {
        if options.count.is_some_and(|n| written >= n) {
            break;
        }
        // ThreadRng is not Send; keep it out of the awaits.
        let (line, delay) = {
            let mut rng = rand::thread_rng();
            (render_line(&mut rng, Local::now()), next_delay(&mut rng, options))
        };
        append_line(path, &line).await?;
        written += 1;
        println!("Wrote: {}", line);

        if options.count.is_some_and(|n| written >= n) {
            break;
        }
        tokio::time::sleep(delay).await;
    }
    Ok(written)
}

pub async fn run_generate(config: &Config, options: GenerateOptions) -> Result<()> {
    let path = config.log.path.clone();
    println!("Writing synthetic logs to {} (Ctrl-C to stop)", path.display());

    let written = tokio::select! {
        result = generate_lines(&path, &options) => result?,
        _ = shutdown_signal() => {
            println!("Stopping log generator.");
            return Ok(());
        }
    };
    tracing::info!(lines = written, path = %path.display(), "log generator finished");
    println!("lines written: {}", written);
    Ok(())
}
