//! Command-line configuration and log setup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Duration as ChronoDuration;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use crate::api::{DEFAULT_CONCURRENCY, DEFAULT_MAX_PAGES};
use crate::range::MAX_WINDOW_DAYS;

/// Terminal dashboard for personal time-series data
#[derive(Parser, Debug, Clone)]
#[command(name = "lifelog-tui", version, about)]
pub struct Config {
    /// Maximum simultaneous HTTP requests across all lanes
    #[arg(long, env = "LIFELOG_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Give up on a query after following this many pages
    #[arg(long, env = "LIFELOG_MAX_PAGES", default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "LIFELOG_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Width of the initial window, ending now
    #[arg(long, default_value_t = 5)]
    pub window_days: u32,

    /// Directory for the rolling log file (default: $XDG_STATE_HOME/lifelog-tui)
    #[arg(long, env = "LIFELOG_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Only show these lanes, comma separated, in this order
    #[arg(long, env = "LIFELOG_LANES", value_delimiter = ',')]
    pub lanes: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        if self.max_pages == 0 {
            bail!("--max-pages must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("--timeout-secs must be at least 1");
        }
        if self.window_days == 0 {
            bail!("--window-days must be at least 1");
        }
        if i64::from(self.window_days) > MAX_WINDOW_DAYS {
            bail!("--window-days must be at most {MAX_WINDOW_DAYS}");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn window(&self) -> ChronoDuration {
        ChronoDuration::days(i64::from(self.window_days))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }
}

fn default_log_dir() -> PathBuf {
    let state_home = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .unwrap_or_else(std::env::temp_dir);
    state_home.join("lifelog-tui")
}

/// Route `tracing` output to a daily rolling file; the terminal belongs to the UI.
///
/// The returned guard flushes the writer on drop and must live until exit.
pub fn init_logging(log_dir: &std::path::Path) -> Result<WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "lifelog-tui.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Log file: {}/lifelog-tui.log", log_dir.display());
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("lifelog-tui").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.window(), ChronoDuration::days(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lanes_are_comma_separated() {
        let config = parse(&["--lanes", "Steps,Heart rate,Read"]);
        assert_eq!(config.lanes, vec!["Steps", "Heart rate", "Read"]);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = parse(&["--concurrency", "0"]).validate().unwrap_err();
        assert!(err.to_string().contains("--concurrency"));
        assert!(parse(&["--max-pages", "0"]).validate().is_err());
        assert!(parse(&["--window-days", "0"]).validate().is_err());
        assert!(parse(&["--window-days", "4000000000"]).validate().is_err());
        assert!(parse(&["--window-days", "18300"]).validate().is_ok());
    }

    #[test]
    fn test_explicit_log_dir_wins() {
        let config = parse(&["--log-dir", "/tmp/lifelog-logs"]);
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/lifelog-logs"));
    }
}
