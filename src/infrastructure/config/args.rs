use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "imageloader",
    version,
    about = "Fetch images through a deduplicating in-memory cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Maximum images kept in memory (0 for unbounded).
    #[arg(long)]
    pub cache_size: Option<usize>,

    /// Maximum fetches running at once.
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,

    /// HTTP request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// User agent sent with HTTP requests.
    #[arg(long, env = "IMAGELOADER_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Request every URL this many times at once.
    #[arg(short, long, default_value_t = 1)]
    pub repeat: usize,

    /// Image URLs (`http`, `https` or `file`).
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,
}
