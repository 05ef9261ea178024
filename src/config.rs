use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::ToolKind;

/// Testlab execution engine — runs test-case automation scripts and
/// serves folder-tree and dashboard rollups.
#[derive(Parser, Debug, Clone)]
#[command(name = "testlab-engine")]
pub struct CliArgs {
    /// Directory holding the sqlite database
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: PathBuf,

    /// Root directory relative script paths are resolved against
    #[arg(short = 's', long = "scripts-dir")]
    pub scripts_dir: PathBuf,

    /// Engine HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_ENGINE_PORT)]
    pub port: u16,

    /// k6 wall-clock timeout in seconds (load tests run long)
    #[arg(long = "k6-timeout-secs", default_value_t = K6_TIMEOUT_SECS)]
    pub k6_timeout_secs: u64,

    /// Browser-automation wall-clock timeout in seconds
    #[arg(long = "browser-timeout-secs", default_value_t = BROWSER_TIMEOUT_SECS)]
    pub browser_timeout_secs: u64,

    /// Disable the placeholder dashboard distribution for environments
    /// with no recorded statuses
    #[arg(long = "no-synthetic-fallback")]
    pub no_synthetic_fallback: bool,

    /// k6 binary
    #[arg(long = "k6-bin", default_value = "k6")]
    pub k6_bin: PathBuf,

    /// Playwright launcher (invoked as `<bin> playwright test ...`)
    #[arg(long = "playwright-bin", default_value = "npx")]
    pub playwright_bin: PathBuf,

    /// Python interpreter for selenium scripts
    #[arg(long = "python-bin", default_value = "python3")]
    pub python_bin: PathBuf,
}

/// Explicit configuration handed to the dispatcher and aggregator at
/// construction time. No ambient environment lookups inside business logic.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub port: u16,
    pub k6_timeout: Duration,
    pub browser_timeout: Duration,
    pub synthetic_fallback: bool,
    pub k6_bin: PathBuf,
    pub playwright_bin: PathBuf,
    pub python_bin: PathBuf,
}

pub const DEFAULT_ENGINE_PORT: u16 = 9840;

// Timeout constants. k6 load tests get the original 30-minute ceiling;
// browser automation gets 5 minutes.
pub const K6_TIMEOUT_SECS: u64 = 1800;
pub const BROWSER_TIMEOUT_SECS: u64 = 300;

// Grace period between TERM on the process group and the final KILL.
pub const GRACEFUL_KILL_TIMEOUT_SECS: u64 = 5;

// Capture caps. stdout/stderr buffers are bounded; error_message carries
// only a stderr excerpt.
pub const CAPTURE_BUFFER_MAX: usize = 256 * 1024;
pub const STDERR_EXCERPT_MAX: usize = 4 * 1024;

impl EngineConfig {
    pub fn from_args(args: CliArgs) -> Self {
        EngineConfig {
            data_dir: args.data_dir,
            scripts_dir: args.scripts_dir,
            port: args.port,
            k6_timeout: Duration::from_secs(args.k6_timeout_secs),
            browser_timeout: Duration::from_secs(args.browser_timeout_secs),
            synthetic_fallback: !args.no_synthetic_fallback,
            k6_bin: args.k6_bin,
            playwright_bin: args.playwright_bin,
            python_bin: args.python_bin,
        }
    }

    /// Wall-clock ceiling for one execution of the given tool.
    pub fn timeout_for(&self, kind: ToolKind) -> Duration {
        match kind {
            ToolKind::K6 => self.k6_timeout,
            ToolKind::Playwright | ToolKind::Selenium => self.browser_timeout,
        }
    }
}
