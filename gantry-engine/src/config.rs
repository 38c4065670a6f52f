//! Engine configuration
//!
//! Collects every tunable the engine reads (timeout, directories, domain)
//! into one struct passed at startup instead of ad-hoc env lookups at call
//! sites.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock deadline for one deployment, in minutes
    pub timeout_minutes: u64,

    /// Directory receiving one append-only log file per deployment
    pub logs_dir: PathBuf,

    /// Directory for transient composed-script files
    pub scratch_dir: PathBuf,

    /// Domain injected into scripts as the `DOMAIN` ambient value
    pub domain: String,
}

impl EngineConfig {
    /// Creates configuration from environment variables, falling back to
    /// defaults for anything unset
    ///
    /// Expected environment variables:
    /// - PIPELINE_TIMEOUT (minutes, default: 10)
    /// - LOGS_DIR (default: ./logs)
    /// - SCRATCH_DIR (default: ./scratch)
    /// - DOMAIN (default: localhost)
    pub fn from_env() -> Self {
        let timeout_minutes = std::env::var("PIPELINE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let logs_dir = std::env::var("LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let scratch_dir = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("scratch"));

        let domain = std::env::var("DOMAIN").unwrap_or_else(|_| "localhost".to_string());

        Self {
            timeout_minutes,
            logs_dir,
            scratch_dir,
            domain,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_minutes == 0 {
            anyhow::bail!("timeout_minutes must be greater than 0");
        }

        if self.logs_dir.as_os_str().is_empty() {
            anyhow::bail!("logs_dir cannot be empty");
        }

        if self.scratch_dir.as_os_str().is_empty() {
            anyhow::bail!("scratch_dir cannot be empty");
        }

        if self.domain.is_empty() {
            anyhow::bail!("domain cannot be empty");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 10,
            logs_dir: PathBuf::from("logs"),
            scratch_dir: PathBuf::from("scratch"),
            domain: "localhost".to_string(),
        }
    }
}
