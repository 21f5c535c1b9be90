use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Sizing of the query session buffers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capture buffer size in bytes, requested at `open` (default: 4096).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Per-query output buffer used by the shell front end (default: 2048).
    #[serde(default = "default_output_size")]
    pub output_size: usize,
}

/// Documented engine defaults. Every session create/destroy restores these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host queried when no `host` command has been issued (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,
    /// Control port on the server (default: 123).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wait for the first response packet, in milliseconds (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Wait for each additional response fragment, in milliseconds (default: 3000).
    #[serde(default = "default_secondary_timeout_ms")]
    pub secondary_timeout_ms: u64,
    /// Authentication delay in milliseconds (default: 0).
    #[serde(default)]
    pub delay_ms: i64,
    /// NTP version claimed in request headers (default: 2).
    #[serde(default = "default_version")]
    pub version: u8,
    /// Show host names instead of numeric addresses (default: true).
    #[serde(default = "default_show_hostnames")]
    pub show_hostnames: bool,
    /// Print variable lists verbatim (default: false).
    #[serde(default)]
    pub raw: bool,
    /// Re-sends after a request times out with no reply (default: 1).
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }
}

fn default_capacity() -> usize {
    4096
}

fn default_output_size() -> usize {
    2048
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    123
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_secondary_timeout_ms() -> u64 {
    3000
}

fn default_version() -> u8 {
    2
}

fn default_show_hostnames() -> bool {
    true
}

fn default_retries() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            output_size: default_output_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            secondary_timeout_ms: default_secondary_timeout_ms(),
            delay_ms: 0,
            version: default_version(),
            show_hostnames: default_show_hostnames(),
            raw: false,
            retries: default_retries(),
        }
    }
}
