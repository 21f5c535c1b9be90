//! Engine-wide state and its documented defaults.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config::EngineConfig;

/// Address family preference for host resolution and peer listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    V4,
    V6,
}

impl AddressFamily {
    pub fn admits(self, ip: &IpAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::V4 => ip.is_ipv4(),
            AddressFamily::V6 => ip.is_ipv6(),
        }
    }
}

/// The server currently being queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Name as given by the user.
    pub name: String,
    pub addr: SocketAddr,
}

/// One cached association from a `READSTAT` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub assid: u16,
    pub status: u16,
}

/// Everything the engine remembers between commands.
///
/// A session resets this on create and on destroy so no setting outlives the
/// session that made it.
///
/// `delay_ms`, `always_auth` and `key_id` are recorded settings only: they
/// are printed and reset but requests are never signed with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineGlobals {
    pub host: Option<HostEntry>,
    pub sequence: u16,
    /// Wait for the first fragment of a response.
    pub timeout: Duration,
    /// Wait for each fragment after the first.
    pub secondary_timeout: Duration,
    /// Authentication delay, milliseconds. Not applied to requests.
    pub delay_ms: i64,
    pub version: u8,
    pub always_auth: bool,
    pub key_id: Option<u32>,
    pub raw: bool,
    pub show_hostnames: bool,
    pub family: AddressFamily,
    pub associations: Vec<Association>,
}

impl EngineGlobals {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            host: None,
            sequence: 0,
            timeout: config.timeout(),
            secondary_timeout: config.secondary_timeout(),
            delay_ms: config.delay_ms,
            version: config.version,
            always_auth: false,
            key_id: None,
            raw: config.raw,
            show_hostnames: config.show_hostnames,
            family: AddressFamily::Any,
            associations: Vec::new(),
        }
    }

    /// Advance and return the request sequence number.
    pub fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }
}

impl Default for EngineGlobals {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
