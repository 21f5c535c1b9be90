//! The query engine: NTP mode-6 client state and command handlers.
//!
//! The engine is deliberately single-threaded. All of its state lives in one
//! [`Engine`] value that the session lends out, by exclusive reference, for
//! the duration of one command.

pub mod builtins;
pub mod control;
mod globals;
pub mod ops;
mod transport;
pub mod vars;

use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use thiserror::Error;

use crate::command::{CoercionContext, CommandTables};
use crate::config::EngineConfig;
use control::{ControlHeader, ControlResponse, Fragment, FragmentAssembly, Opcode};

pub use globals::{AddressFamily, Association, EngineGlobals, HostEntry};
pub use transport::{is_timeout, Transport, UdpTransport};

/// Failures raised by the engine while running a command.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("request timed out")]
    Timeout,

    #[error("can't find host {host}")]
    NoHost { host: String },

    #[error("server returned error {}", server_error_name(.code))]
    Server { code: u8 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    BadArgument(String),
}

impl EngineError {
    /// Platform error number behind this failure, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            EngineError::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

fn server_error_name(code: &u8) -> String {
    match *code {
        1 => "UNSPEC".to_string(),
        2 => "PERMISSION".to_string(),
        3 => "BADFMT".to_string(),
        4 => "BADOP".to_string(),
        5 => "BADASSOC".to_string(),
        6 => "UNKNOWNVAR".to_string(),
        7 => "BADVALUE".to_string(),
        other => other.to_string(),
    }
}

/// The engine proper: globals plus the transport they drive.
pub struct Engine {
    globals: EngineGlobals,
    defaults: EngineConfig,
    transport: Box<dyn Transport>,
}

impl Engine {
    pub fn new(defaults: EngineConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            globals: EngineGlobals::from_config(&defaults),
            defaults,
            transport,
        }
    }

    pub fn globals(&self) -> &EngineGlobals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut EngineGlobals {
        &mut self.globals
    }

    pub fn defaults(&self) -> &EngineConfig {
        &self.defaults
    }

    /// Replace the defaults and reset to them.
    pub fn set_defaults(&mut self, defaults: EngineConfig) {
        self.defaults = defaults;
        self.reset();
    }

    /// Close the socket and restore every global to its default.
    pub fn reset(&mut self) {
        self.transport.close();
        self.globals = EngineGlobals::from_config(&self.defaults);
        tracing::debug!("Engine globals reset");
    }

    /// Resolve `name` and make it the current host.
    ///
    /// On failure the current host is left unchanged.
    pub fn open_host(&mut self, name: &str, family: AddressFamily) -> Result<(), EngineError> {
        let addr = resolve_host(name, self.defaults.port, family)?;
        if self.globals.host.as_ref().map(|h| h.addr) != Some(addr) {
            self.transport.close();
            self.globals.associations.clear();
        }
        self.globals.family = family;
        self.globals.host = Some(HostEntry {
            name: name.to_string(),
            addr,
        });
        tracing::debug!(host = name, %addr, "Host opened");
        Ok(())
    }

    fn ensure_host(&mut self) -> Result<SocketAddr, EngineError> {
        if let Some(host) = &self.globals.host {
            return Ok(host.addr);
        }
        let default = self.defaults.host.clone();
        self.open_host(&default, self.globals.family)?;
        self.globals
            .host
            .as_ref()
            .map(|h| h.addr)
            .ok_or(EngineError::NoHost { host: default })
    }

    /// Send one control request and wait for the complete response.
    ///
    /// Datagrams are received into `scratch`. A request that gets no reply
    /// at all is re-sent up to the configured retry count.
    pub fn query(
        &mut self,
        scratch: &mut [u8],
        opcode: Opcode,
        assid: u16,
        data: &[u8],
    ) -> Result<ControlResponse, EngineError> {
        let peer = self.ensure_host()?;
        let sequence = self.globals.next_sequence();
        let count = u16::try_from(data.len())
            .map_err(|_| EngineError::BadArgument("request data too long".to_string()))?;
        let header = ControlHeader::request(self.globals.version, opcode, sequence, assid, count);
        let request = control::encode_request(&header, data)?;

        let mut attempt = 0;
        loop {
            self.transport.send(peer, &request)?;
            match self.collect(scratch, opcode, sequence) {
                Err(EngineError::Timeout) if attempt < self.defaults.retries => {
                    attempt += 1;
                    tracing::debug!(attempt, ?opcode, "No reply, re-sending request");
                }
                result => return result,
            }
        }
    }

    fn collect(
        &mut self,
        scratch: &mut [u8],
        opcode: Opcode,
        sequence: u16,
    ) -> Result<ControlResponse, EngineError> {
        let mut assembly = FragmentAssembly::new();

        loop {
            let wait = if assembly.is_empty() {
                self.globals.timeout
            } else {
                self.globals.secondary_timeout
            };

            let received = match self.transport.recv(scratch, wait) {
                Ok(n) => n,
                Err(err) if is_timeout(&err) => {
                    return Err(if assembly.is_empty() {
                        EngineError::Timeout
                    } else {
                        EngineError::Protocol("response incomplete".to_string())
                    });
                }
                Err(err) => return Err(err.into()),
            };

            let fragment = match Fragment::decode(&scratch[..received]) {
                Ok(fragment) => fragment,
                Err(err) => {
                    tracing::debug!(%err, "Malformed datagram dropped");
                    continue;
                }
            };
            let header = fragment.header;
            if !header.response || header.sequence != sequence || header.opcode != opcode.code() {
                tracing::trace!(
                    sequence = header.sequence,
                    opcode = header.opcode,
                    "Unrelated datagram dropped"
                );
                continue;
            }
            if header.error {
                return Err(EngineError::Server {
                    code: (header.status >> 8) as u8,
                });
            }

            assembly.insert(fragment)?;
            if assembly.is_complete() {
                return Ok(assembly.into_response());
            }
        }
    }

    /// Re-read the server's association list into the cache.
    pub fn refresh_associations(&mut self, scratch: &mut [u8]) -> Result<(), EngineError> {
        let response = self.query(scratch, Opcode::ReadStatus, 0, &[])?;
        if response.data.len() % 4 != 0 {
            return Err(EngineError::Protocol(format!(
                "association list length {} not a multiple of 4",
                response.data.len()
            )));
        }
        self.globals.associations = response
            .data
            .chunks_exact(4)
            .map(|pair| Association {
                assid: u16::from_be_bytes([pair[0], pair[1]]),
                status: u16::from_be_bytes([pair[2], pair[3]]),
            })
            .collect();
        tracing::debug!(count = self.globals.associations.len(), "Associations refreshed");
        Ok(())
    }
}

fn resolve_host(name: &str, port: u16, family: AddressFamily) -> Result<SocketAddr, EngineError> {
    let no_host = || EngineError::NoHost {
        host: name.to_string(),
    };

    if let Ok(ip) = name.parse::<IpAddr>() {
        return family
            .admits(&ip)
            .then(|| SocketAddr::new(ip, port))
            .ok_or_else(no_host);
    }

    (name, port)
        .to_socket_addrs()
        .map_err(|_| no_host())?
        .find(|addr| family.admits(&addr.ip()))
        .ok_or_else(no_host)
}

/// Everything a handler may touch while it runs.
pub struct EngineContext<'a> {
    pub engine: &'a mut Engine,
    /// Capture sink standing in for the terminal.
    pub out: &'a mut dyn Write,
    /// Receive buffer for response datagrams.
    pub scratch: &'a mut [u8],
    /// Tables the command was resolved from, for `help`.
    pub tables: CommandTables,
}

impl EngineContext<'_> {
    pub fn query(
        &mut self,
        opcode: Opcode,
        assid: u16,
        data: &[u8],
    ) -> Result<ControlResponse, EngineError> {
        self.engine.query(self.scratch, opcode, assid, data)
    }

    pub fn refresh_associations(&mut self) -> Result<(), EngineError> {
        self.engine.refresh_associations(self.scratch)
    }
}

impl CoercionContext for EngineContext<'_> {
    fn address_family(&self) -> AddressFamily {
        self.engine.globals.family
    }

    fn port(&self) -> u16 {
        self.engine.defaults.port
    }

    fn association_count(&self) -> usize {
        self.engine.globals.associations.len()
    }

    fn association_id(&self, position: usize) -> Option<u16> {
        self.engine
            .globals
            .associations
            .get(position)
            .map(|a| a.assid)
    }

    fn refresh_associations(&mut self) {
        if let Err(err) = EngineContext::refresh_associations(self) {
            tracing::debug!(%err, "Association refresh during argument parsing failed");
            let _ = writeln!(self.out, "***{}", err);
        }
    }
}
