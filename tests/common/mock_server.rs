//! Scripted mode-6 server for testing query commands without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ntpq_embed::engine::control::{ControlHeader, MAX_DATA};
use ntpq_embed::engine::Transport;
use parking_lot::Mutex;

/// A request the engine sent, decoded for assertions.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub peer: SocketAddr,
    pub header: ControlHeader,
    pub data: Vec<u8>,
    /// Whole datagram length, header and padding included.
    pub len: usize,
}

impl CapturedRequest {
    pub fn data_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// How the scripted server answers one request.
pub enum Reply {
    /// Normal response, split into fragments of at most `MAX_DATA` bytes.
    Data { status: u16, data: Vec<u8> },
    /// Response with the error bit set.
    Error { code: u8 },
    /// Raw datagrams, sent as given.
    Datagrams(Vec<Vec<u8>>),
    /// Nothing at all.
    Silence,
}

pub type Responder = Box<dyn FnMut(&CapturedRequest) -> Reply + Send>;

#[derive(Default)]
pub struct ServerLog {
    pub requests: Vec<CapturedRequest>,
    pub closes: usize,
}

/// `Transport` that answers from a closure instead of a socket.
pub struct ScriptedTransport {
    log: Arc<Mutex<ServerLog>>,
    pending: VecDeque<Vec<u8>>,
    responder: Responder,
}

impl ScriptedTransport {
    pub fn new(responder: Responder) -> (Self, Arc<Mutex<ServerLog>>) {
        let log = Arc::new(Mutex::new(ServerLog::default()));
        let transport = Self {
            log: Arc::clone(&log),
            pending: VecDeque::new(),
            responder,
        };
        (transport, log)
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()> {
        let header = ControlHeader::from_bytes(datagram)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let count = usize::from(header.count);
        let request = CapturedRequest {
            peer,
            header,
            data: datagram[12..12 + count].to_vec(),
            len: datagram.len(),
        };

        let reply = (self.responder)(&request);
        self.log.lock().requests.push(request.clone());
        self.pending.extend(reply_datagrams(&request.header, reply));
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let Some(datagram) = self.pending.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "scripted silence"));
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.pending.clear();
        self.log.lock().closes += 1;
    }
}

/// Response header matching `request`.
pub fn response_header(request: &ControlHeader, status: u16) -> ControlHeader {
    ControlHeader {
        response: true,
        status,
        offset: 0,
        count: 0,
        ..*request
    }
}

pub fn datagram(header: ControlHeader, data: &[u8]) -> Vec<u8> {
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(data);
    bytes
}

fn reply_datagrams(request: &ControlHeader, reply: Reply) -> Vec<Vec<u8>> {
    match reply {
        Reply::Data { status, data } => {
            let chunks: Vec<&[u8]> = if data.is_empty() {
                vec![&[][..]]
            } else {
                data.chunks(MAX_DATA).collect()
            };
            let last = chunks.len() - 1;
            chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let header = ControlHeader {
                        more: i != last,
                        offset: (i * MAX_DATA) as u16,
                        count: chunk.len() as u16,
                        ..response_header(request, status)
                    };
                    datagram(header, chunk)
                })
                .collect()
        }
        Reply::Error { code } => {
            let header = ControlHeader {
                error: true,
                ..response_header(request, u16::from(code) << 8)
            };
            vec![datagram(header, &[])]
        }
        Reply::Datagrams(datagrams) => datagrams,
        Reply::Silence => Vec::new(),
    }
}

/// `READSTAT` payload for `(assid, status)` pairs.
pub fn association_list(pairs: &[(u16, u16)]) -> Vec<u8> {
    pairs
        .iter()
        .flat_map(|(assid, status)| {
            let mut entry = assid.to_be_bytes().to_vec();
            entry.extend_from_slice(&status.to_be_bytes());
            entry
        })
        .collect()
}
