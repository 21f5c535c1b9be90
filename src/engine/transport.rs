//! Datagram transport used by the engine.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Blocking datagram exchange with one server at a time.
pub trait Transport: Send {
    /// Send one datagram to `peer`, (re)binding if the peer changed.
    fn send(&mut self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram into `buf`, waiting at most `timeout`.
    ///
    /// Expiry surfaces as `WouldBlock` or `TimedOut`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Drop any open socket.
    fn close(&mut self);
}

/// Whether an I/O error means the wait simply ran out.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// UDP socket connected to the current host.
#[derive(Debug, Default)]
pub struct UdpTransport {
    socket: Option<(UdpSocket, SocketAddr)>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bind_addr_for(target: &SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: SocketAddr, datagram: &[u8]) -> io::Result<()> {
        let reusable = matches!(&self.socket, Some((_, connected)) if *connected == peer);
        if !reusable {
            let socket = UdpSocket::bind(bind_addr_for(&peer))?;
            socket.connect(peer)?;
            tracing::debug!(%peer, "Control socket connected");
            self.socket = Some((socket, peer));
        }

        match &self.socket {
            Some((socket, _)) => socket.send(datagram).map(|_| ()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no control socket")),
        }
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let Some((socket, _)) = &self.socket else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no control socket"));
        };
        // A zero read timeout is rejected by the socket layer.
        socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        socket.recv(buf)
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!("Control socket closed");
        }
    }
}
