use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::info;

use crate::error::{OscError, Result};
use crate::message::{decode_message, OscMessage};

/// Where control messages are accepted unless configured otherwise.
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:5006";

const MAX_PACKET: usize = 1536;

/// Receives OSC messages on a bound UDP port.
pub struct OscListener {
    socket: UdpSocket,
}

impl OscListener {
    /// Bind to `addr` (for example `127.0.0.1:5006`).
    pub fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| OscError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        info!(addr = %socket.local_addr()?, "listening for OSC control messages");
        Ok(Self { socket })
    }

    /// Bound address (useful after binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }

    /// Bound how long `recv` waits. `None` blocks indefinitely.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Receive and decode the next message.
    ///
    /// Returns `Ok(None)` when the timeout elapsed with nothing received.
    /// A malformed packet is consumed and reported as an error; the caller
    /// may keep receiving.
    pub fn recv(&self) -> Result<Option<(OscMessage, SocketAddr)>> {
        let mut packet = [0u8; MAX_PACKET];
        let (n, from) = match self.socket.recv_from(&mut packet) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(OscError::Io(err)),
        };
        let msg = decode_message(&packet[..n])?;
        Ok(Some((msg, from)))
    }
}

impl std::fmt::Debug for OscListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscListener")
            .field("local_addr", &self.socket.local_addr().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{OscPublisher, Publish};

    #[test]
    fn receives_published_message() {
        let listener = OscListener::bind("127.0.0.1:0").unwrap();
        listener.set_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut publisher = OscPublisher::connect(addr).unwrap();
        publisher
            .publish(&OscMessage::new("/optoInterval").arg(10i32).arg(20i32))
            .unwrap();

        let (msg, _from) = listener.recv().unwrap().unwrap();
        assert_eq!(msg.address, "/optoInterval");
        assert_eq!(msg.args.len(), 2);
    }

    #[test]
    fn timeout_yields_none() {
        let listener = OscListener::bind("127.0.0.1:0").unwrap();
        listener
            .set_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        assert!(listener.recv().unwrap().is_none());
    }

    #[test]
    fn malformed_packet_is_an_error_not_a_hang() {
        let listener = OscListener::bind("127.0.0.1:0").unwrap();
        listener.set_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not osc", addr).unwrap();

        assert!(listener.recv().is_err());
    }
}
