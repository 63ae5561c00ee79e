use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::BytesMut;
use tracing::{debug, info};

use crate::error::{OscError, Result};
use crate::message::{encode_message, OscMessage};

/// Where sensor values are published unless configured otherwise.
pub const DEFAULT_PUBLISH_ADDR: &str = "127.0.0.1:5005";

/// A sink for outbound address/value messages.
pub trait Publish {
    /// Deliver one message.
    fn publish(&mut self, msg: &OscMessage) -> Result<()>;
}

/// Collects messages in memory.
impl Publish for Vec<OscMessage> {
    fn publish(&mut self, msg: &OscMessage) -> Result<()> {
        self.push(msg.clone());
        Ok(())
    }
}

/// Sends OSC messages to a single UDP destination.
pub struct OscPublisher {
    socket: UdpSocket,
    target: SocketAddr,
    buf: BytesMut,
}

impl OscPublisher {
    /// Create a publisher sending to `target` from an ephemeral local port.
    pub fn connect(target: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let label = target.to_string();
        let target = target
            .to_socket_addrs()
            .map_err(|e| OscError::Bind {
                addr: label.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| OscError::Bind {
                addr: label.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ),
            })?;

        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).map_err(|e| OscError::Bind {
            addr: local.to_string(),
            source: e,
        })?;
        socket.connect(target).map_err(|e| OscError::Bind {
            addr: label,
            source: e,
        })?;

        info!(%target, "publishing OSC");
        Ok(Self {
            socket,
            target,
            buf: BytesMut::with_capacity(128),
        })
    }

    /// Destination address.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Publish for OscPublisher {
    fn publish(&mut self, msg: &OscMessage) -> Result<()> {
        self.buf.clear();
        encode_message(msg, &mut self.buf)?;
        match self.socket.send(&self.buf) {
            Ok(_) => {}
            // Nobody listening yet; UDP reports it on the next send. Not our problem.
            Err(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                debug!(address = %msg.address, "publish target not listening");
            }
            Err(err) => return Err(OscError::Io(err)),
        }
        Ok(())
    }
}

impl std::fmt::Debug for OscPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscPublisher")
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::decode_message;

    #[test]
    fn publishes_to_udp_target() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut publisher = OscPublisher::connect(addr).unwrap();
        publisher
            .publish(&OscMessage::new("/analog3").arg(1023i32))
            .unwrap();

        let mut packet = [0u8; 256];
        let n = receiver.recv(&mut packet).unwrap();
        let msg = decode_message(&packet[..n]).unwrap();
        assert_eq!(msg, OscMessage::new("/analog3").arg(1023i32));
        assert_eq!(publisher.target(), addr);
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<OscMessage> = Vec::new();
        sink.publish(&OscMessage::new("/pitch").arg(7i32)).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].address, "/pitch");
    }
}
