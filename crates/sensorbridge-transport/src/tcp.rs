use std::net::TcpStream;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Channel;

/// Connect to a network-attached microcontroller (blocking).
pub fn connect(addr: &str) -> Result<Channel> {
    let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
        addr: addr.to_string(),
        source: e,
    })?;
    // Frames are tiny; don't let Nagle hold commands back.
    stream.set_nodelay(true)?;
    debug!(addr, "connected to tcp endpoint");
    Ok(Channel::from_tcp(stream))
}
