use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;

/// Capability set every byte transport provides.
pub trait Transport: Read + Write + Send {
    /// Number of bytes that can be read right now without waiting.
    fn available(&self) -> Result<usize>;

    /// Bound how long a read may wait for data. `None` waits forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// A connected byte channel to the microcontroller (implements Read + Write).
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps either a configured serial line or a TCP stream.
pub struct Channel {
    inner: ChannelInner,
}

enum ChannelInner {
    #[cfg(unix)]
    Serial(crate::serial::SerialLine),
    Tcp(TcpStream),
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => line.read(buf),
            ChannelInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => line.write(buf),
            ChannelInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => line.flush(),
            ChannelInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl Channel {
    /// Create a Channel from an opened serial line.
    #[cfg(unix)]
    pub fn from_serial(line: crate::serial::SerialLine) -> Self {
        Self {
            inner: ChannelInner::Serial(line),
        }
    }

    /// Create a Channel from a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: ChannelInner::Tcp(stream),
        }
    }

    /// Try to clone this channel (creates a new file descriptor).
    ///
    /// The bridge reads on one handle and writes commands on the other.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => Ok(Self::from_serial(line.try_clone()?)),
            ChannelInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }
}

impl Transport for Channel {
    fn available(&self) -> Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => line.available(),
            ChannelInner::Tcp(stream) => tcp_available(stream),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => {
                line.set_read_timeout(timeout);
                Ok(())
            }
            ChannelInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(_) => "serial",
            ChannelInner::Tcp(_) => "tcp",
        }
    }
}

#[cfg(unix)]
fn tcp_available(stream: &TcpStream) -> Result<usize> {
    use std::os::fd::AsRawFd;
    crate::sys::bytes_available(stream.as_raw_fd()).map_err(Into::into)
}

#[cfg(not(unix))]
fn tcp_available(_stream: &TcpStream) -> Result<usize> {
    Err(crate::error::TransportError::Unsupported("available()"))
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::Serial(line) => f
                .debug_struct("Channel")
                .field("type", &"serial")
                .field("path", &line.path())
                .finish(),
            ChannelInner::Tcp(stream) => f
                .debug_struct("Channel")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}
