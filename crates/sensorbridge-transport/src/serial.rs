use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::error::{Result, TransportError};

/// Poll timeout meaning "block until data arrives".
const NO_TIMEOUT: i32 = -1;

/// A tty device configured as a raw 8N1 serial line.
///
/// Reads block until at least one byte is available, or until the read
/// timeout (if any) elapses, in which case the read fails with `TimedOut`.
pub struct SerialLine {
    file: File,
    path: PathBuf,
    read_timeout_ms: AtomicI32,
}

impl SerialLine {
    /// Open `path` and configure it for the given line speed.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_to_speed(config.baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .map_err(|e| TransportError::Open {
                path: path.clone(),
                source: e,
            })?;

        configure_raw(&file, speed).map_err(|e| TransportError::Configure {
            path: path.clone(),
            source: e,
        })?;

        let line = Self {
            file,
            path,
            read_timeout_ms: AtomicI32::new(NO_TIMEOUT),
        };

        if config.flush_on_open {
            line.discard_input()?;
        }

        info!(path = ?line.path, baud = config.baud, "opened serial line");
        Ok(line)
    }

    /// Drop anything the driver has buffered but we have not read yet.
    pub fn discard_input(&self) -> Result<()> {
        // SAFETY: the descriptor is owned by `self.file` and open.
        let rc = unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        debug!(path = ?self.path, "discarded pending serial input");
        Ok(())
    }

    /// Bytes readable right now without blocking.
    pub fn available(&self) -> Result<usize> {
        crate::sys::bytes_available(self.file.as_raw_fd()).map_err(Into::into)
    }

    /// Bound how long a read may wait. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        let ms = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
            None => NO_TIMEOUT,
        };
        self.read_timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Duplicate the descriptor; the clone starts with the same read timeout.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            read_timeout_ms: AtomicI32::new(self.read_timeout_ms.load(Ordering::Relaxed)),
        })
    }

    /// Device path this line was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for SerialLine {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let timeout = self.read_timeout_ms.load(Ordering::Relaxed);
        if timeout != NO_TIMEOUT {
            crate::sys::wait_readable(self.file.as_raw_fd(), timeout)?;
        }
        self.file.read(buf)
    }
}

impl Write for SerialLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn configure_raw(file: &File, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is plain old data; tcgetattr fully initializes it.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is open and `tio` is a valid writable termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` is a valid termios obtained above.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !libc::CSTOPB;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is valid; speed comes from the libc B* constants.
    let rc = unsafe {
        libc::cfsetispeed(&mut tio, speed) | libc::cfsetospeed(&mut tio, speed)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is open and `tio` is fully initialized.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        other => return Err(TransportError::UnsupportedBaud(other)),
    };
    Ok(speed)
}

impl std::fmt::Debug for SerialLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLine")
            .field("path", &self.path)
            .finish()
    }
}
