use std::io;
use std::os::fd::RawFd;

/// Bytes queued in the kernel receive buffer for `fd`.
pub(crate) fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the provided pointer, and
    // `fd` is an open descriptor owned by the caller.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(count.max(0) as usize)
}

/// Wait until `fd` is readable. A negative timeout waits forever.
///
/// Returns `TimedOut` when nothing arrived in time.
pub(crate) fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<()> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pollfd` is a valid, initialized array of length 1.
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    match rc {
        0 => Err(io::Error::from(io::ErrorKind::TimedOut)),
        n if n < 0 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}
