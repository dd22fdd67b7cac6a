//! `poll(2)` backend. Linux sources are eventfds, other Unix systems use a
//! non-blocking self-pipe per source.

use std::{
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::Arc,
};

pub(super) const WAIT_OP: &str = "poll()";

#[derive(Debug)]
struct Notifier {
    read: OwnedFd,
    // eventfds are read and written through the same descriptor
    write: Option<OwnedFd>,
}

impl Notifier {
    #[cfg(target_os = "linux")]
    fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            read: unsafe { OwnedFd::from_raw_fd(fd) },
            write: None,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [&read, &write] {
            set_nonblocking_cloexec(fd.as_raw_fd())?;
        }
        Ok(Self {
            read,
            write: Some(write),
        })
    }

    fn signal_fd(&self) -> RawFd {
        self.write.as_ref().unwrap_or(&self.read).as_raw_fd()
    }

    #[cfg(target_os = "linux")]
    fn signal(&self) -> io::Result<()> {
        let value: u64 = 1;
        let n = unsafe { libc::write(self.signal_fd(), (&value as *const u64).cast(), 8) };
        if n < 0 {
            let err = io::Error::last_os_error();
            // counter saturated: still pending, nothing lost
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn signal(&self) -> io::Result<()> {
        let byte = 1u8;
        let n = unsafe { libc::write(self.signal_fd(), (&byte as *const u8).cast(), 1) };
        if n < 0 {
            let err = io::Error::last_os_error();
            // pipe full: still pending, nothing lost
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Clears the pending notification. Returns false if nothing was pending.
    #[cfg(target_os = "linux")]
    fn drain(&self) -> io::Result<bool> {
        let mut value: u64 = 0;
        let n = unsafe { libc::read(self.read.as_raw_fd(), (&mut value as *mut u64).cast(), 8) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(value != 0)
    }

    #[cfg(not(target_os = "linux"))]
    fn drain(&self) -> io::Result<bool> {
        let mut buf = [0u8; 64];
        let mut drained = false;
        loop {
            let n = unsafe { libc::read(self.read.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            match n {
                n if n > 0 => drained = true,
                0 => return Ok(drained),
                _ => {
                    let err = io::Error::last_os_error();
                    return match err.kind() {
                        io::ErrorKind::WouldBlock => Ok(drained),
                        io::ErrorKind::Interrupted => continue,
                        _ => Err(err),
                    };
                }
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Signalling side of one event source.
///
/// Cloning shares the underlying descriptor; it is closed once the waiter
/// and every handle have been dropped.
#[derive(Clone, Debug)]
pub struct EventHandle {
    notifier: Arc<Notifier>,
}

impl EventHandle {
    pub fn signal(&self) -> io::Result<()> {
        self.notifier.signal()
    }
}

/// The descriptor a native driver writes to in order to raise the event.
impl AsRawFd for EventHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.notifier.signal_fd()
    }
}

pub(super) struct Waiter {
    notifiers: Vec<Arc<Notifier>>,
    fds: Vec<libc::pollfd>,
}

impl Waiter {
    pub(super) fn new() -> Self {
        Self {
            notifiers: Vec::new(),
            fds: Vec::new(),
        }
    }

    pub(super) fn add(&mut self) -> io::Result<EventHandle> {
        let notifier = Arc::new(Notifier::new()?);
        self.fds.push(libc::pollfd {
            fd: notifier.read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        self.notifiers.push(Arc::clone(&notifier));
        Ok(EventHandle { notifier })
    }

    /// Blocks until a source is readable and returns the indices of every
    /// source whose notification was consumed.
    pub(super) fn wait(&mut self) -> io::Result<Vec<usize>> {
        loop {
            for pfd in &mut self.fds {
                pfd.revents = 0;
            }
            let r = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, -1) };
            if r < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if r == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "returned 0 without a timeout",
                ));
            }

            let mut fired = Vec::with_capacity(self.fds.len());
            for (index, pfd) in self.fds.iter().enumerate() {
                if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                    return Err(io::Error::other(format!(
                        "revents {:#x} on source {index}",
                        pfd.revents
                    )));
                }
                if pfd.revents & libc::POLLIN != 0 && self.notifiers[index].drain()? {
                    fired.push(index);
                }
            }
            // Readable but already drained: nothing to report, keep waiting.
            if !fired.is_empty() {
                return Ok(fired);
            }
        }
    }
}
