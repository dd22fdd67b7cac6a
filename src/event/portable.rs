//! Condition-variable backend for targets without `poll(2)`.

use std::{
    io,
    sync::{Arc, Condvar, Mutex},
};

#[cfg_attr(unix, allow(dead_code))]
pub(super) const WAIT_OP: &str = "Condvar::wait()";

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<u32>,
    cond: Condvar,
}

fn poisoned() -> io::Error {
    io::Error::other("event state poisoned")
}

/// Signalling side of one event source.
#[derive(Clone, Debug)]
pub struct EventHandle {
    shared: Arc<Shared>,
    bit: u32,
}

impl EventHandle {
    pub fn signal(&self) -> io::Result<()> {
        let mut pending = self.shared.pending.lock().map_err(|_| poisoned())?;
        *pending |= self.bit;
        self.shared.cond.notify_all();
        Ok(())
    }
}

pub(super) struct Waiter {
    shared: Arc<Shared>,
    count: u32,
}

impl Waiter {
    pub(super) fn new() -> Self {
        Self {
            shared: Arc::default(),
            count: 0,
        }
    }

    pub(super) fn add(&mut self) -> io::Result<EventHandle> {
        if self.count >= u32::BITS {
            return Err(io::Error::other("too many event sources"));
        }
        let bit = 1 << self.count;
        self.count += 1;
        Ok(EventHandle {
            shared: Arc::clone(&self.shared),
            bit,
        })
    }

    pub(super) fn wait(&mut self) -> io::Result<Vec<usize>> {
        let mut pending = self.shared.pending.lock().map_err(|_| poisoned())?;
        while *pending == 0 {
            pending = self.shared.cond.wait(pending).map_err(|_| poisoned())?;
        }
        let fired = std::mem::take(&mut *pending);
        Ok((0..self.count as usize)
            .filter(|index| fired & (1 << index) != 0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    fn waiter() -> (Waiter, EventHandle, EventHandle) {
        let mut waiter = Waiter::new();
        let removed = waiter.add().unwrap();
        let ready = waiter.add().unwrap();
        (waiter, removed, ready)
    }

    #[test]
    fn keeps_signal_raised_before_wait() {
        let (mut waiter, _removed, ready) = waiter();
        ready.signal().unwrap();
        assert_eq!(waiter.wait().unwrap(), [1]);
    }

    #[test]
    fn consumed_signal_is_not_reported_again() {
        let (mut waiter, removed, ready) = waiter();
        ready.signal().unwrap();
        ready.signal().unwrap();
        assert_eq!(waiter.wait().unwrap(), [1]);

        removed.signal().unwrap();
        assert_eq!(waiter.wait().unwrap(), [0]);
    }

    #[test]
    fn reports_both_pending_sources() {
        let (mut waiter, removed, ready) = waiter();
        ready.signal().unwrap();
        removed.signal().unwrap();
        assert_eq!(waiter.wait().unwrap(), [0, 1]);
    }

    #[test]
    fn wakes_up_on_signal_from_another_thread() {
        let (mut waiter, _removed, ready) = waiter();
        let signaller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            ready.signal().unwrap();
        });
        assert_eq!(waiter.wait().unwrap(), [1]);
        signaller.join().unwrap();
    }

    #[test]
    fn handle_outlives_waiter() {
        let (waiter, _removed, ready) = waiter();
        drop(waiter);
        ready.signal().unwrap();
    }
}
