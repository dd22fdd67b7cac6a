//! Readiness notifications from the instrument.
//!
//! The device signals one [`EventHandle`] per [`AcqEvent`]; the acquisition
//! loop blocks in [`EventWaiter::wait_any`] until at least one of them fires.
//! Platform differences (eventfd, self-pipe, condition variable) stay inside
//! the `sys` backend.

use crate::{AcqError, AcqResult};
use log::{debug, trace};
use std::fmt;

#[cfg(unix)]
#[path = "unix.rs"]
mod sys;

#[cfg(not(unix))]
#[path = "portable.rs"]
mod sys;

#[cfg(all(test, unix))]
mod portable;

pub use sys::EventHandle;

/// The semantic events an instrument can raise during a block acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcqEvent {
    DeviceRemoved,
    DataReady,
}

impl AcqEvent {
    pub const ALL: [AcqEvent; 2] = [AcqEvent::DeviceRemoved, AcqEvent::DataReady];

    const fn bit(self) -> u8 {
        match self {
            AcqEvent::DeviceRemoved => 0b01,
            AcqEvent::DataReady => 0b10,
        }
    }
}

impl fmt::Display for AcqEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcqEvent::DeviceRemoved => f.write_str("device removed"),
            AcqEvent::DataReady => f.write_str("data ready"),
        }
    }
}

/// The set of events reported by a single wake-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FiredEvents(u8);

impl FiredEvents {
    pub fn contains(self, event: AcqEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = AcqEvent> {
        AcqEvent::ALL.into_iter().filter(move |e| self.contains(*e))
    }

    fn insert(&mut self, event: AcqEvent) {
        self.0 |= event.bit();
    }
}

impl FromIterator<AcqEvent> for FiredEvents {
    fn from_iter<I: IntoIterator<Item = AcqEvent>>(iter: I) -> Self {
        let mut fired = FiredEvents::default();
        for event in iter {
            fired.insert(event);
        }
        fired
    }
}

/// Blocks the calling thread until a registered event source is signalled.
///
/// Each source is created by [`register`](EventWaiter::register), which hands
/// back the signalling side for the device. A notification that arrives
/// before `wait_any` is called is kept pending, and every notification is
/// consumed by the wake-up that reports it.
pub struct EventWaiter {
    waiter: sys::Waiter,
    events: Vec<AcqEvent>,
}

impl EventWaiter {
    pub fn new() -> Self {
        Self {
            waiter: sys::Waiter::new(),
            events: Vec::with_capacity(AcqEvent::ALL.len()),
        }
    }

    /// Allocates a readiness primitive for `event` and returns the handle the
    /// device signals it through.
    pub fn register(&mut self, event: AcqEvent) -> AcqResult<EventHandle> {
        if self.events.contains(&event) {
            return Err(AcqError::configuration(format!(
                "Event source for {event} already registered"
            )));
        }
        let handle = self.waiter.add().map_err(|e| {
            AcqError::configuration(format!("Can't create event source for {event}: {e}"))
        })?;
        self.events.push(event);
        debug!("Registered event source for {event}");
        Ok(handle)
    }

    /// Blocks until at least one source fires. There is no timeout; the
    /// device's trigger timeout bounds how long a cycle can take.
    pub fn wait_any(&mut self) -> AcqResult<FiredEvents> {
        if self.events.is_empty() {
            return Err(AcqError::wait(
                sys::WAIT_OP,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "no event sources"),
            ));
        }
        let fired: FiredEvents = self
            .waiter
            .wait()
            .map_err(|e| AcqError::wait(sys::WAIT_OP, e))?
            .into_iter()
            .map(|index| self.events[index])
            .collect();
        trace!("Woke up on {:?}", fired.iter().collect::<Vec<_>>());
        Ok(fired)
    }
}

impl Default for EventWaiter {
    fn default() -> Self {
        Self::new()
    }
}
