//! The block acquisition loop: start, wait for the instrument, fetch, repeat.

use crate::{
    AcqError, AcqEvent, AcqResult, AcquisitionSession, AcquisitionStats, BufferPool, Counter,
    Device, EventWaiter,
};
use log::{debug, error, info, trace, warn};

/// Where the loop is within the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Started,
    AwaitingEvent,
    DataFetched,
    /// Every requested cycle completed.
    Completed,
    /// A fatal condition ended the run.
    Failed,
}

/// Drives `measurements` block acquisitions on one device.
///
/// Buffers and event sources are created by [`new`](AcquisitionLoop::new)
/// and released when [`run`](AcquisitionLoop::run) returns, whatever the
/// outcome. Nothing is retried: the first start, wait or fetch failure, or a
/// removal notice, ends the run.
pub struct AcquisitionLoop<'d, D: Device + ?Sized> {
    device: &'d mut D,
    waiter: EventWaiter,
    buffers: BufferPool,
    requested: u32,
    remaining: u32,
    cycle_size: usize,
    state: LoopState,
}

impl<'d, D: Device + ?Sized> AcquisitionLoop<'d, D> {
    /// Allocates the channel buffers and binds "device removed" and "data
    /// ready" to fresh event sources.
    pub fn new(device: &'d mut D, session: &AcquisitionSession) -> AcqResult<Self> {
        let buffers = session.allocate_buffers()?;
        let mut waiter = EventWaiter::new();
        for event in AcqEvent::ALL {
            let handle = waiter.register(event)?;
            device.bind_event(event, handle)?;
        }
        let cycle_size =
            buffers.active_count() * buffers.record_length() * buffers.format().sample_size();

        Ok(Self {
            device,
            waiter,
            buffers,
            requested: session.measurements,
            remaining: session.measurements,
            cycle_size,
            state: LoopState::Idle,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Cycles still to run.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn run(&mut self) -> AcqResult<AcquisitionStats> {
        self.run_with(|_, _| {})
    }

    /// Like [`run`](Self::run), calling `inspect` with the 1-based cycle
    /// number after each fetch. The buffers are only valid until the next
    /// cycle starts.
    pub fn run_with<F>(&mut self, mut inspect: F) -> AcqResult<AcquisitionStats>
    where
        F: FnMut(u32, &BufferPool),
    {
        if self.state != LoopState::Idle {
            return Err(AcqError::configuration("Acquisition loop already ran"));
        }
        info!("Performing {} measurements", self.requested);

        let mut counter = Counter::start();
        let result = self.drive(&mut counter, &mut inspect);
        let stats = counter.stop();

        self.buffers.release_all();

        match result {
            Ok(()) => {
                self.transition(LoopState::Completed);
                Ok(stats)
            }
            Err(e) => {
                self.transition(LoopState::Failed);
                if e.is_device_gone() {
                    warn!("Device removed during cycle {}", stats.cycles + 1);
                } else {
                    error!("Cycle {} failed: {e}", stats.cycles + 1);
                }
                debug!(
                    "Aborted after {} of {} cycles in {:?}",
                    stats.cycles, self.requested, stats.elapsed
                );
                Err(e)
            }
        }
    }

    fn drive<F>(&mut self, counter: &mut Counter, inspect: &mut F) -> AcqResult<()>
    where
        F: FnMut(u32, &BufferPool),
    {
        while self.remaining != 0 {
            self.device.start_acquisition()?;
            self.transition(LoopState::Started);

            self.transition(LoopState::AwaitingEvent);
            self.await_data()?;

            self.device.fetch_data(&mut self.buffers)?;
            self.remaining -= 1;
            counter.increment(self.cycle_size);
            self.transition(LoopState::DataFetched);

            inspect(counter.n_cycles, &self.buffers);
        }
        Ok(())
    }

    /// Removal wins over data that arrived in the same wake-up.
    fn await_data(&mut self) -> AcqResult<()> {
        loop {
            let fired = self.waiter.wait_any()?;
            if fired.contains(AcqEvent::DeviceRemoved) {
                return Err(AcqError::DeviceGone);
            }
            if fired.contains(AcqEvent::DataReady) {
                return Ok(());
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        trace!("{:?} -> {:?} ({} cycles left)", self.state, next, self.remaining);
        self.state = next;
    }
}
