//! An in-process oscilloscope for running the benchmark without hardware.
//!
//! Captures complete on a worker thread after `record_length /
//! sample_frequency` seconds (scaled by `time_scale`) and are reported
//! through the bound event handles, just like a driver would.

use crate::{
    AcqError, AcqEvent, AcqResult, BufferPool, ChannelBuffer, Device, EventHandle, SampleFormat,
    SimulatorSettings, TriggerMode,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    f64::consts::TAU,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

const START_OP: &str = "start_acquisition";
const FETCH_OP: &str = "fetch_data";
/// Samples per period of the generated sine.
const SIGNAL_PERIOD: f64 = 100.0;
const NOISE: f64 = 0.01;
const MAX_RESOLUTION: u8 = u64::BITS as u8;

/// One capture for the worker to complete.
struct Capture {
    after: Duration,
    outcome: AcqEvent,
}

struct Worker {
    tx: Sender<Capture>,
    handle: JoinHandle<()>,
}

pub struct SimulatedScope {
    settings: SimulatorSettings,
    resolution: u8,
    sample_frequency: f64,
    record_length: u64,
    enabled: Vec<bool>,
    trigger_enabled: Vec<bool>,
    block_mode: bool,
    trigger: TriggerMode,
    removed_event: Option<EventHandle>,
    ready_event: Option<EventHandle>,
    data_ready: Arc<AtomicBool>,
    worker: Option<Worker>,
    running: bool,
    gone: bool,
    cycle: u32,
    starts: u32,
    fetches: u32,
    rng: StdRng,
}

impl SimulatedScope {
    /// Fails if a configured resolution is outside 1..=64 bit, since raw
    /// codes are generated as `u64`.
    pub fn new(settings: &SimulatorSettings) -> AcqResult<Self> {
        if let Some(bits) = std::iter::once(&settings.resolution)
            .chain(&settings.resolutions)
            .find(|bits| !(1..=MAX_RESOLUTION).contains(*bits))
        {
            return Err(AcqError::configuration(format!(
                "Unsupported simulator resolution: {bits} bit"
            )));
        }
        let channels = usize::from(settings.channel_count);
        Ok(Self {
            resolution: settings.resolution,
            sample_frequency: settings.max_sample_frequency,
            record_length: settings.max_record_length.min(5000),
            enabled: vec![true; channels],
            trigger_enabled: vec![false; channels],
            block_mode: false,
            trigger: TriggerMode::Disabled,
            removed_event: None,
            ready_event: None,
            data_ready: Arc::new(AtomicBool::new(false)),
            worker: None,
            running: false,
            gone: false,
            cycle: 0,
            starts: 0,
            fetches: 0,
            rng: StdRng::seed_from_u64(settings.seed),
            settings: settings.clone(),
        })
    }

    /// Number of `start_acquisition` calls so far.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Number of `fetch_data` calls so far.
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger
    }

    fn capture_time(&self) -> Duration {
        let secs = self.record_length as f64 / self.sample_frequency * self.settings.time_scale;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn spawn_worker(&mut self) -> AcqResult<&Sender<Capture>> {
        if self.worker.is_none() {
            let (Some(removed), Some(ready)) = (self.removed_event.clone(), self.ready_event.clone())
            else {
                return Err(AcqError::start(START_OP, "Events not bound"));
            };
            let (tx, rx) = unbounded();
            let data_ready = Arc::clone(&self.data_ready);
            let handle = thread::Builder::new()
                .name("sim-capture".into())
                .spawn(move || capture_thread(rx, removed, ready, data_ready))
                .map_err(|e| AcqError::start(START_OP, e.to_string()))?;
            self.worker = Some(Worker { tx, handle });
        }
        match &self.worker {
            Some(worker) => Ok(&worker.tx),
            None => Err(AcqError::start(START_OP, "Capture worker not running")),
        }
    }

    fn fill(&mut self, channel: usize, buffer: &mut ChannelBuffer) {
        let period = SIGNAL_PERIOD;
        let phase = self.rng.random::<f64>() * TAU + channel as f64;
        let full_scale = ((1u64 << self.resolution.min(63)) - 1) as f64;
        let sample_size = usize::from(self.resolution).div_ceil(8);

        let sample = |i: usize, rng: &mut StdRng| {
            0.8 * (TAU * i as f64 / period + phase).sin() + rng.random_range(-NOISE..NOISE)
        };
        match buffer {
            ChannelBuffer::Float(data) => {
                for (i, value) in data.iter_mut().enumerate() {
                    *value = sample(i, &mut self.rng) as f32;
                }
            }
            ChannelBuffer::Raw(data) => {
                for (i, chunk) in data.chunks_exact_mut(sample_size).enumerate() {
                    let volts = sample(i, &mut self.rng).clamp(-1.0, 1.0);
                    let code = ((volts + 1.0) / 2.0 * full_scale).round() as u64;
                    chunk.copy_from_slice(&code.to_le_bytes()[..sample_size]);
                }
            }
        }
    }
}

fn capture_thread(
    rx: Receiver<Capture>,
    removed: EventHandle,
    ready: EventHandle,
    data_ready: Arc<AtomicBool>,
) {
    for capture in rx {
        if !capture.after.is_zero() {
            thread::sleep(capture.after);
        }
        let res = match capture.outcome {
            AcqEvent::DataReady => {
                data_ready.store(true, Ordering::Release);
                ready.signal()
            }
            AcqEvent::DeviceRemoved => removed.signal(),
        };
        if let Err(e) = res {
            warn!("Can't signal {}: {e}", capture.outcome);
        }
    }
}

impl Drop for SimulatedScope {
    fn drop(&mut self) {
        if let Some(Worker { tx, handle }) = self.worker.take() {
            drop(tx);
            if handle.join().is_err() {
                warn!("Capture worker panicked");
            }
        }
    }
}

impl Device for SimulatedScope {
    fn describe(&self) -> String {
        format!(
            "Simulated oscilloscope: {} channels, {} MHz, {:?} bit",
            self.settings.channel_count,
            self.settings.max_sample_frequency / 1e6,
            self.settings.resolutions
        )
    }

    fn channel_count(&self) -> u16 {
        self.settings.channel_count
    }

    fn set_block_mode(&mut self) -> AcqResult<()> {
        self.block_mode = true;
        Ok(())
    }

    fn set_channel_enabled(&mut self, channel: u16, enabled: bool) -> bool {
        match self.enabled.get_mut(usize::from(channel)) {
            Some(state) => {
                *state = enabled;
                enabled
            }
            None => false,
        }
    }

    fn set_channel_trigger_enabled(&mut self, channel: u16, enabled: bool) -> bool {
        match self.trigger_enabled.get_mut(usize::from(channel)) {
            Some(state) => {
                *state = enabled;
                enabled
            }
            None => false,
        }
    }

    fn resolution(&self) -> u8 {
        self.resolution
    }

    fn set_resolution(&mut self, bits: u8) -> u8 {
        if self.settings.resolutions.contains(&bits) {
            self.resolution = bits;
        }
        self.resolution
    }

    fn configure_trigger(&mut self, mode: TriggerMode) -> AcqResult<()> {
        if mode == TriggerMode::ExternalFallingEdge && !self.settings.has_ext1 {
            return Err(AcqError::configuration("Can't setup trigger input EXT1"));
        }
        self.trigger = mode;
        Ok(())
    }

    /// Rounds to the nearest whole divider of the maximum frequency.
    fn set_sample_frequency(&mut self, hz: f64) -> f64 {
        if hz.is_finite() && hz > 0.0 {
            let max = self.settings.max_sample_frequency;
            let divider = (max / hz).round().max(1.0);
            self.sample_frequency = max / divider;
        }
        self.sample_frequency
    }

    fn set_record_length(&mut self, samples: u64) -> u64 {
        self.record_length = samples.clamp(1, self.settings.max_record_length);
        self.record_length
    }

    fn bind_event(&mut self, event: AcqEvent, handle: EventHandle) -> AcqResult<()> {
        if self.worker.is_some() {
            return Err(AcqError::configuration(
                "Events must be bound before the first acquisition",
            ));
        }
        match event {
            AcqEvent::DeviceRemoved => self.removed_event = Some(handle),
            AcqEvent::DataReady => self.ready_event = Some(handle),
        }
        Ok(())
    }

    fn start_acquisition(&mut self) -> AcqResult<()> {
        self.starts += 1;
        if self.gone {
            return Err(AcqError::start(START_OP, "Object not available"));
        }
        if !self.block_mode {
            return Err(AcqError::start(START_OP, "Measure mode not set"));
        }
        if self.running {
            return Err(AcqError::start(START_OP, "Measurement already running"));
        }
        self.cycle += 1;
        if self.settings.fail_start_on_cycle == Some(self.cycle) {
            return Err(AcqError::start(START_OP, "Simulated start failure"));
        }

        let outcome = if self.settings.remove_on_cycle == Some(self.cycle) {
            self.gone = true;
            AcqEvent::DeviceRemoved
        } else {
            AcqEvent::DataReady
        };
        let after = self.capture_time();
        self.spawn_worker()?
            .send(Capture { after, outcome })
            .map_err(|_| AcqError::start(START_OP, "Capture worker stopped"))?;
        self.running = true;
        debug!("Cycle {} armed, {outcome} in {after:?}", self.cycle);
        Ok(())
    }

    fn fetch_data(&mut self, buffers: &mut BufferPool) -> AcqResult<()> {
        self.fetches += 1;
        if self.gone {
            return Err(AcqError::fetch(FETCH_OP, "Object not available"));
        }
        if !self.data_ready.swap(false, Ordering::Acquire) {
            return Err(AcqError::fetch(FETCH_OP, "Data not available"));
        }
        self.running = false;
        if self.settings.fail_fetch_on_cycle == Some(self.cycle) {
            return Err(AcqError::fetch(FETCH_OP, "Simulated fetch failure"));
        }
        let raw_size_mismatch = matches!(
            buffers.format(),
            SampleFormat::Raw { bytes } if bytes != usize::from(self.resolution).div_ceil(8)
        );
        if buffers.channel_count() != self.enabled.len()
            || buffers.record_length() as u64 != self.record_length
            || raw_size_mismatch
        {
            return Err(AcqError::fetch(FETCH_OP, "Buffer layout does not match record"));
        }
        for (channel, buffer) in buffers.active_mut() {
            if self.enabled[channel] {
                self.fill(channel, buffer);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Conf, EventWaiter};
    use confique::Config;

    fn scope() -> SimulatedScope {
        let mut conf = Conf::builder().load().unwrap();
        conf.simulator.time_scale = 0.0;
        let mut scope = SimulatedScope::new(&conf.simulator).unwrap();
        scope.set_block_mode().unwrap();
        scope
    }

    fn bind(scope: &mut SimulatedScope) -> EventWaiter {
        let mut waiter = EventWaiter::new();
        for event in AcqEvent::ALL {
            scope.bind_event(event, waiter.register(event).unwrap()).unwrap();
        }
        waiter
    }

    #[test]
    fn start_requires_bound_events() {
        let mut scope = scope();
        assert!(matches!(scope.start_acquisition(), Err(AcqError::Start { .. })));
    }

    #[test]
    fn rebinding_replaces_the_previous_handle() {
        let mut scope = scope();
        let _stale = bind(&mut scope);
        let mut waiter = bind(&mut scope);
        scope.start_acquisition().unwrap();
        assert!(waiter.wait_any().unwrap().contains(AcqEvent::DataReady));
    }

    #[test]
    fn second_start_before_fetch_is_rejected() {
        let mut scope = scope();
        let mut waiter = bind(&mut scope);
        scope.start_acquisition().unwrap();
        assert!(matches!(scope.start_acquisition(), Err(AcqError::Start { .. })));

        assert!(waiter.wait_any().unwrap().contains(AcqEvent::DataReady));
        let mut pool = BufferPool::allocate(4, 4, 5000, SampleFormat::Float).unwrap();
        scope.fetch_data(&mut pool).unwrap();
        scope.start_acquisition().unwrap();
    }

    #[test]
    fn fetch_without_data_fails() {
        let mut scope = scope();
        let mut pool = BufferPool::allocate(4, 4, 5000, SampleFormat::Float).unwrap();
        assert!(matches!(scope.fetch_data(&mut pool), Err(AcqError::Fetch { .. })));
    }

    #[test]
    fn raw_codes_stay_within_resolution() {
        let mut scope = scope();
        assert_eq!(scope.set_resolution(12), 12);
        let mut waiter = bind(&mut scope);
        scope.start_acquisition().unwrap();
        waiter.wait_any().unwrap();

        let mut pool = BufferPool::allocate(4, 1, 5000, SampleFormat::raw(12)).unwrap();
        scope.fetch_data(&mut pool).unwrap();
        let raw = pool.get(0).unwrap().as_raw().unwrap();
        let codes: Vec<u16> = raw
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(codes.len(), 5000);
        assert!(codes.iter().all(|&c| c <= 0x0fff));
        assert!(codes.iter().any(|&c| c > 0x0800));
        assert!(codes.iter().any(|&c| c < 0x0800));
    }

    #[test]
    fn float_samples_follow_the_input_range() {
        let mut scope = scope();
        let mut waiter = bind(&mut scope);
        scope.start_acquisition().unwrap();
        waiter.wait_any().unwrap();

        let mut pool = BufferPool::allocate(4, 2, 5000, SampleFormat::Float).unwrap();
        scope.fetch_data(&mut pool).unwrap();
        for channel in 0..2 {
            let samples = pool.get(channel).unwrap().as_float().unwrap();
            assert!(samples.iter().all(|v| v.abs() <= 0.82));
            assert!(samples.iter().any(|&v| v > 0.5));
        }
    }

    #[test]
    fn resolution_wider_than_64_bit_is_rejected() {
        let mut conf = Conf::builder().load().unwrap();
        conf.simulator.resolution = 72;
        let err = SimulatedScope::new(&conf.simulator).err().unwrap();
        assert!(matches!(err, AcqError::Configuration(_)));

        let mut conf = Conf::builder().load().unwrap();
        conf.simulator.resolutions.push(0);
        assert!(SimulatedScope::new(&conf.simulator).is_err());
    }

    #[test]
    fn full_64_bit_codes_fit_the_raw_buffer() {
        let mut conf = Conf::builder().load().unwrap();
        conf.simulator.time_scale = 0.0;
        conf.simulator.resolution = 64;
        let mut scope = SimulatedScope::new(&conf.simulator).unwrap();
        scope.set_block_mode().unwrap();
        assert_eq!(scope.set_record_length(100), 100);
        let mut waiter = bind(&mut scope);
        scope.start_acquisition().unwrap();
        waiter.wait_any().unwrap();

        let mut pool = BufferPool::allocate(4, 1, 100, SampleFormat::raw(64)).unwrap();
        scope.fetch_data(&mut pool).unwrap();
        assert_eq!(pool.get(0).unwrap().as_raw().unwrap().len(), 800);
    }

    #[test]
    fn unsupported_resolution_is_ignored() {
        let mut scope = scope();
        assert_eq!(scope.set_resolution(10), 8);
        assert_eq!(scope.resolution(), 8);
    }
}
