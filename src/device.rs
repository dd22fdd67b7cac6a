use crate::{AcqEvent, AcqResult, BufferPool, EventHandle};
use std::fmt;

/// Trigger setup applied before the first cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    /// Trigger system off, zero trigger timeout: captures start immediately.
    Disabled,
    /// Falling edge on EXT1 with an infinite trigger timeout.
    ExternalFallingEdge,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Disabled => f.write_str("disabled"),
            TriggerMode::ExternalFallingEdge => f.write_str("EXT1 falling edge"),
        }
    }
}

/// What the benchmark needs from an oscilloscope session.
///
/// Setters return the value the instrument actually accepted, which may
/// differ from the one requested. Failures carry the instrument's own
/// status text.
pub trait Device {
    /// Library and instrument identification for the report header.
    fn describe(&self) -> String;

    fn channel_count(&self) -> u16;

    fn set_block_mode(&mut self) -> AcqResult<()>;

    /// Returns whether the channel ended up enabled.
    fn set_channel_enabled(&mut self, channel: u16, enabled: bool) -> bool;

    /// Returns whether the channel trigger ended up enabled.
    fn set_channel_trigger_enabled(&mut self, channel: u16, enabled: bool) -> bool;

    fn resolution(&self) -> u8;

    fn set_resolution(&mut self, bits: u8) -> u8;

    fn configure_trigger(&mut self, mode: TriggerMode) -> AcqResult<()>;

    fn set_sample_frequency(&mut self, hz: f64) -> f64;

    fn set_record_length(&mut self, samples: u64) -> u64;

    /// Makes the instrument signal `handle` whenever `event` occurs.
    ///
    /// Implementations keep `handle` until it is rebound or the device is
    /// dropped, so a driver-owned descriptor is never closed under it.
    /// Binding the same event again replaces the previous handle.
    fn bind_event(&mut self, event: AcqEvent, handle: EventHandle) -> AcqResult<()>;

    /// Starts one block acquisition. Completion is reported through the
    /// handle bound to [`AcqEvent::DataReady`].
    fn start_acquisition(&mut self) -> AcqResult<()>;

    /// Copies the completed record into every active buffer of `buffers`,
    /// in the pool's sample format.
    fn fetch_data(&mut self, buffers: &mut BufferPool) -> AcqResult<()>;
}
