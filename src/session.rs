use crate::{
    AcqResult, AcquisitionSettings, BufferPool, Device, Representation, SampleFormat, TriggerMode,
};
use log::info;

/// One input channel as configured for the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel {
    pub index: u16,
    pub enabled: bool,
    pub trigger_enabled: bool,
}

/// Parameters fixed for the whole benchmark run. Frequency and record length
/// are the values the instrument accepted, not the requested ones.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionSession {
    pub channels: Vec<Channel>,
    pub active_channels: u16,
    pub resolution: u8,
    pub sample_frequency: f64,
    pub record_length: u64,
    pub representation: Representation,
    pub trigger: TriggerMode,
    pub measurements: u32,
}

impl AcquisitionSession {
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::new(self.representation, self.resolution)
    }

    /// Seconds of signal captured per cycle.
    pub fn measurement_duration(&self) -> f64 {
        self.record_length as f64 / self.sample_frequency
    }

    pub fn allocate_buffers(&self) -> AcqResult<BufferPool> {
        BufferPool::allocate(
            usize::from(self.channel_count()),
            usize::from(self.active_channels),
            self.record_length,
            self.sample_format(),
        )
    }
}

/// 0, or more channels than the instrument has, selects all of them.
pub fn effective_active_channels(requested: u16, channel_count: u16) -> u16 {
    if requested == 0 || requested > channel_count {
        channel_count
    } else {
        requested
    }
}

/// Puts the instrument in block mode and applies `settings`.
pub fn configure<D: Device + ?Sized>(
    device: &mut D,
    settings: &AcquisitionSettings,
) -> AcqResult<AcquisitionSession> {
    let channel_count = device.channel_count();
    device.set_block_mode()?;

    let active_channels = effective_active_channels(settings.active_channels, channel_count);
    info!("Active channel count: {active_channels}");
    let channels = (0..channel_count)
        .map(|index| {
            let enabled = device.set_channel_enabled(index, index < active_channels);
            let trigger_enabled = device.set_channel_trigger_enabled(index, false);
            Channel {
                index,
                enabled,
                trigger_enabled,
            }
        })
        .collect();

    if settings.resolution != 0 {
        let accepted = device.set_resolution(settings.resolution);
        if accepted != settings.resolution {
            info!("Requested {} bit, instrument kept {accepted} bit", settings.resolution);
        }
    }

    let trigger = if settings.external_trigger {
        TriggerMode::ExternalFallingEdge
    } else {
        TriggerMode::Disabled
    };
    device.configure_trigger(trigger)?;
    info!("Trigger: {trigger}");

    let sample_frequency = device.set_sample_frequency(settings.sample_frequency);
    let resolution = device.resolution();
    let record_length = device.set_record_length(settings.record_length);
    info!(
        "Accepted {sample_frequency} Hz (requested {}), {record_length} samples (requested {})",
        settings.sample_frequency, settings.record_length
    );

    Ok(AcquisitionSession {
        channels,
        active_channels,
        resolution,
        sample_frequency,
        record_length,
        representation: settings.representation,
        trigger,
        measurements: settings.measurements,
    })
}
