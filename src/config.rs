use crate::Representation;
use confique::Config;
use log::LevelFilter;
use std::path::Path;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(default = "warn")]
    pub log_level: LevelFilter,
    #[config(nested)]
    pub acquisition: AcquisitionSettings,
    #[config(nested)]
    pub simulator: SimulatorSettings,
}

impl Conf {
    /// Defaults, overridden by `path` (TOML) if given, overridden by the
    /// `BLOCKSPEED_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self, confique::Error> {
        let mut builder = Conf::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        builder.load()
    }
}

#[derive(Config, Debug, Clone)]
pub struct AcquisitionSettings {
    /// Bits per sample; 0 keeps the instrument's current resolution.
    #[config(default = 0, env = "BLOCKSPEED_RESOLUTION")]
    pub resolution: u8,
    /// 0 or more than the instrument has means all channels.
    #[config(default = 0, env = "BLOCKSPEED_ACTIVE_CHANNELS")]
    pub active_channels: u16,
    /// Hz
    #[config(default = 1000000.0, env = "BLOCKSPEED_SAMPLE_FREQUENCY")]
    pub sample_frequency: f64,
    /// Samples per channel per cycle.
    #[config(default = 5000, env = "BLOCKSPEED_RECORD_LENGTH")]
    pub record_length: u64,
    #[config(default = 100, env = "BLOCKSPEED_MEASUREMENTS")]
    pub measurements: u32,
    /// 0 opens the first instrument found.
    #[config(default = 0, env = "BLOCKSPEED_SERIAL_NUMBER")]
    pub serial_number: u32,
    #[config(default = "float", env = "BLOCKSPEED_REPRESENTATION")]
    pub representation: Representation,
    #[config(default = false, env = "BLOCKSPEED_EXTERNAL_TRIGGER")]
    pub external_trigger: bool,
}

/// Properties of the built-in simulated oscilloscope.
#[derive(Config, Debug, Clone)]
pub struct SimulatorSettings {
    #[config(default = 4)]
    pub channel_count: u16,
    /// Resolution before any is requested.
    #[config(default = 8)]
    pub resolution: u8,
    #[config(default = [8, 12, 14, 16])]
    pub resolutions: Vec<u8>,
    #[config(default = 200000000.0)]
    pub max_sample_frequency: f64,
    #[config(default = 67108864)]
    pub max_record_length: u64,
    #[config(default = true)]
    pub has_ext1: bool,
    /// Multiplies the simulated capture time of `record_length /
    /// sample_frequency`; 0 makes data ready immediately.
    #[config(default = 1.0)]
    pub time_scale: f64,
    #[config(default = 0)]
    pub seed: u64,
    /// Raise "device removed" instead of "data ready" on this cycle (1-based).
    pub remove_on_cycle: Option<u32>,
    /// Refuse the start of this cycle (1-based).
    pub fail_start_on_cycle: Option<u32>,
    /// Fail the fetch of this cycle (1-based).
    pub fail_fetch_on_cycle: Option<u32>,
}
