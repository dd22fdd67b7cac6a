//! Argument parsing for running from the command line

use blockspeed::{Conf, Representation};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Resolution in bits
    #[arg(short = 'b', value_name = "RESOLUTION")]
    pub resolution: Option<u8>,
    /// Active channel count (0 = all)
    #[arg(short = 'c', value_name = "COUNT")]
    pub active_channels: Option<u16>,
    /// Sample frequency in Hz
    #[arg(short = 'f', value_name = "HZ")]
    pub sample_frequency: Option<f64>,
    /// Record length in samples
    #[arg(short = 'l', value_name = "SAMPLES")]
    pub record_length: Option<u64>,
    /// Number of measurements
    #[arg(short = 'n', value_name = "COUNT")]
    pub measurements: Option<u32>,
    /// Serial number of the instrument to open
    #[arg(short = 's', value_name = "SERIAL")]
    pub serial_number: Option<u32>,
    /// Fetch raw (packed) samples instead of floats
    #[arg(short = 'r')]
    pub raw: bool,
    /// Enable EXT1 falling edge trigger with infinite timeout
    #[arg(short = 'e')]
    pub external_trigger: bool,
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Use the built-in simulated oscilloscope
    #[arg(long)]
    pub simulate: bool,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Command-line values win over the configuration file and environment.
    pub fn apply(&self, conf: &mut Conf) {
        let acq = &mut conf.acquisition;
        if let Some(v) = self.resolution {
            acq.resolution = v;
        }
        if let Some(v) = self.active_channels {
            acq.active_channels = v;
        }
        if let Some(v) = self.sample_frequency {
            acq.sample_frequency = v;
        }
        if let Some(v) = self.record_length {
            acq.record_length = v;
        }
        if let Some(v) = self.measurements {
            acq.measurements = v;
        }
        if let Some(v) = self.serial_number {
            acq.serial_number = v;
        }
        if self.raw {
            acq.representation = Representation::Raw;
        }
        if self.external_trigger {
            acq.external_trigger = true;
        }
        conf.log_level = verbosity(conf.log_level, self.verbose);
    }
}

/// Each `-v` raises the configured level by one step.
fn verbosity(base: LevelFilter, count: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 6] = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let start = LEVELS.iter().position(|l| *l == base).unwrap_or(2);
    LEVELS[(start + usize::from(count)).min(LEVELS.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use confique::Config;

    #[test]
    fn flags_override_configuration() {
        let args = Args::parse_from([
            "blockspeed", "-b", "12", "-c", "2", "-f", "5e6", "-l", "1000", "-n", "7", "-s",
            "27917", "-r", "-e", "-vv",
        ]);
        let mut conf = Conf::builder().load().unwrap();
        args.apply(&mut conf);

        let acq = &conf.acquisition;
        assert_eq!(acq.resolution, 12);
        assert_eq!(acq.active_channels, 2);
        assert_eq!(acq.sample_frequency, 5e6);
        assert_eq!(acq.record_length, 1000);
        assert_eq!(acq.measurements, 7);
        assert_eq!(acq.serial_number, 27917);
        assert_eq!(acq.representation, Representation::Raw);
        assert!(acq.external_trigger);
        assert_eq!(conf.log_level, LevelFilter::Debug);
    }

    #[test]
    fn absent_flags_keep_configuration() {
        let args = Args::parse_from(["blockspeed"]);
        let mut conf = Conf::builder().load().unwrap();
        conf.acquisition.record_length = 42;
        args.apply(&mut conf);
        assert_eq!(conf.acquisition.record_length, 42);
        assert_eq!(conf.acquisition.representation, Representation::Float);
        assert_eq!(conf.log_level, LevelFilter::Warn);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(Args::try_parse_from(["blockspeed", "-x"]).is_err());
    }

    #[test]
    fn verbosity_saturates_at_trace() {
        assert_eq!(verbosity(LevelFilter::Warn, 9), LevelFilter::Trace);
        assert_eq!(verbosity(LevelFilter::Off, 1), LevelFilter::Error);
    }
}
