use crate::{AcquisitionSession, AcquisitionStats, TriggerMode};
use log::info;
use std::io::{self, Write};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Channel states and the accepted acquisition parameters.
pub fn write_session<W: Write>(out: &mut W, session: &AcquisitionSession) -> io::Result<()> {
    writeln!(out, "Active channel count: {}", session.active_channels)?;
    for ch in &session.channels {
        writeln!(out, "  Ch{}: {}", ch.index + 1, state(ch.enabled))?;
        writeln!(out, "  Ch{} trigger: {}", ch.index + 1, state(ch.trigger_enabled))?;
    }
    match session.trigger {
        TriggerMode::ExternalFallingEdge => {
            writeln!(out, "Enabled EXT1 falling edge trigger")?;
            writeln!(out, "Disabled trigger timeout")?;
        }
        TriggerMode::Disabled => writeln!(out, "Disabled trigger system")?,
    }
    writeln!(out, "Sample frequency: {:.6} MHz", session.sample_frequency / 1e6)?;
    writeln!(out, "Resolution: {} bit", session.resolution)?;
    writeln!(out, "Record length: {} Samples", session.record_length)?;
    writeln!(out, "Measurement duration: {:.6} s", session.measurement_duration())?;
    writeln!(out, "Data type: {}", session.representation)
}

/// The final throughput block. Rates that cannot be computed are printed as
/// `undefined`.
pub fn write_result<W: Write>(out: &mut W, stats: &AcquisitionStats) -> io::Result<()> {
    writeln!(out, "\nResult:")?;
    writeln!(
        out,
        "  Performed {} measurements in {:.6}s",
        stats.cycles,
        stats.elapsed_secs()
    )?;
    writeln!(
        out,
        "  Average of {}s per measurement",
        fixed(stats.average_duration())
    )?;
    writeln!(
        out,
        "  Average of {} measurements per second",
        fixed(stats.rate())
    )?;
    writeln!(out, "  Average of {} MB/s", fixed(stats.data_rate()))
}

/// Logs the wall-clock start of a run.
pub fn log_run_start(measurements: u32) {
    let now = OffsetDateTime::now_utc();
    let stamp = now.format(&Rfc3339).unwrap_or_else(|_| now.to_string());
    info!("Run of {measurements} measurements started at {stamp}");
}

fn state(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn fixed(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.6}"),
        None => "undefined".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Channel, Representation};
    use std::time::Duration;

    fn session() -> AcquisitionSession {
        AcquisitionSession {
            channels: (0..4)
                .map(|index| Channel {
                    index,
                    enabled: index < 2,
                    trigger_enabled: false,
                })
                .collect(),
            active_channels: 2,
            resolution: 12,
            sample_frequency: 1e6,
            record_length: 5000,
            representation: Representation::Raw,
            trigger: TriggerMode::Disabled,
            measurements: 100,
        }
    }

    #[test]
    fn session_summary_lists_every_channel() {
        let mut out = Vec::new();
        write_session(&mut out, &session()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Active channel count: 2\n"));
        assert!(text.contains("  Ch2: enabled\n"));
        assert!(text.contains("  Ch3: disabled\n"));
        assert!(text.contains("  Ch4 trigger: disabled\n"));
        assert!(text.contains("Disabled trigger system\n"));
        assert!(text.contains("Sample frequency: 1.000000 MHz\n"));
        assert!(text.contains("Resolution: 12 bit\n"));
        assert!(text.contains("Record length: 5000 Samples\n"));
        assert!(text.contains("Measurement duration: 0.005000 s\n"));
        assert!(text.ends_with("Data type: raw\n"));
    }

    #[test]
    fn result_block_reports_rates() {
        let stats = AcquisitionStats::compute(100, 0, Duration::from_secs(2));
        let mut out = Vec::new();
        write_result(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Performed 100 measurements in 2.000000s"));
        assert!(text.contains("Average of 0.020000s per measurement"));
        assert!(text.contains("Average of 50.000000 measurements per second"));
    }

    #[test]
    fn zero_elapsed_prints_undefined_rate() {
        let stats = AcquisitionStats::compute(3, 0, Duration::ZERO);
        let mut out = Vec::new();
        write_result(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Average of undefined measurements per second"));
        assert!(text.contains("Average of undefined MB/s"));
    }
}
