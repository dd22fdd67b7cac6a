//! Error type shared by every stage of a benchmark run.
//!
//! All failures are fatal: the acquisition loop never retries. The variants
//! only exist so diagnostics can name what went wrong, and so a removed
//! device can be told apart from a software or driver fault.

use std::io;
use thiserror::Error;

/// Convenience alias for results using [`AcqError`].
pub type AcqResult<T> = std::result::Result<T, AcqError>;

#[derive(Error, Debug)]
pub enum AcqError {
    /// Event binding or device setup failed before the first cycle.
    #[error("{0}")]
    Configuration(String),

    /// The device refused to start an acquisition.
    #[error("{op} failed: {status}")]
    Start { op: &'static str, status: String },

    /// The blocking readiness wait reported an abnormal condition.
    #[error("{op} failed")]
    Wait {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The instrument signalled that it was removed.
    #[error("Device gone!")]
    DeviceGone,

    /// Data retrieval reported an abnormal status.
    #[error("{op} failed: {status}")]
    Fetch { op: &'static str, status: String },

    #[error("Out of memory allocating {bytes} bytes for Ch{}", channel + 1)]
    OutOfMemory { channel: usize, bytes: usize },
}

impl AcqError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn start(op: &'static str, status: impl Into<String>) -> Self {
        Self::Start {
            op,
            status: status.into(),
        }
    }

    pub fn fetch(op: &'static str, status: impl Into<String>) -> Self {
        Self::Fetch {
            op,
            status: status.into(),
        }
    }

    pub fn wait(op: &'static str, source: io::Error) -> Self {
        Self::Wait { op, source }
    }

    /// True when the run ended because the instrument went away rather than
    /// because of a driver or software fault.
    pub fn is_device_gone(&self) -> bool {
        matches!(self, Self::DeviceGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_operation() {
        let err = AcqError::start("ScpStart", "Not configured");
        assert_eq!(err.to_string(), "ScpStart failed: Not configured");

        let err = AcqError::fetch("ScpGetDataRaw", "Data not available");
        assert_eq!(err.to_string(), "ScpGetDataRaw failed: Data not available");

        let err = AcqError::OutOfMemory {
            channel: 1,
            bytes: 4096,
        };
        assert_eq!(err.to_string(), "Out of memory allocating 4096 bytes for Ch2");
    }

    #[test]
    fn only_removal_counts_as_device_gone() {
        assert!(AcqError::DeviceGone.is_device_gone());
        assert!(!AcqError::configuration("Can't setup trigger input EXT1").is_device_gone());
        assert!(!AcqError::wait("poll()", io::Error::other("POLLNVAL")).is_device_gone());
    }
}
