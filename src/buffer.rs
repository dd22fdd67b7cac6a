use crate::{AcqError, AcqResult};
use log::debug;
use serde::Deserialize;
use std::{ffi::c_void, fmt, ptr};

/// How the device hands samples over: packed ADC codes or IEEE floats.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    #[default]
    Float,
    Raw,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Float => f.write_str("float"),
            Representation::Raw => f.write_str("raw"),
        }
    }
}

/// Sample layout fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// `bytes` is `ceil(resolution / 8)`.
    Raw { bytes: usize },
    Float,
}

impl SampleFormat {
    pub fn new(representation: Representation, resolution: u8) -> Self {
        match representation {
            Representation::Raw => Self::raw(resolution),
            Representation::Float => Self::Float,
        }
    }

    pub fn raw(resolution: u8) -> Self {
        Self::Raw {
            bytes: usize::from(resolution).div_ceil(8),
        }
    }

    /// Bytes per sample.
    pub fn sample_size(self) -> usize {
        match self {
            Self::Raw { bytes } => bytes,
            Self::Float => std::mem::size_of::<f32>(),
        }
    }

    pub fn representation(self) -> Representation {
        match self {
            Self::Raw { .. } => Representation::Raw,
            Self::Float => Representation::Float,
        }
    }
}

/// Storage for one channel's record.
#[derive(Debug)]
pub enum ChannelBuffer {
    Raw(Vec<u8>),
    Float(Vec<f32>),
}

impl ChannelBuffer {
    fn allocate(channel: usize, record_length: usize, format: SampleFormat) -> AcqResult<Self> {
        let sample_size = format.sample_size();
        let oom = || AcqError::OutOfMemory {
            channel,
            bytes: record_length.saturating_mul(sample_size),
        };
        let bytes = record_length.checked_mul(sample_size).ok_or_else(oom)?;
        match format {
            SampleFormat::Raw { .. } => {
                let mut data = Vec::new();
                data.try_reserve_exact(bytes).map_err(|_| oom())?;
                data.resize(bytes, 0);
                Ok(Self::Raw(data))
            }
            SampleFormat::Float => {
                let mut data = Vec::new();
                data.try_reserve_exact(record_length).map_err(|_| oom())?;
                data.resize(record_length, 0.0);
                Ok(Self::Float(data))
            }
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(data) => Some(data),
            Self::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            Self::Float(data) => Some(data),
            Self::Raw(_) => None,
        }
    }

    pub fn as_raw_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Raw(data) => Some(data),
            Self::Float(_) => None,
        }
    }

    pub fn as_float_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            Self::Float(data) => Some(data),
            Self::Raw(_) => None,
        }
    }

    /// Size of the region in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Raw(data) => data.len(),
            Self::Float(data) => std::mem::size_of_val(data.as_slice()),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            Self::Raw(data) => data.as_mut_ptr().cast(),
            Self::Float(data) => data.as_mut_ptr().cast(),
        }
    }
}

/// Per-channel sample storage for one acquisition cycle.
///
/// Holds one [`ChannelBuffer`] for every active channel and `None` for every
/// inactive one. Buffers are sized once and reused by every cycle; each fetch
/// overwrites them in place.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<Option<ChannelBuffer>>,
    record_length: usize,
    format: SampleFormat,
}

impl BufferPool {
    /// Allocates `record_length * sample_size` bytes for each channel below
    /// `active_count`. If any allocation fails, everything allocated so far
    /// is dropped before the error is returned.
    pub fn allocate(
        channel_count: usize,
        active_count: usize,
        record_length: u64,
        format: SampleFormat,
    ) -> AcqResult<Self> {
        if format.sample_size() == 0 {
            return Err(AcqError::configuration("Sample size of 0 bytes"));
        }
        let record_length = usize::try_from(record_length).map_err(|_| AcqError::OutOfMemory {
            channel: 0,
            bytes: usize::MAX,
        })?;

        let mut buffers = Vec::with_capacity(channel_count);
        for channel in 0..channel_count {
            if channel < active_count {
                buffers.push(Some(ChannelBuffer::allocate(channel, record_length, format)?));
            } else {
                buffers.push(None);
            }
        }

        let pool = Self {
            buffers,
            record_length,
            format,
        };
        debug!(
            "Allocated {} of {} channel buffers, {} bytes each",
            pool.active_count(),
            channel_count,
            record_length * format.sample_size()
        );
        Ok(pool)
    }

    /// Frees every buffer. Safe to call any number of times.
    pub fn release_all(&mut self) {
        let mut released = 0;
        for slot in &mut self.buffers {
            if slot.take().is_some() {
                released += 1;
            }
        }
        if released > 0 {
            debug!("Released {released} channel buffers");
        }
    }

    pub fn channel_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of channels that currently own a buffer.
    pub fn active_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// `None` for inactive channels and for out-of-range indices.
    pub fn get(&self, channel: usize) -> Option<&ChannelBuffer> {
        self.buffers.get(channel).and_then(Option::as_ref)
    }

    /// Active channels with their index.
    pub fn active_mut(&mut self) -> impl Iterator<Item = (usize, &mut ChannelBuffer)> {
        self.buffers
            .iter_mut()
            .enumerate()
            .filter_map(|(channel, slot)| slot.as_mut().map(|buffer| (channel, buffer)))
    }

    /// One pointer per channel, null for inactive channels, in the layout
    /// native `GetData` style calls expect. Valid until the pool is next
    /// borrowed mutably.
    pub fn pointers(&mut self) -> Vec<*mut c_void> {
        self.buffers
            .iter_mut()
            .map(|slot| slot.as_mut().map_or(ptr::null_mut(), ChannelBuffer::as_mut_ptr))
            .collect()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sample_size_rounds_resolution_up_to_bytes() {
        assert_eq!(SampleFormat::raw(8).sample_size(), 1);
        assert_eq!(SampleFormat::raw(12).sample_size(), 2);
        assert_eq!(SampleFormat::raw(14).sample_size(), 2);
        assert_eq!(SampleFormat::raw(16).sample_size(), 2);
        assert_eq!(SampleFormat::raw(20).sample_size(), 3);
        assert_eq!(SampleFormat::Float.sample_size(), 4);
    }

    #[test]
    fn allocates_only_active_channels() {
        let pool = BufferPool::allocate(4, 2, 5000, SampleFormat::Float).unwrap();
        assert_eq!(pool.channel_count(), 4);
        assert_eq!(pool.active_count(), 2);
        for channel in 0..2 {
            let buffer = pool.get(channel).unwrap();
            assert_eq!(buffer.as_float().unwrap().len(), 5000);
            assert_eq!(buffer.byte_len(), 5000 * std::mem::size_of::<f32>());
        }
        assert!(pool.get(2).is_none());
        assert!(pool.get(3).is_none());
        assert!(pool.get(4).is_none());
    }

    #[test]
    fn raw_buffers_hold_packed_codes() {
        let pool = BufferPool::allocate(2, 2, 1000, SampleFormat::raw(12)).unwrap();
        assert_eq!(pool.get(1).unwrap().as_raw().unwrap().len(), 2000);
        assert!(pool.get(1).unwrap().as_float().is_none());
    }

    #[test]
    fn pointer_table_marks_inactive_channels_null() {
        let mut pool = BufferPool::allocate(3, 1, 16, SampleFormat::raw(8)).unwrap();
        let ptrs = pool.pointers();
        assert_eq!(ptrs.len(), 3);
        assert!(!ptrs[0].is_null());
        assert!(ptrs[1].is_null());
        assert!(ptrs[2].is_null());
    }

    #[test]
    fn release_all_is_idempotent() {
        let mut pool = BufferPool::allocate(4, 4, 128, SampleFormat::Float).unwrap();
        pool.release_all();
        assert_eq!(pool.active_count(), 0);
        pool.release_all();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.channel_count(), 4);
    }

    #[test]
    fn impossible_allocation_reports_out_of_memory() {
        let err = BufferPool::allocate(2, 2, u64::MAX / 2, SampleFormat::Float).unwrap_err();
        assert!(matches!(err, AcqError::OutOfMemory { channel: 0, .. }));
    }

    #[test]
    fn zero_sample_size_is_rejected() {
        let err = BufferPool::allocate(1, 1, 10, SampleFormat::raw(0)).unwrap_err();
        assert!(matches!(err, AcqError::Configuration(_)));
    }
}
