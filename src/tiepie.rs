//! Oscilloscopes driven through the TiePie engineering `libtiepie` library.

mod ffi {
    #![allow(non_upper_case_globals)]
    #![allow(non_camel_case_types)]
    #![allow(non_snake_case)]
    #![allow(dead_code)]

    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

use crate::{
    AcqError, AcqEvent, AcqResult, BufferPool, Device, EventHandle, SampleFormat, TriggerMode,
};
use log::{debug, info};
use std::{ffi::CStr, os::fd::AsRawFd};

/// `LibTiePieStatus_t` values.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Success,
    ValueClipped,
    ValueModified,
    Unsuccessful,
    NotSupported,
    InvalidHandle,
    InvalidValue,
    InvalidChannel,
    InvalidTriggerSource,
    InvalidDeviceType,
    InvalidDeviceIndex,
    InvalidProductId,
    InvalidDeviceSerialNumber,
    ObjectGone,
    Unknown(i32),
}

impl From<i32> for Status {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::ValueClipped,
            2 => Self::ValueModified,
            -1 => Self::Unsuccessful,
            -2 => Self::NotSupported,
            -3 => Self::InvalidHandle,
            -4 => Self::InvalidValue,
            -5 => Self::InvalidChannel,
            -6 => Self::InvalidTriggerSource,
            -7 => Self::InvalidDeviceType,
            -8 => Self::InvalidDeviceIndex,
            -9 => Self::InvalidProductId,
            -10 => Self::InvalidDeviceSerialNumber,
            -11 => Self::ObjectGone,
            other => Self::Unknown(other),
        }
    }
}

impl Status {
    /// Warnings (clipped or modified values) still count as success.
    pub fn is_ok(self) -> bool {
        match self {
            Self::Success | Self::ValueClipped | Self::ValueModified => true,
            Self::Unknown(code) => code >= ffi::BLOCKSPEED_STATUS_SUCCESS as i32,
            _ => false,
        }
    }
}

fn last_status() -> Status {
    Status::from(unsafe { ffi::LibGetLastStatus() } as i32)
}

fn last_status_str() -> String {
    let ptr = unsafe { ffi::LibGetLastStatusStr() };
    if ptr.is_null() {
        return format!("{:?}", last_status());
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// `LibInit` on creation, `LibExit` on drop.
struct Library;

impl Library {
    fn init() -> Self {
        unsafe { ffi::LibInit() };
        Library
    }

    fn version() -> String {
        let v = unsafe { ffi::LibGetVersion() } as u64;
        let extra = unsafe { ffi::LibGetVersionExtra() };
        let extra = if extra.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(extra) }.to_string_lossy().into_owned()
        };
        format!(
            "libtiepie v{}.{}.{}.{}{}",
            (v >> 48) & 0xffff,
            (v >> 32) & 0xffff,
            (v >> 16) & 0xffff,
            v & 0xffff,
            extra
        )
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe { ffi::LibExit() };
    }
}

pub struct TiePieScope {
    handle: ffi::LibTiePieHandle_t,
    channel_count: u16,
    // the driver writes to these descriptors until the scope is closed
    removed_event: Option<EventHandle>,
    ready_event: Option<EventHandle>,
    _library: Library,
}

impl TiePieScope {
    /// Opens the oscilloscope with `serial_number`, or the first one found
    /// when it is 0.
    pub fn open(serial_number: u32) -> AcqResult<Self> {
        let library = Library::init();
        info!("{}", Library::version());
        unsafe { ffi::LstUpdate() };

        let handle = if serial_number != 0 {
            unsafe {
                ffi::LstOpenOscilloscope(
                    ffi::BLOCKSPEED_IDKIND_SERIALNUMBER as _,
                    serial_number as _,
                )
            }
        } else {
            unsafe { ffi::LstOpenOscilloscope(ffi::BLOCKSPEED_IDKIND_INDEX as _, 0) }
        };
        if handle == ffi::BLOCKSPEED_HANDLE_INVALID as ffi::LibTiePieHandle_t {
            return Err(AcqError::configuration(format!(
                "LstOpenOscilloscope failed: {}",
                last_status_str()
            )));
        }
        let channel_count = unsafe { ffi::ScpGetChannelCount(handle) } as u16;
        debug!("Opened oscilloscope handle {handle} with {channel_count} channels");

        Ok(Self {
            handle,
            channel_count,
            removed_event: None,
            ready_event: None,
            _library: library,
        })
    }

    fn check(&self, op: &str) -> AcqResult<()> {
        if last_status().is_ok() {
            Ok(())
        } else {
            Err(AcqError::configuration(format!("{op} failed: {}", last_status_str())))
        }
    }
}

impl Drop for TiePieScope {
    fn drop(&mut self) {
        unsafe { ffi::ObjClose(self.handle) };
    }
}

fn bool8(value: bool) -> u8 {
    if value {
        ffi::BLOCKSPEED_BOOL8_TRUE as u8
    } else {
        ffi::BLOCKSPEED_BOOL8_FALSE as u8
    }
}

impl Device for TiePieScope {
    fn describe(&self) -> String {
        Library::version()
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn set_block_mode(&mut self) -> AcqResult<()> {
        let mode = unsafe { ffi::ScpSetMeasureMode(self.handle, ffi::BLOCKSPEED_MM_BLOCK as _) };
        if mode as u64 != ffi::BLOCKSPEED_MM_BLOCK as u64 {
            return Err(AcqError::configuration(format!(
                "ScpSetMeasureMode failed: {}",
                last_status_str()
            )));
        }
        Ok(())
    }

    fn set_channel_enabled(&mut self, channel: u16, enabled: bool) -> bool {
        unsafe { ffi::ScpChSetEnabled(self.handle, channel, bool8(enabled) as _) != 0 }
    }

    fn set_channel_trigger_enabled(&mut self, channel: u16, enabled: bool) -> bool {
        unsafe { ffi::ScpChTrSetEnabled(self.handle, channel, bool8(enabled) as _) != 0 }
    }

    fn resolution(&self) -> u8 {
        unsafe { ffi::ScpGetResolution(self.handle) as u8 }
    }

    fn set_resolution(&mut self, bits: u8) -> u8 {
        unsafe { ffi::ScpSetResolution(self.handle, bits as _) as u8 }
    }

    fn configure_trigger(&mut self, mode: TriggerMode) -> AcqResult<()> {
        match mode {
            TriggerMode::ExternalFallingEdge => {
                let ext1 = unsafe {
                    ffi::DevTrGetInputIndexById(self.handle, ffi::BLOCKSPEED_TIID_EXT1 as _)
                };
                let armed = ext1 as u64 != ffi::BLOCKSPEED_TRIGGERIO_INDEX_INVALID as u64
                    && unsafe { ffi::DevTrInSetEnabled(self.handle, ext1, bool8(true) as _) } != 0
                    && unsafe {
                        ffi::DevTrInSetKind(self.handle, ext1, ffi::BLOCKSPEED_TK_FALLINGEDGE as _)
                    } as u64
                        == ffi::BLOCKSPEED_TK_FALLINGEDGE as u64;
                if !armed {
                    return Err(AcqError::configuration("Can't setup trigger input EXT1"));
                }
                unsafe {
                    ffi::ScpSetTriggerTimeOut(self.handle, ffi::BLOCKSPEED_TO_INFINITY as f64)
                };
            }
            TriggerMode::Disabled => {
                unsafe { ffi::ScpSetTriggerTimeOut(self.handle, 0.0) };
            }
        }
        self.check("ScpSetTriggerTimeOut")
    }

    fn set_sample_frequency(&mut self, hz: f64) -> f64 {
        unsafe { ffi::ScpSetSampleFrequency(self.handle, hz) }
    }

    fn set_record_length(&mut self, samples: u64) -> u64 {
        unsafe { ffi::ScpSetRecordLength(self.handle, samples) }
    }

    fn bind_event(&mut self, event: AcqEvent, handle: EventHandle) -> AcqResult<()> {
        let fd = handle.as_raw_fd();
        match event {
            AcqEvent::DeviceRemoved => unsafe { ffi::DevSetEventRemoved(self.handle, fd) },
            AcqEvent::DataReady => unsafe { ffi::ScpSetEventDataReady(self.handle, fd) },
        }
        self.check(match event {
            AcqEvent::DeviceRemoved => "DevSetEventRemoved",
            AcqEvent::DataReady => "ScpSetEventDataReady",
        })?;
        let slot = match event {
            AcqEvent::DeviceRemoved => &mut self.removed_event,
            AcqEvent::DataReady => &mut self.ready_event,
        };
        *slot = Some(handle);
        Ok(())
    }

    fn start_acquisition(&mut self) -> AcqResult<()> {
        if unsafe { ffi::ScpStart(self.handle) } == 0 {
            return Err(AcqError::start("ScpStart", last_status_str()));
        }
        Ok(())
    }

    fn fetch_data(&mut self, buffers: &mut BufferPool) -> AcqResult<()> {
        let count = buffers.channel_count() as u16;
        let length = buffers.record_length() as u64;
        let mut ptrs = buffers.pointers();
        let op = match buffers.format() {
            SampleFormat::Raw { .. } => {
                unsafe { ffi::ScpGetDataRaw(self.handle, ptrs.as_mut_ptr(), count, 0, length) };
                "ScpGetDataRaw"
            }
            SampleFormat::Float => {
                unsafe { ffi::ScpGetData(self.handle, ptrs.as_mut_ptr().cast(), count, 0, length) };
                "ScpGetData"
            }
        };
        if !last_status().is_ok() {
            return Err(AcqError::fetch(op, last_status_str()));
        }
        Ok(())
    }
}
