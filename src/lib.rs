//! Block-mode acquisition throughput benchmark.
//!
//! Repeatedly starts one block acquisition on an oscilloscope, waits for the
//! instrument to report "data ready" (or "device removed"), fetches every
//! active channel into reusable buffers and reports measurements per second.

mod acquisition;
mod buffer;
mod config;
mod device;
mod error;
mod event;
pub mod report;
mod session;
mod sim;
#[cfg(all(feature = "libtiepie", unix))]
mod tiepie;
mod utils;

pub use acquisition::*;
pub use buffer::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use event::{AcqEvent, EventHandle, EventWaiter, FiredEvents};
pub use session::*;
pub use sim::*;
#[cfg(all(feature = "libtiepie", unix))]
pub use tiepie::*;
pub use utils::*;
