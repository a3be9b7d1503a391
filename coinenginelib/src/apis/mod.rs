//! This module defines structures that are required for user-space datapath memory operations
//!
//! Errors related to pool, buffer and port operations
//!
//! Buffer geometry constants shared by the pool and the packet buffers

mod mbuf;
mod mempool;
mod port;

pub use mbuf::*;
pub use mempool::*;
pub use port::*;

use libc::{EINVAL, ENODEV, ENOMEM, ENOTSUP};
use thiserror::Error;

/// Headroom reserved in front of the packet data of every pool segment.
pub const DEFAULT_HEADROOM: usize = 128;
/// Usable packet data room of a single pool segment.
pub const MBUF_DATA_SIZE: usize = 2048;
/// Total size of one pool segment.
pub const MBUF_SIZE: usize = DEFAULT_HEADROOM + MBUF_DATA_SIZE;

#[derive(Error, Debug)]
pub enum MemoryError {
	#[error("pool capacity must not be zero")]
	Invalid,
	#[error("not enough buffers")]
	NoBuf,
	#[error("bad val")]
	BadVal, // should never hit this
}

#[derive(Error, Debug)]
pub enum BufError {
	/// The offset exceeds the buffer length
	#[error("Offset {0} exceed the buffer length {1}")]
	BadOffset(usize, usize),

	/// The buffer is not resized
	#[error("Buffer is not resized")]
	NotResized,

	/// The slice exceeds the remaining buffer length
	#[error("Slice size {0} exceeds the remaining buffer length {1}")]
	OutOfBuffer(usize, usize),
}

#[derive(Error, Debug)]
pub enum PortError {
	#[error("No such device")]
	NoDevice,
	#[error("invalid argument")]
	Invalid,
	#[error("function not supported on this device")]
	NoSupport,
	#[error("not enough memory")]
	NoMem,
	#[error("bad val")]
	BadVal,
}

impl PortError {
	/// Map the errno left behind by the last socket call.
	pub(crate) fn from_errno() -> Self {
		let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
		match errno {
			ENODEV => PortError::NoDevice,
			EINVAL => PortError::Invalid,
			ENOTSUP => PortError::NoSupport,
			ENOMEM => PortError::NoMem,
			_ => PortError::BadVal,
		}
	}
}
