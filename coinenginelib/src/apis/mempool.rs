//! The Mempool struct is a named pool of preallocated packet buffer segments
//!
//! The freelist is a lockless ring, so pool handles can be cloned and shared
//! the same way a DPDK mempool is shared between lcores

use std::{fmt, sync::Arc};

use crossbeam_queue::ArrayQueue;

use super::{MemoryError, MBUF_SIZE};

pub(crate) struct PoolInner {
	name: String,
	ring: ArrayQueue<Vec<u8>>,
	capacity: usize,
}

/// A shared handle to a fixed-capacity segment pool.
#[derive(Clone)]
pub struct Mempool {
	inner: Arc<PoolInner>,
}

impl Mempool {
	/// Create a pool of `capacity` segments, all allocated up front.
	pub fn new(name: &str, capacity: usize) -> Result<Self, MemoryError> {
		if capacity == 0 {
			return Err(MemoryError::Invalid);
		}
		let ring = ArrayQueue::new(capacity);
		for _ in 0..capacity {
			// the ring was sized for exactly `capacity` segments
			if ring.push(vec![0u8; MBUF_SIZE]).is_err() {
				return Err(MemoryError::BadVal);
			}
		}
		log::info!("created mempool: {} ({} segments)", name, capacity);
		Ok(Self {
			inner: Arc::new(PoolInner {
				name: name.to_owned(),
				ring,
				capacity,
			}),
		})
	}

	/// Returns the name of the mempool
	#[inline]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Total number of segments owned by this pool.
	#[inline]
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	/// Number of segments currently handed out as `Mbuf`s.
	#[inline]
	pub fn in_use(&self) -> usize {
		self.inner.capacity - self.inner.ring.len()
	}

	pub(crate) fn take_seg(&self) -> Result<Vec<u8>, MemoryError> {
		self.inner.ring.pop().ok_or(MemoryError::NoBuf)
	}

	pub(crate) fn put_seg(&self, seg: Vec<u8>) {
		// every segment returned here was taken from this ring before
		let _ = self.inner.ring.push(seg);
	}
}

impl fmt::Debug for Mempool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct(self.name())
			.field("capacity", &self.capacity())
			.field("in use", &self.in_use())
			.finish()
	}
}
