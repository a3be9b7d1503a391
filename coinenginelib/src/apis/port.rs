//! Ports move packet buffers between a VNF loop and the outside world
//!
//! A port always has a single RX and a single TX queue. The AfPacketPort drives
//! a raw socket bound to a NIC, the same datapath the af_packet vdev uses one
//! layer up. The RingPort connects two loops in memory and backs the tests.

use std::{ffi::CString, sync::Arc};

use crossbeam_queue::ArrayQueue;

use super::{Mbuf, Mempool, PortError, MBUF_DATA_SIZE};

/// Burst oriented packet IO over one RX and one TX queue.
pub trait PacketPort {
	/// Fetch up to `max_burst` packets from the RX queue.
	fn receive(&mut self, max_burst: usize) -> Vec<Mbuf>;

	/// Send packets out of the port
	///
	/// Packets that could not be queued are freed, like the unsent tail of
	/// a hardware TX burst. Returns the number actually sent.
	fn transmit(&mut self, pkts: Vec<Mbuf>) -> usize;
}

/// A port on top of a raw AF_PACKET socket.
///
/// RX buffers are drawn from the mempool bound at open time.
pub struct AfPacketPort {
	fd: i32,
	pool: Mempool,
	device: String,
}

impl AfPacketPort {
	const ETH_P_ALL_BE: u16 = (libc::ETH_P_ALL as u16).to_be();

	pub fn open(device: &str, pool: &Mempool) -> Result<Self, PortError> {
		let fd = unsafe {
			libc::socket(
				libc::AF_PACKET,
				libc::SOCK_RAW | libc::SOCK_NONBLOCK,
				Self::ETH_P_ALL_BE as i32,
			)
		};
		if fd < 0 {
			return Err(PortError::from_errno());
		}
		let name = match CString::new(device) {
			Ok(n) => n,
			Err(_) => {
				unsafe { libc::close(fd) };
				return Err(PortError::Invalid);
			}
		};
		let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
		if ifindex == 0 {
			unsafe { libc::close(fd) };
			return Err(PortError::NoDevice);
		}
		let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
		addr.sll_family = libc::AF_PACKET as u16;
		addr.sll_protocol = Self::ETH_P_ALL_BE;
		addr.sll_ifindex = ifindex as i32;
		let rc = unsafe {
			libc::bind(
				fd,
				&addr as *const libc::sockaddr_ll as *const libc::sockaddr,
				std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
			)
		};
		if rc < 0 {
			let err = PortError::from_errno();
			unsafe { libc::close(fd) };
			return Err(err);
		}
		log::info!("port {} bound (ifindex {})", device, ifindex);
		Ok(Self {
			fd,
			pool: pool.clone(),
			device: device.to_owned(),
		})
	}

	/// Duplicate the port handle so RX and TX can be driven separately.
	pub fn try_clone(&self) -> Result<Self, PortError> {
		let fd = unsafe { libc::dup(self.fd) };
		if fd < 0 {
			return Err(PortError::from_errno());
		}
		Ok(Self {
			fd,
			pool: self.pool.clone(),
			device: self.device.clone(),
		})
	}

	/// Get user device name
	pub fn get_name(&self) -> &str {
		&self.device
	}
}

impl PacketPort for AfPacketPort {
	fn receive(&mut self, max_burst: usize) -> Vec<Mbuf> {
		let mut pkts = Vec::with_capacity(max_burst);
		let mut frame = [0u8; MBUF_DATA_SIZE];
		while pkts.len() < max_burst {
			let n = unsafe {
				libc::recv(
					self.fd,
					frame.as_mut_ptr() as *mut libc::c_void,
					frame.len(),
					libc::MSG_DONTWAIT,
				)
			};
			if n <= 0 {
				break; // an empty queue shows up as EAGAIN
			}
			match Mbuf::from_bytes(&frame[..n as usize], &self.pool) {
				Ok(m) => pkts.push(m),
				Err(e) => {
					log::error!("rx buffer allocation failed: {}", e);
					break;
				}
			}
		}
		pkts
	}

	fn transmit(&mut self, pkts: Vec<Mbuf>) -> usize {
		let mut sent = 0;
		for pkt in &pkts {
			let data = pkt.data();
			let n = unsafe {
				libc::send(self.fd, data.as_ptr() as *const libc::c_void, data.len(), 0)
			};
			if n < 0 {
				break;
			}
			sent += 1;
		}
		// every packet, sent or not, goes back to its pool here
		sent
	}
}

impl Drop for AfPacketPort {
	fn drop(&mut self) {
		unsafe { libc::close(self.fd) };
	}
}

/// One direction of an in-memory port, shared between two endpoints.
pub type PktRing = Arc<ArrayQueue<Mbuf>>;

/// Create a packet ring holding up to `capacity` buffers.
pub fn pkt_ring(capacity: usize) -> PktRing {
	Arc::new(ArrayQueue::new(capacity))
}

/// A port backed by two shared rings instead of a NIC
pub struct RingPort {
	rx_ring: PktRing,
	tx_ring: PktRing,
}

impl RingPort {
	pub fn new(rx_ring: PktRing, tx_ring: PktRing) -> Self {
		Self { rx_ring, tx_ring }
	}
}

impl PacketPort for RingPort {
	fn receive(&mut self, max_burst: usize) -> Vec<Mbuf> {
		let mut pkts = Vec::with_capacity(max_burst);
		while pkts.len() < max_burst {
			match self.rx_ring.pop() {
				Some(pkt) => pkts.push(pkt),
				None => break,
			}
		}
		pkts
	}

	fn transmit(&mut self, pkts: Vec<Mbuf>) -> usize {
		let mut sent = 0;
		for pkt in pkts {
			match self.tx_ring.push(pkt) {
				Ok(()) => sent += 1,
				Err(_dropped) => break, // ring full: the rest is freed on drop
			}
		}
		sent
	}
}
