//! Pack and unpack the chunk service header
//!
//! Multi-byte fields are big-endian on the wire and host order in memory.
//! This codec is the only place where that conversion happens.

use std::fmt;

use crate::apis::Mbuf;

/// Ethernet II header length.
pub const ETHER_HDR_LEN: usize = 14;
/// IPv4 header length (no options on this data path).
pub const IPV4_HDR_LEN: usize = 20;
/// UDP header length.
pub const UDP_HDR_LEN: usize = 8;

/// Offset of the service header behind the protocol stack.
pub const SERVICE_HEADER_OFFSET: usize = ETHER_HDR_LEN + IPV4_HDR_LEN + UDP_HDR_LEN;
/// On-wire size of the service header.
pub const SERVICE_HEADER_LEN: usize = 16;
/// Total length of all headers in front of the chunk payload.
pub const ALL_HEADERS_LEN: usize = SERVICE_HEADER_OFFSET + SERVICE_HEADER_LEN;

/// Maximal payload bytes carried by one chunk.
pub const MAX_CHUNK_SIZE: usize = 1400;
/// Wire length of a chunk carrying a maximal payload.
pub const FULL_CHUNK_SIZE: usize = ALL_HEADERS_LEN + MAX_CHUNK_SIZE;

/// Burst size for both RX and TX.
pub const BURST_SIZE: usize = 128;

/// Host order view of the chunk service header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceHeader {
	/// 0: raw data (X), 1: intermediate or final result (uW).
	pub msg_type: u8,
	/// Bit 0 set means the iteration produced the final result.
	pub msg_flags: u8,
	pub total_msg_num: u16,
	pub msg_num: u16,
	pub total_chunk_num: u16,
	pub chunk_num: u16,
	/// Payload length including the service header itself.
	pub chunk_len: u16,
	pub data_chunk_num: u16,
	pub iter_num: u16,
}

impl ServiceHeader {
	/// Decode the 16 on-wire bytes into host order fields.
	pub fn from_bytes(b: &[u8; SERVICE_HEADER_LEN]) -> Self {
		Self {
			msg_type: b[0],
			msg_flags: b[1],
			total_msg_num: u16::from_be_bytes([b[2], b[3]]),
			msg_num: u16::from_be_bytes([b[4], b[5]]),
			total_chunk_num: u16::from_be_bytes([b[6], b[7]]),
			chunk_num: u16::from_be_bytes([b[8], b[9]]),
			chunk_len: u16::from_be_bytes([b[10], b[11]]),
			data_chunk_num: u16::from_be_bytes([b[12], b[13]]),
			iter_num: u16::from_be_bytes([b[14], b[15]]),
		}
	}

	/// Encode the header into its 16 on-wire bytes.
	pub fn to_bytes(&self) -> [u8; SERVICE_HEADER_LEN] {
		let mut b = [0u8; SERVICE_HEADER_LEN];
		b[0] = self.msg_type;
		b[1] = self.msg_flags;
		b[2..4].copy_from_slice(&self.total_msg_num.to_be_bytes());
		b[4..6].copy_from_slice(&self.msg_num.to_be_bytes());
		b[6..8].copy_from_slice(&self.total_chunk_num.to_be_bytes());
		b[8..10].copy_from_slice(&self.chunk_num.to_be_bytes());
		b[10..12].copy_from_slice(&self.chunk_len.to_be_bytes());
		b[12..14].copy_from_slice(&self.data_chunk_num.to_be_bytes());
		b[14..16].copy_from_slice(&self.iter_num.to_be_bytes());
		b
	}
}

impl fmt::Display for ServiceHeader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"type={} flags={} msg={}/{} chunk={}/{} len={} iter={}",
			self.msg_type,
			self.msg_flags,
			self.msg_num,
			self.total_msg_num,
			self.chunk_num,
			self.total_chunk_num,
			self.chunk_len,
			self.iter_num
		)
	}
}

/// Read the service header of a chunk.
///
/// The caller guarantees the buffer holds all protocol headers.
pub fn unpack_service_header(m: &Mbuf) -> ServiceHeader {
	let mut b = [0u8; SERVICE_HEADER_LEN];
	b.copy_from_slice(&m.data()[SERVICE_HEADER_OFFSET..ALL_HEADERS_LEN]);
	ServiceHeader::from_bytes(&b)
}

/// Write the service header of a chunk in wire order.
pub fn pack_service_header(m: &mut Mbuf, hdr: &ServiceHeader) {
	m.data_mut()[SERVICE_HEADER_OFFSET..ALL_HEADERS_LEN].copy_from_slice(&hdr.to_bytes());
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::apis::Mempool;

	fn sample_header(seed: u16) -> ServiceHeader {
		ServiceHeader {
			msg_type: (seed % 2) as u8,
			msg_flags: ((seed >> 1) % 2) as u8,
			total_msg_num: seed.wrapping_mul(3),
			msg_num: seed.wrapping_add(7),
			total_chunk_num: seed.wrapping_mul(5),
			chunk_num: seed.wrapping_add(11),
			chunk_len: seed.wrapping_mul(9),
			data_chunk_num: seed.wrapping_add(13),
			iter_num: seed.wrapping_mul(17),
		}
	}

	#[test]
	fn header_roundtrip() {
		for seed in [0u16, 1, 2, 41, 255, 256, 1023, 31337, u16::MAX] {
			let hdr = sample_header(seed);
			assert_eq!(ServiceHeader::from_bytes(&hdr.to_bytes()), hdr);
		}
	}

	#[test]
	fn packed_fields_are_network_order() {
		let hdr = ServiceHeader {
			total_chunk_num: 0x0102,
			chunk_num: 0x0304,
			chunk_len: 0x0506,
			iter_num: 0x0708,
			..Default::default()
		};
		let b = hdr.to_bytes();
		assert_eq!(&b[6..8], &[0x01, 0x02]);
		assert_eq!(&b[8..10], &[0x03, 0x04]);
		assert_eq!(&b[10..12], &[0x05, 0x06]);
		assert_eq!(&b[14..16], &[0x07, 0x08]);
	}

	#[test]
	fn pack_unpack_through_mbuf() {
		let pool = Mempool::new("hdr_pool", 2).unwrap();
		let mut m = Mbuf::from_bytes(&[0u8; ALL_HEADERS_LEN], &pool).unwrap();
		let hdr = sample_header(77);
		pack_service_header(&mut m, &hdr);
		assert_eq!(unpack_service_header(&m), hdr);
	}
}
