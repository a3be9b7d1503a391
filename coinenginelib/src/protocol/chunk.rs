//! Chunk level packet helpers: classification, deep copy and L3/L4 fix ups

use etherparse::{InternetSlice, SlicedPacket, TransportSlice};
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::udp::MutableUdpPacket;
use thiserror::Error;

use super::{ETHER_HDR_LEN, IPV4_HDR_LEN, SERVICE_HEADER_LEN, UDP_HDR_LEN};
use crate::apis::{BufError, Mbuf, MemoryError, Mempool, DEFAULT_HEADROOM};

#[derive(Error, Debug)]
pub enum ChunkError {
	#[error("chunk headroom {0} is not the default {1}")]
	BadHeadroom(usize, usize),
	#[error(transparent)]
	Memory(#[from] MemoryError),
	#[error(transparent)]
	Buf(#[from] BufError),
}

/// Check if a buffer is a valid chunk.
///
/// Only the encapsulation is checked: EtherType IPv4 and next protocol UDP.
/// Port level filtering is the network plumbing's job.
pub fn is_valid_chunk(m: &Mbuf) -> bool {
	match SlicedPacket::from_ethernet(m.data()) {
		Ok(sliced) => matches!(
			(&sliced.ip, &sliced.transport),
			(
				Some(InternetSlice::Ipv4(_, _)),
				Some(TransportSlice::Udp(_))
			)
		),
		Err(_) => false,
	}
}

/// Deep copy a chunk into a buffer taken from `pool`.
///
/// The copy carries exactly the source's data bytes. The source must have the
/// default headroom and its data must fit a single segment; this pool never
/// chains segments, so scattered buffers cannot reach this path.
pub fn deepcopy_chunk(pool: &Mempool, m: &Mbuf) -> Result<Mbuf, ChunkError> {
	if m.headroom() != DEFAULT_HEADROOM {
		return Err(ChunkError::BadHeadroom(m.headroom(), DEFAULT_HEADROOM));
	}
	let mut m_copy = Mbuf::new(pool)?;
	m_copy.extend(0, m.data_len())?;
	m_copy.write_data_slice(0, m.data())?;
	Ok(m_copy)
}

/// Zero the UDP checksum, permitted for IPv4 UDP.
pub fn disable_udp_cksum(m: &mut Mbuf) {
	let off = ETHER_HDR_LEN + IPV4_HDR_LEN;
	if let Some(mut udp_hdr) = MutableUdpPacket::new(&mut m.data_mut()[off..off + UDP_HDR_LEN]) {
		udp_hdr.set_checksum(0);
	}
}

/// Zero both checksums and refresh the IPv4 header checksum.
///
/// The UDP checksum stays disabled on this data path; receivers must
/// tolerate a zero checksum.
pub fn recalc_ipv4_udp_cksum(m: &mut Mbuf) {
	disable_udp_cksum(m);
	let ip = &mut m.data_mut()[ETHER_HDR_LEN..ETHER_HDR_LEN + IPV4_HDR_LEN];
	if let Some(mut ipv4_hdr) = MutableIpv4Packet::new(ip) {
		ipv4_hdr.set_checksum(0);
		let cksum = ipv4::checksum(&ipv4_hdr.to_immutable());
		ipv4_hdr.set_checksum(cksum);
	}
}

/// Update IP and UDP total length fields with the given chunk payload length.
pub fn update_l3_l4_header(m: &mut Mbuf, payload_len: usize) {
	let udp_dgram_len = (payload_len + SERVICE_HEADER_LEN + UDP_HDR_LEN) as u16;
	let ip_total_length = udp_dgram_len + IPV4_HDR_LEN as u16;
	let off = ETHER_HDR_LEN + IPV4_HDR_LEN;
	if let Some(mut udp_hdr) = MutableUdpPacket::new(&mut m.data_mut()[off..off + UDP_HDR_LEN]) {
		udp_hdr.set_length(udp_dgram_len);
	}
	if let Some(mut ipv4_hdr) = MutableIpv4Packet::new(&mut m.data_mut()[ETHER_HDR_LEN..off]) {
		ipv4_hdr.set_total_length(ip_total_length);
	}
}
