//! Buffering, validation and (de)fragmentation of the chunks of one message
//!
//! The assembler owns every buffered chunk. Chunks enter from the receive loop
//! and leave either to the TX path or back to their pool.

use thiserror::Error;

use super::{
	deepcopy_chunk, pack_service_header, update_l3_l4_header, ChunkError, ServiceHeader,
	ALL_HEADERS_LEN, FULL_CHUNK_SIZE, MAX_CHUNK_SIZE, SERVICE_HEADER_LEN, SERVICE_HEADER_OFFSET,
};
use crate::apis::{Mbuf, Mempool};

#[derive(Error, Debug)]
pub enum AssembleError {
	#[error("message advertises {0} chunks but {1} arrived, chunk loss is not recoverable")]
	LostChunks(usize, usize),
	#[error(transparent)]
	Chunk(#[from] ChunkError),
}

/// Chunks of one in-flight message together with their decoded headers.
///
/// Both sequences always have the same length and the same ordering.
#[derive(Default)]
pub struct ChunkAssembler {
	chunks: Vec<Mbuf>,
	hdrs: Vec<ServiceHeader>,
}

impl ChunkAssembler {
	pub fn new() -> Self {
		Self {
			chunks: Vec::new(),
			hdrs: Vec::new(),
		}
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	/// Append a chunk and its decoded header.
	pub fn push(&mut self, m: Mbuf, hdr: ServiceHeader) {
		self.chunks.push(m);
		self.hdrs.push(hdr);
	}

	#[inline]
	pub fn first_hdr(&self) -> Option<&ServiceHeader> {
		self.hdrs.first()
	}

	#[inline]
	pub fn last_hdr(&self) -> Option<&ServiceHeader> {
		self.hdrs.last()
	}

	/// First buffered chunk, the addressing donor for refragmentation.
	#[inline]
	pub fn first_chunk(&self) -> Option<&Mbuf> {
		self.chunks.first()
	}

	/// Free all chunks and clear the header buffer.
	pub fn reset(&mut self) {
		self.chunks.clear(); // dropping returns every buffer to its pool
		self.hdrs.clear();
	}

	/// True iff the buffered headers form the complete message in order.
	pub fn check(&self) -> bool {
		let total_chunk_num = match self.hdrs.last() {
			Some(hdr) => hdr.total_chunk_num as usize,
			None => return false,
		};
		if self.hdrs.len() != total_chunk_num {
			return false;
		}
		self.hdrs
			.iter()
			.enumerate()
			.all(|(expected, hdr)| hdr.chunk_num as usize == expected)
	}

	/// Sort out-of-order chunks back into chunk number order.
	///
	/// Chunk loss cannot be repaired here and is reported as an error.
	pub fn recover(&mut self) -> Result<(), AssembleError> {
		let total_chunk_num = self
			.hdrs
			.last()
			.map(|hdr| hdr.total_chunk_num as usize)
			.unwrap_or(0);
		if self.hdrs.len() != total_chunk_num {
			return Err(AssembleError::LostChunks(total_chunk_num, self.hdrs.len()));
		}
		let mut indices: Vec<usize> = (0..self.hdrs.len()).collect();
		indices.sort_by_key(|&i| self.hdrs[i].chunk_num);
		reorder(&mut self.chunks, indices.clone());
		reorder(&mut self.hdrs, indices);
		Ok(())
	}

	/// Concatenate the payload of every chunk in buffer order.
	///
	/// Assumes chunks and headers are aligned and ordered.
	pub fn defragment(&self) -> Vec<u8> {
		let mut msg_data = Vec::new();
		for (m, hdr) in self.chunks.iter().zip(self.hdrs.iter()) {
			let payload_len = hdr.chunk_len as usize - SERVICE_HEADER_LEN;
			let start = SERVICE_HEADER_OFFSET + SERVICE_HEADER_LEN;
			msg_data.extend_from_slice(&m.data()[start..start + payload_len]);
		}
		msg_data
	}

	/// Replace the buffered chunks with a freshly fragmented payload.
	///
	/// The skeleton donates the Ethernet/IP/UDP addressing; `template`
	/// donates the message level fields. Chunk numbers of the new series are
	/// the zero based chunk indices.
	pub fn refragment(
		&mut self,
		pool: &Mempool,
		skeleton: &Mbuf,
		template: &ServiceHeader,
		has_final_result: bool,
		new_iter_num: u16,
		payload: &[u8],
	) -> Result<(), AssembleError> {
		let mut new_hdr = *template;
		new_hdr.msg_type = 1;
		new_hdr.msg_flags = 0;
		if has_final_result {
			log::debug!("final result is ready, set message flags to 1");
			new_hdr.msg_flags = 1;
		}
		new_hdr.iter_num = new_iter_num;
		new_hdr.data_chunk_num = 0;
		new_hdr.total_chunk_num = ((payload.len() + MAX_CHUNK_SIZE - 1) / MAX_CHUNK_SIZE) as u16;

		// Replace the previous series with the new payload.
		self.reset();

		for (index, slice) in payload.chunks(MAX_CHUNK_SIZE).enumerate() {
			new_hdr.chunk_len = (slice.len() + SERVICE_HEADER_LEN) as u16;
			new_hdr.chunk_num = index as u16;
			let m = build_chunk(pool, skeleton, &new_hdr, slice)?;
			self.chunks.push(m);
			self.hdrs.push(new_hdr);
		}
		Ok(())
	}

	/// Hand every chunk over to the caller, clearing both buffers.
	pub fn take_chunks(&mut self) -> Vec<Mbuf> {
		self.hdrs.clear();
		std::mem::take(&mut self.chunks)
	}

	/// Borrow the chunks for in-place edits before transmission.
	pub fn chunks_mut(&mut self) -> &mut [Mbuf] {
		&mut self.chunks
	}
}

/// Build one chunk: clone the skeleton's headers, pack the service header and
/// append the payload slice.
fn build_chunk(
	pool: &Mempool,
	skeleton: &Mbuf,
	hdr: &ServiceHeader,
	payload: &[u8],
) -> Result<Mbuf, AssembleError> {
	let mut m_result = deepcopy_chunk(pool, skeleton)?;
	if m_result.data_len() > ALL_HEADERS_LEN {
		m_result.truncate(ALL_HEADERS_LEN).map_err(ChunkError::from)?;
	}
	pack_service_header(&mut m_result, hdr);
	m_result
		.extend(ALL_HEADERS_LEN, payload.len())
		.map_err(ChunkError::from)?;
	m_result
		.write_data_slice(ALL_HEADERS_LEN, payload)
		.map_err(ChunkError::from)?;
	if m_result.data_len() != FULL_CHUNK_SIZE {
		update_l3_l4_header(&mut m_result, payload.len());
	}
	Ok(m_result)
}

/// Apply `new_order` to `vec` in place with O(n) swaps.
///
/// `new_order[i]` is the current position of the element that belongs at
/// position `i`.
fn reorder<T>(vec: &mut [T], mut new_order: Vec<usize>) {
	assert_eq!(vec.len(), new_order.len());
	if vec.is_empty() {
		return;
	}
	for vv in 0..vec.len() - 1 {
		if new_order[vv] == vv {
			continue;
		}
		let mut oo = vv + 1;
		while oo < new_order.len() {
			if new_order[oo] == vv {
				break;
			}
			oo += 1;
		}
		vec.swap(vv, new_order[vv]);
		new_order.swap(vv, oo);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{unpack_service_header, ETHER_HDR_LEN, IPV4_HDR_LEN, UDP_HDR_LEN};

	fn make_chunk(
		pool: &Mempool,
		msg_type: u8,
		total: u16,
		index: u16,
		payload: &[u8],
	) -> (Mbuf, ServiceHeader) {
		let hdr = ServiceHeader {
			msg_type,
			total_chunk_num: total,
			chunk_num: index,
			chunk_len: (payload.len() + SERVICE_HEADER_LEN) as u16,
			..Default::default()
		};
		let mut udp_payload = hdr.to_bytes().to_vec();
		udp_payload.extend_from_slice(payload);
		let builder = etherparse::PacketBuilder::ethernet2(
			[0x02, 0, 0, 0, 0, 0x01],
			[0x02, 0, 0, 0, 0, 0x02],
		)
		.ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
		.udp(9999, 9999);
		let mut frame = Vec::with_capacity(builder.size(udp_payload.len()));
		builder.write(&mut frame, &udp_payload).unwrap();
		(Mbuf::from_bytes(&frame, pool).unwrap(), hdr)
	}

	fn fill(assembler: &mut ChunkAssembler, pool: &Mempool, slices: &[&[u8]], order: &[usize]) {
		let total = slices.len() as u16;
		for &i in order {
			let (m, hdr) = make_chunk(pool, 0, total, i as u16, slices[i]);
			assembler.push(m, hdr);
		}
	}

	fn permutations(n: usize) -> Vec<Vec<usize>> {
		fn go(prefix: &mut Vec<usize>, rest: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
			if rest.is_empty() {
				out.push(prefix.clone());
				return;
			}
			for i in 0..rest.len() {
				let v = rest.remove(i);
				prefix.push(v);
				go(prefix, rest, out);
				prefix.pop();
				rest.insert(i, v);
			}
		}
		let mut out = Vec::new();
		go(&mut Vec::new(), &mut (0..n).collect(), &mut out);
		out
	}

	#[test]
	fn defragment_restores_the_split_payload() {
		let pool = Mempool::new("defrag_pool", 8).unwrap();
		let message: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
		let mut assembler = ChunkAssembler::new();
		let slices: Vec<&[u8]> = message.chunks(MAX_CHUNK_SIZE).collect();
		fill(&mut assembler, &pool, &slices, &[0, 1, 2]);
		assert!(assembler.check());
		assert_eq!(assembler.defragment(), message);
	}

	#[test]
	fn check_rejects_misordered_and_short_buffers() {
		let pool = Mempool::new("check_pool", 8).unwrap();
		let mut assembler = ChunkAssembler::new();
		assert!(!assembler.check());

		fill(&mut assembler, &pool, &[b"aa", b"bb", b"cc"], &[0, 2, 1]);
		assert!(!assembler.check());
		assembler.reset();

		fill(&mut assembler, &pool, &[b"aa", b"bb", b"cc"], &[0, 2]);
		assert!(!assembler.check());
	}

	#[test]
	fn recover_restores_any_arrival_order() {
		let pool = Mempool::new("recover_pool", 32).unwrap();
		let slices: &[&[u8]] = &[b"one-", b"two-", b"three-", b"four"];
		for order in permutations(slices.len()) {
			let mut assembler = ChunkAssembler::new();
			fill(&mut assembler, &pool, slices, &order);
			assembler.recover().unwrap();
			assert!(assembler.check(), "order {:?} not recovered", order);
			assert_eq!(assembler.defragment(), b"one-two-three-four");
			// recover again must keep the order intact
			assembler.recover().unwrap();
			assert!(assembler.check());
		}
		assert_eq!(pool.in_use(), 0);
	}

	#[test]
	fn recover_reports_lost_chunks() {
		let pool = Mempool::new("lost_pool", 8).unwrap();
		let mut assembler = ChunkAssembler::new();
		// chunk 1 of 3 never arrives
		let (m, hdr) = make_chunk(&pool, 0, 3, 0, b"aa");
		assembler.push(m, hdr);
		let (m, hdr) = make_chunk(&pool, 0, 3, 2, b"cc");
		assembler.push(m, hdr);
		assert!(matches!(
			assembler.recover(),
			Err(AssembleError::LostChunks(3, 2))
		));
	}

	#[test]
	fn refragment_splits_and_numbers_chunks() {
		let pool = Mempool::new("refrag_pool", 8).unwrap();
		let ff_pool = Mempool::new("refrag_ff_pool", 8).unwrap();
		let full_payload = vec![0x5Au8; MAX_CHUNK_SIZE];
		let (skeleton, template) = make_chunk(&pool, 0, 2, 0, &full_payload);
		assert_eq!(skeleton.data_len(), FULL_CHUNK_SIZE);

		let uw: Vec<u8> = (0..3000u32).map(|i| (i % 7) as u8).collect();
		let mut assembler = ChunkAssembler::new();
		assembler
			.refragment(&ff_pool, &skeleton, &template, false, 3, &uw)
			.unwrap();

		assert_eq!(assembler.len(), 3);
		assert!(assembler.check());
		let mut prev_chunk_num = None;
		for (i, m) in assembler.chunks_mut().iter().enumerate() {
			let hdr = unpack_service_header(m);
			assert_eq!(hdr.msg_type, 1);
			assert_eq!(hdr.msg_flags, 0);
			assert_eq!(hdr.iter_num, 3);
			assert_eq!(hdr.data_chunk_num, 0);
			assert_eq!(hdr.total_chunk_num, 3);
			assert_eq!(hdr.chunk_num as usize, i);
			if let Some(prev) = prev_chunk_num {
				assert!(hdr.chunk_num > prev);
			}
			prev_chunk_num = Some(hdr.chunk_num);
		}
		assert_eq!(assembler.defragment(), uw);
		assert_eq!(ff_pool.in_use(), 3);
	}

	#[test]
	fn refragment_patches_lengths_of_short_chunks() {
		let pool = Mempool::new("short_pool", 4).unwrap();
		let ff_pool = Mempool::new("short_ff_pool", 4).unwrap();
		let full_payload = vec![0x5Au8; MAX_CHUNK_SIZE];
		let (skeleton, template) = make_chunk(&pool, 0, 1, 0, &full_payload);

		let mut assembler = ChunkAssembler::new();
		assembler
			.refragment(&ff_pool, &skeleton, &template, true, 1, b"UW1")
			.unwrap();
		assert_eq!(assembler.len(), 1);

		let m = &assembler.chunks_mut()[0];
		assert_eq!(m.data_len(), ALL_HEADERS_LEN + 3);
		let hdr = unpack_service_header(m);
		assert_eq!(hdr.msg_flags, 1);
		assert_eq!(hdr.chunk_len as usize, SERVICE_HEADER_LEN + 3);
		let udp_len = u16::from_be_bytes([
			m.data()[ETHER_HDR_LEN + IPV4_HDR_LEN + 4],
			m.data()[ETHER_HDR_LEN + IPV4_HDR_LEN + 5],
		]);
		assert_eq!(udp_len as usize, 3 + SERVICE_HEADER_LEN + UDP_HDR_LEN);
		let ip_len = u16::from_be_bytes([m.data()[ETHER_HDR_LEN + 2], m.data()[ETHER_HDR_LEN + 3]]);
		assert_eq!(ip_len as usize, 3 + SERVICE_HEADER_LEN + UDP_HDR_LEN + IPV4_HDR_LEN);
	}

	#[test]
	fn refragment_frees_the_previous_series() {
		let pool = Mempool::new("replace_pool", 4).unwrap();
		let ff_pool = Mempool::new("replace_ff_pool", 4).unwrap();
		let full_payload = vec![0u8; MAX_CHUNK_SIZE];
		let (skeleton, template) = make_chunk(&pool, 0, 1, 0, &full_payload);

		let mut assembler = ChunkAssembler::new();
		assembler
			.refragment(&ff_pool, &skeleton, &template, false, 1, b"first")
			.unwrap();
		assert_eq!(ff_pool.in_use(), 1);
		assembler
			.refragment(&ff_pool, &skeleton, &template, false, 2, b"second")
			.unwrap();
		assert_eq!(ff_pool.in_use(), 1);
		assert_eq!(assembler.defragment(), b"second");

		assembler.reset();
		assert_eq!(ff_pool.in_use(), 0);
	}

	#[test]
	fn take_chunks_clears_both_buffers() {
		let pool = Mempool::new("take_pool", 4).unwrap();
		let mut assembler = ChunkAssembler::new();
		fill(&mut assembler, &pool, &[b"aa", b"bb"], &[0, 1]);
		let chunks = assembler.take_chunks();
		assert_eq!(chunks.len(), 2);
		assert!(assembler.is_empty());
		assert!(assembler.last_hdr().is_none());
		drop(chunks);
		assert_eq!(pool.in_use(), 0);
	}
}
