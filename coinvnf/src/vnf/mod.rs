//! Working state and shared loop building blocks of the VNFs

pub mod cnn;
pub mod meica;
mod store_forward;

pub use store_forward::*;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use coinenginelib::{
	deepcopy_chunk, disable_udp_cksum, is_valid_chunk, recalc_ipv4_udp_cksum,
	unpack_service_header, ChunkAssembler, PacketPort, ALL_HEADERS_LEN, BURST_SIZE,
};

use crate::manager::VnfManager;

/// Delay before re-polling an empty RX queue.
const IDLE_POLL_SLEEP: Duration = Duration::from_millis(1);

/// Information struct of a VNF loop.
#[derive(Debug)]
pub struct VnfInfo<S> {
	pub state: S,
	pub message_count: u64,
	pub lost_message_count: u64,
}

impl<S> VnfInfo<S> {
	pub fn new(state: S) -> Self {
		Self {
			state,
			message_count: 0,
			lost_message_count: 0,
		}
	}
}

/// How a pass through the receive loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RecvOutcome {
	/// The most recently appended chunk closed the message.
	Complete,
	/// A partial message saw no new chunk within the receive timeout.
	TimedOut,
	/// The shutdown flag was raised.
	Shutdown,
}

/// Receive the chunks of one message into the assembler.
///
/// With `fast_forward` set, every data chunk (msg_type 0) is copied into the
/// fast-forward pool and transmitted right away while the original stays
/// buffered. The message is provisionally complete when the most recently
/// appended header carries the last chunk number, or when the buffer holds
/// the advertised chunk count; full validation against the whole buffer
/// happens in the process stage.
pub fn recv_chunks<P: PacketPort>(
	manager: &mut VnfManager<P>,
	assembler: &mut ChunkAssembler,
	fast_forward: bool,
) -> Result<RecvOutcome> {
	let mut last_rx = Instant::now();
	loop {
		if manager.force_quit.load(Ordering::SeqCst) {
			return Ok(RecvOutcome::Shutdown);
		}
		if !assembler.is_empty() && last_rx.elapsed() >= manager.recv_timeout {
			log::warn!(
				"receive timeout after {} buffered chunks, message is lost",
				assembler.len()
			);
			return Ok(RecvOutcome::TimedOut);
		}
		let pkts = manager.rx_port.receive(BURST_SIZE);
		if pkts.is_empty() {
			thread::sleep(IDLE_POLL_SLEEP);
			continue;
		}
		for m in pkts {
			// too short to carry a service header counts as malformed
			if !is_valid_chunk(&m) || m.data_len() < ALL_HEADERS_LEN {
				continue; // freed right here
			}
			let service_hdr = unpack_service_header(&m);
			log::trace!("chunk header: {}", service_hdr);
			// Fast forward all data messages
			if fast_forward && service_hdr.msg_type == 0 {
				let mut m_copy = deepcopy_chunk(&manager.ff_pool, &m)
					.context("fast forward copy failed")?;
				disable_udp_cksum(&mut m_copy);
				manager.tx_port.transmit(vec![m_copy]);
			}
			assembler.push(m, service_hdr);
			last_rx = Instant::now();
		}
		if let Some(hdr) = assembler.last_hdr() {
			let total = hdr.total_chunk_num as usize;
			// an out-of-order message can end on any chunk number, so a
			// full buffer closes the message as well
			if hdr.chunk_num == hdr.total_chunk_num.saturating_sub(1)
				|| (total > 0 && assembler.len() >= total)
			{
				return Ok(RecvOutcome::Complete);
			}
		}
	}
}

/// Fix up checksums and transmit every buffered chunk of `assembler`.
///
/// Chunks leave in buffer order, one at a time.
pub fn send_chunks<P: PacketPort>(
	manager: &mut VnfManager<P>,
	assembler: &mut ChunkAssembler,
) -> usize {
	for m in assembler.chunks_mut() {
		recalc_ipv4_udp_cksum(m);
	}
	let mut tx_num = 0;
	// TODO: Optimize to burst TX.
	for m in assembler.take_chunks() {
		tx_num += manager.tx_port.transmit(vec![m]);
	}
	log::debug!("sent {} chunks", tx_num);
	tx_num
}
