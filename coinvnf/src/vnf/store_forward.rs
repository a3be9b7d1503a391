//! Pure bridging between the RX and the TX port

use std::sync::atomic::Ordering;
use std::thread;

use coinenginelib::{disable_udp_cksum, is_valid_chunk, PacketPort, BURST_SIZE};

use super::IDLE_POLL_SLEEP;
use crate::manager::VnfManager;

/// Main loop for store and forward mode.
///
/// Burst receive, drop invalid frames, disable the UDP checksum and burst
/// transmit. No state, no compute. Returns the number of forwarded frames.
pub fn run_store_forward_loop<P: PacketPort>(manager: &mut VnfManager<P>) -> u64 {
	let mut fw_num: u64 = 0;
	log::info!("enter store and forward loop");
	while !manager.force_quit.load(Ordering::SeqCst) {
		let pkts = manager.rx_port.receive(BURST_SIZE);
		if pkts.is_empty() {
			thread::sleep(IDLE_POLL_SLEEP);
			continue;
		}
		let mut tx_buf = Vec::with_capacity(pkts.len());
		for mut m in pkts {
			if !is_valid_chunk(&m) {
				continue;
			}
			disable_udp_cksum(&mut m);
			tx_buf.push(m);
		}
		fw_num += manager.tx_port.transmit(tx_buf) as u64;
		log::debug!("totally forwarded {} packets", fw_num);
	}
	fw_num
}
