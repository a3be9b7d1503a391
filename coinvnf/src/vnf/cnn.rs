//! Compute and forward state machine of the CNN pipeline

use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};

use coinenginelib::bridge::ComputeBridge;
use coinenginelib::{ChunkAssembler, PacketPort};

use super::{recv_chunks, send_chunks, RecvOutcome, VnfInfo};
use crate::manager::VnfManager;

/// Working states of the CNN VNF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnState {
	Reset,
	RecvXChunks,
	ProcessChunks,
	SendResultChunks,
}

/// Main loop for compute and forward mode.
pub fn run_compute_forward_loop<P: PacketPort, B: ComputeBridge>(
	manager: &mut VnfManager<P>,
	bridge: &mut B,
) -> Result<VnfInfo<CnnState>> {
	log::info!("enter compute and forward loop");

	let mut x_buf = ChunkAssembler::new();
	let mut info = VnfInfo::new(CnnState::RecvXChunks);

	while !manager.force_quit.load(Ordering::SeqCst) {
		match info.state {
			CnnState::Reset => {
				log::debug!("state: reset VNF");
				x_buf.reset();
				info.state = CnnState::RecvXChunks;
			}

			CnnState::RecvXChunks => {
				assert!(x_buf.is_empty());
				log::debug!("state: receive X chunks");
				match recv_chunks(manager, &mut x_buf, false)? {
					RecvOutcome::Complete => info.state = CnnState::ProcessChunks,
					RecvOutcome::TimedOut => {
						info.lost_message_count += 1;
						info.state = CnnState::Reset;
					}
					RecvOutcome::Shutdown => break,
				}
			}

			CnnState::ProcessChunks => {
				log::debug!(
					"state: process chunks, data chunk buffer size: {}",
					x_buf.len()
				);
				if !x_buf.check() {
					log::debug!("chunk recovery is needed");
					x_buf.recover().context("failed to recover data chunks")?;
					if !x_buf.check() {
						bail!("data chunks are still inconsistent after recovery");
					}
				}
				let x_bytes = x_buf.defragment();
				let bytes_out = bridge.run_cnn(&x_bytes).context("cnn bridge call failed")?;
				// The result stays with the compute backend for now; the
				// original X chunks are re-emitted unchanged.
				// TODO: Rebuild the outgoing series from bytes_out once the
				// downstream consumers expect processed payloads.
				log::debug!("cnn produced {} result bytes", bytes_out.len());
				info.state = CnnState::SendResultChunks;
			}

			CnnState::SendResultChunks => {
				log::debug!("state: send result chunks");
				send_chunks(manager, &mut x_buf);
				info.message_count += 1;
				info.state = CnnState::RecvXChunks;
			}
		}
	}
	Ok(info)
}
