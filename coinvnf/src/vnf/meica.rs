//! Compute and forward state machine of the MEICA pipeline
//!
//! Every peer fast-forwards X chunks downstream while buffering them. The
//! leader starts the iteration on X alone; followers refine the uW received
//! from the previous peer, or pass a final result through untouched.

use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};

use coinenginelib::bridge::{ComputeBridge, MeicaOutput};
use coinenginelib::{ChunkAssembler, PacketPort};

use super::{recv_chunks, send_chunks, RecvOutcome, VnfInfo};
use crate::manager::VnfManager;

/// Working states of the MEICA VNF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeicaState {
	Reset,
	ForwardXChunks,
	RecvUwChunks,
	TryForwardUwChunks,
	ProcessChunks,
	SendUwChunks,
}

/// Main loop for compute and forward mode.
pub fn run_compute_forward_loop<P: PacketPort, B: ComputeBridge>(
	manager: &mut VnfManager<P>,
	bridge: &mut B,
	is_leader: bool,
	max_rounds: u32,
) -> Result<VnfInfo<MeicaState>> {
	log::info!(
		"enter compute and forward loop, maximal allowed processing rounds: {}",
		max_rounds
	);

	let mut x_buf = ChunkAssembler::new();
	let mut uw_buf = ChunkAssembler::new();
	let mut info = VnfInfo::new(MeicaState::ForwardXChunks);

	while !manager.force_quit.load(Ordering::SeqCst) {
		match info.state {
			MeicaState::Reset => {
				log::debug!("state: reset VNF");
				x_buf.reset();
				uw_buf.reset();
				info.state = MeicaState::ForwardXChunks;
			}

			MeicaState::ForwardXChunks => {
				assert!(x_buf.is_empty());
				log::debug!("state: receive and fast forward X chunks");
				match recv_chunks(manager, &mut x_buf, true)? {
					RecvOutcome::Complete => {
						info.state = if is_leader {
							MeicaState::ProcessChunks
						} else {
							MeicaState::RecvUwChunks
						};
					}
					RecvOutcome::TimedOut => {
						info.lost_message_count += 1;
						info.state = MeicaState::Reset;
					}
					RecvOutcome::Shutdown => break,
				}
			}

			MeicaState::RecvUwChunks => {
				assert!(!is_leader);
				assert!(uw_buf.is_empty());
				log::debug!("state: receive uW chunks");
				match recv_chunks(manager, &mut uw_buf, true)? {
					RecvOutcome::Complete => info.state = MeicaState::TryForwardUwChunks,
					RecvOutcome::TimedOut => {
						info.lost_message_count += 1;
						info.state = MeicaState::Reset;
					}
					RecvOutcome::Shutdown => break,
				}
			}

			MeicaState::TryForwardUwChunks => {
				log::debug!("state: try to fast forward uW chunks with the final result");
				let is_final = uw_buf.first_hdr().map(|h| h.msg_flags == 1).unwrap_or(false);
				if is_final {
					log::debug!("current uW message is fast forwarded");
					info.state = MeicaState::SendUwChunks;
				} else {
					info.state = MeicaState::ProcessChunks;
				}
			}

			MeicaState::ProcessChunks => {
				log::debug!(
					"state: process chunks, data chunk buffer size: {}, result chunk buffer size: {}",
					x_buf.len(),
					uw_buf.len()
				);
				if !x_buf.check() {
					log::debug!("chunk recovery is needed");
					x_buf.recover().context("failed to recover data chunks")?;
					if !x_buf.check() {
						bail!("data chunks are still inconsistent after recovery");
					}
				}
				// Result chunks are assumed to arrive in order.
				let x_bytes = x_buf.defragment();
				let (uw_bytes, iter_num) = if !uw_buf.is_empty() {
					let iter_num = uw_buf.last_hdr().map(|h| h.iter_num).unwrap_or(0);
					(uw_buf.defragment(), iter_num)
				} else {
					(Vec::new(), 0)
				};

				let bytes_out = bridge
					.run_meica(&x_bytes, &uw_bytes, iter_num, max_rounds)
					.context("meica bridge call failed")?;
				let out = MeicaOutput::parse(&bytes_out).context("malformed meica reply")?;

				// The first X chunk donates the addressing of the new series.
				let skeleton = x_buf.first_chunk().context("empty X chunk buffer")?;
				let hdr_template = *x_buf.first_hdr().context("empty X header buffer")?;
				uw_buf
					.refragment(
						&manager.ff_pool,
						skeleton,
						&hdr_template,
						out.has_final_result,
						out.new_iter_num,
						&out.new_uw_bytes,
					)
					.context("failed to rebuild the uW series")?;

				// The original X chunks are useless now, clean them up.
				// ONLY the uW buffer needs to be sent.
				x_buf.reset();

				info.state = MeicaState::SendUwChunks;
			}

			MeicaState::SendUwChunks => {
				log::debug!("state: send uW chunks");
				send_chunks(manager, &mut uw_buf);

				x_buf.reset();
				uw_buf.reset();
				info.message_count += 1;

				info.state = MeicaState::ForwardXChunks;
			}
		}
	}
	Ok(info)
}
