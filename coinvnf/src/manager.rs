//! Runtime context shared by every VNF loop

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use coinenginelib::{Mempool, PacketPort};

/// Everything a VNF loop needs: ports, pools, the shutdown flag and the
/// receive timeout. Passing this context around keeps the loops free of
/// process globals and runnable against in-memory ports.
pub struct VnfManager<P: PacketPort> {
	pub rx_port: P,
	pub tx_port: P,
	/// Pool backing RX buffers.
	pub pool: Mempool,
	/// Oversized pool for fast-forward copies and synthesized result chunks;
	/// a single message can span thousands of chunks.
	pub ff_pool: Mempool,
	/// Flipped by the signal handler; checked on every loop iteration.
	pub force_quit: Arc<AtomicBool>,
	/// How long a partial message may sit in the assembler without any new
	/// chunk before the message counts as lost.
	pub recv_timeout: Duration,
}
