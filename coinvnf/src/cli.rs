//! Operator facing surface shared by the two VNF binaries

use std::time::Duration;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use coinenginelib::{Mempool, MBUF_SIZE};

/// VNF working mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	StoreForward,
	ComputeForward,
}

#[derive(Debug, StructOpt)]
pub struct Opt {
	/// Set VNF mode: store_forward or compute_forward.
	#[structopt(short, long, default_value = "store_forward")]
	pub mode: String,

	/// Run as the leader node.
	#[structopt(short, long)]
	pub leader: bool,

	/// The name of the IO interface.
	#[structopt(short, long)]
	pub iface: String,

	/// Set the maximal allowed computing iterations.
	#[structopt(long, default_value = "4")]
	pub max_rounds: u32,

	/// The CPU cores (split by comma) to use. The polling thread is pinned
	/// to the first listed core.
	#[structopt(short, long, default_value = "1")]
	pub core: String,

	/// Set the amount of memory (MB) to preallocate at startup.
	#[structopt(long, default_value = "512")]
	pub mem: u32,

	/// How long (ms) a partially received message may wait for its next
	/// chunk before it counts as lost.
	#[structopt(long, default_value = "1000")]
	pub recv_timeout_ms: u64,

	/// Path of the compute worker socket (compute_forward mode).
	#[structopt(long, default_value = "/tmp/coin_compute.sock")]
	pub bridge: String,

	/// Enable verbose mode.
	#[structopt(short, long)]
	pub verbose: bool,
}

impl Opt {
	/// Validate the requested mode. An unknown mode is a startup error.
	pub fn parse_mode(&self) -> Result<Mode> {
		match self.mode.as_str() {
			"store_forward" => Ok(Mode::StoreForward),
			"compute_forward" => Ok(Mode::ComputeForward),
			other => bail!("unknown mode: {}", other),
		}
	}

	pub fn recv_timeout(&self) -> Duration {
		Duration::from_millis(self.recv_timeout_ms)
	}
}

/// Install the fmt subscriber; `--verbose` lowers the default filter to debug.
pub fn init_logging(verbose: bool) {
	let default = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Pin the polling thread to the first core of the `--core` list.
pub fn pin_to_first_core(core_list: &str) -> Result<()> {
	let first: usize = core_list
		.split(',')
		.next()
		.unwrap_or("0")
		.trim()
		.parse()
		.with_context(|| format!("invalid core list: {}", core_list))?;
	unsafe {
		let mut set: libc::cpu_set_t = std::mem::zeroed();
		libc::CPU_ZERO(&mut set);
		libc::CPU_SET(first, &mut set);
		if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
			bail!("failed to pin the polling thread to core {}", first);
		}
	}
	log::info!("pinned polling thread to core {}", first);
	Ok(())
}

/// Size the two buffer pools from the `--mem` budget.
///
/// The fast-forward pool gets the lion's share: buffered messages can span
/// thousands of chunks while the main pool only covers RX bursts in flight.
pub fn create_pools(mem_mb: u32) -> Result<(Mempool, Mempool)> {
	let total_segs = (mem_mb as usize * 1024 * 1024) / MBUF_SIZE;
	let ff_segs = (total_segs * 4 / 5).max(4096);
	let main_segs = (total_segs / 5).max(1024);
	let pool = Mempool::new("main_pool", main_segs).context("cannot init the main pool")?;
	let ff_pool =
		Mempool::new("fast_forward_pool", ff_segs).context("cannot init the fast forward pool")?;
	Ok((pool, ff_pool))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn opt_with_mode(mode: &str) -> Opt {
		Opt {
			mode: mode.to_string(),
			leader: false,
			iface: "veth0".to_string(),
			max_rounds: 4,
			core: "1".to_string(),
			mem: 64,
			recv_timeout_ms: 1000,
			bridge: "/tmp/test.sock".to_string(),
			verbose: false,
		}
	}

	#[test]
	fn known_modes_parse() {
		assert_eq!(
			opt_with_mode("store_forward").parse_mode().unwrap(),
			Mode::StoreForward
		);
		assert_eq!(
			opt_with_mode("compute_forward").parse_mode().unwrap(),
			Mode::ComputeForward
		);
	}

	#[test]
	fn unknown_mode_is_an_error() {
		assert!(opt_with_mode("bridge_forward").parse_mode().is_err());
	}

	#[test]
	fn pools_follow_the_memory_budget() {
		let (pool, ff_pool) = create_pools(64).unwrap();
		assert!(ff_pool.capacity() > pool.capacity());
		let total = (64usize * 1024 * 1024) / MBUF_SIZE;
		assert!(pool.capacity() + ff_pool.capacity() <= total + 4096 + 1024);
	}
}
