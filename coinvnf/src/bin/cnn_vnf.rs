//! VNF of the distributed CNN pipeline
//!
//! Receives chunked X messages, hands the reassembled tensor bytes to the
//! compute worker and re-emits the chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;

use coinenginelib::bridge::UnixBridge;
use coinenginelib::AfPacketPort;
use coinvnf::cli::{self, Mode, Opt};
use coinvnf::manager::VnfManager;
use coinvnf::vnf::{cnn, run_store_forward_loop};

fn main() -> Result<()> {
	let opt = Opt::from_args();
	let mode = opt.parse_mode()?;
	cli::init_logging(opt.verbose);
	log::info!("current working mode: {:?}", mode);
	log::info!("interface name: {}", opt.iface);
	log::info!("core list: {}; preallocated memory: {} MB", opt.core, opt.mem);
	if opt.leader {
		log::info!("role: leader node");
	}

	cli::pin_to_first_core(&opt.core)?;
	let (pool, ff_pool) = cli::create_pools(opt.mem)?;

	let rx_port = AfPacketPort::open(&opt.iface, &pool)
		.with_context(|| format!("cannot open a port on {}", opt.iface))?;
	let tx_port = rx_port.try_clone().context("cannot clone the port for TX")?;

	let force_quit = Arc::new(AtomicBool::new(false));
	let fq = force_quit.clone();
	ctrlc::set_handler(move || {
		fq.store(true, Ordering::SeqCst);
	})
	.context("error setting the signal handler")?;

	let mut manager = VnfManager {
		rx_port,
		tx_port,
		pool,
		ff_pool,
		force_quit,
		recv_timeout: opt.recv_timeout(),
	};

	match mode {
		Mode::StoreForward => {
			let fw_num = run_store_forward_loop(&mut manager);
			log::info!("forwarded {} packets", fw_num);
		}
		Mode::ComputeForward => {
			let mut bridge = UnixBridge::connect(&opt.bridge)
				.with_context(|| format!("cannot reach the compute worker at {}", opt.bridge))?;
			let info = cnn::run_compute_forward_loop(&mut manager, &mut bridge)?;
			log::info!(
				"processed {} messages, lost {}",
				info.message_count,
				info.lost_message_count
			);
		}
	}

	log::info!("main loop ends, run cleanups...");
	Ok(())
}
