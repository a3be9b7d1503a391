//! Compute worker client over a local stream socket
//!
//! The worker runs out of process; requests and replies are length prefixed
//! byte blobs. This keeps the engine decoupled from the inference runtime and
//! isolates worker crashes from the data path.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use super::{BridgeError, ComputeBridge};

const OP_CNN: u8 = 0;
const OP_MEICA: u8 = 1;

pub struct UnixBridge {
	stream: UnixStream,
}

impl UnixBridge {
	/// Connect to the compute worker listening on `path`.
	pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
		let stream = UnixStream::connect(path)?;
		Ok(Self { stream })
	}

	fn write_blob(&mut self, blob: &[u8]) -> Result<(), BridgeError> {
		self.stream.write_all(&(blob.len() as u32).to_be_bytes())?;
		self.stream.write_all(blob)?;
		Ok(())
	}

	fn read_reply(&mut self) -> Result<Vec<u8>, BridgeError> {
		let mut len_bytes = [0u8; 4];
		self.stream.read_exact(&mut len_bytes)?;
		let len = u32::from_be_bytes(len_bytes) as usize;
		let mut reply = vec![0u8; len];
		self.stream.read_exact(&mut reply)?;
		Ok(reply)
	}
}

impl ComputeBridge for UnixBridge {
	fn run_cnn(&mut self, x_bytes: &[u8]) -> Result<Vec<u8>, BridgeError> {
		self.stream.write_all(&[OP_CNN])?;
		self.write_blob(x_bytes)?;
		self.stream.flush()?;
		self.read_reply()
	}

	fn run_meica(
		&mut self,
		x_bytes: &[u8],
		uw_bytes: &[u8],
		iter_num: u16,
		max_rounds: u32,
	) -> Result<Vec<u8>, BridgeError> {
		self.stream.write_all(&[OP_MEICA])?;
		self.stream.write_all(&iter_num.to_be_bytes())?;
		self.stream.write_all(&max_rounds.to_be_bytes())?;
		self.write_blob(x_bytes)?;
		self.write_blob(uw_bytes)?;
		self.stream.flush()?;
		self.read_reply()
	}
}
