//! The bridge to the external compute routine
//!
//! The VNFs treat the inference backend as a pair of synchronous byte
//! transform functions. Errors from the bridge are not recoverable on the
//! data path.

mod unix;

pub use unix::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
	#[error("compute worker io failure: {0}")]
	Io(#[from] std::io::Error),
	#[error("compute reply of {0} bytes is too short")]
	ShortReply(usize),
}

/// Byte transform entry points of the inference backend.
pub trait ComputeBridge {
	/// Process one X message and return the result bytes.
	fn run_cnn(&mut self, x_bytes: &[u8]) -> Result<Vec<u8>, BridgeError>;

	/// Run one round of the cooperative iteration.
	///
	/// The reply encodes the final-result flag, the new iteration number and
	/// the refined uW bytes; see [`MeicaOutput::parse`].
	fn run_meica(
		&mut self,
		x_bytes: &[u8],
		uw_bytes: &[u8],
		iter_num: u16,
		max_rounds: u32,
	) -> Result<Vec<u8>, BridgeError>;
}

/// Decoded MEICA reply.
#[derive(Debug)]
pub struct MeicaOutput {
	pub has_final_result: bool,
	pub new_iter_num: u16,
	pub new_uw_bytes: Vec<u8>,
}

impl MeicaOutput {
	/// Split a raw reply: flag byte, iteration byte, then the new uW bytes.
	pub fn parse(bytes_out: &[u8]) -> Result<Self, BridgeError> {
		if bytes_out.len() < 2 {
			return Err(BridgeError::ShortReply(bytes_out.len()));
		}
		Ok(Self {
			has_final_result: bytes_out[0] == 1,
			new_iter_num: bytes_out[1] as u16,
			new_uw_bytes: bytes_out[2..].to_vec(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_splits_flag_iteration_and_payload() {
		let out = MeicaOutput::parse(&[1, 4, b'u', b'W']).unwrap();
		assert!(out.has_final_result);
		assert_eq!(out.new_iter_num, 4);
		assert_eq!(out.new_uw_bytes, b"uW");

		let out = MeicaOutput::parse(&[0, 1]).unwrap();
		assert!(!out.has_final_result);
		assert!(out.new_uw_bytes.is_empty());
	}

	#[test]
	fn parse_rejects_short_replies() {
		assert!(matches!(
			MeicaOutput::parse(&[1]),
			Err(BridgeError::ShortReply(1))
		));
		assert!(matches!(
			MeicaOutput::parse(&[]),
			Err(BridgeError::ShortReply(0))
		));
	}
}
