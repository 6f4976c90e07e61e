use thiserror::Error as ThisError;
use crate::status::ZStatus;

#[derive(Debug, ThisError)]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
	#[error("af callbacks are not registered with the transport")]
	CallbacksNotRegistered,
	#[error("unexpected frame (cmd0: {cmd0:#04x}, cmd1: {cmd1:#04x})")]
	UnexpectedFrame {
		cmd0: u8,
		cmd1: u8
	},
	#[error("fragmented incoming message ({carried} of {declared} bytes)")]
	Fragmented {
		declared: u16,
		carried: usize
	},
	#[error(transparent)]
	Deku(#[from] deku::DekuError),
	#[error(transparent)]
	Frames(#[from] frames::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

/// Why a submitted command did not complete.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
	#[error("rejected by radio: {0}")]
	Rejected(ZStatus),
	#[error("never confirmed")]
	Unconfirmed,
}

pub type Outcome = Result<(), CommandError>;
