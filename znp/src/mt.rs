//monitor and test (MT) general frame, the unit exchanged with the znp over uart
//SOF | LEN | CMD0 | CMD1 | DATA[LEN] | FCS

use frames::{ self, Error };

pub const SOF: u8 = 0xFE;
pub const MAX_PAYLOAD: usize = 250;

const HEADER_LEN: usize = 4;	//sof, len, cmd0, cmd1
const TYPE_SHIFT: u8 = 5;
const SUBSYSTEM_MASK: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtType {
	Poll,
	Sreq,	//synchronous request, answered by exactly one SRSP
	Areq,	//asynchronous request or indication
	Srsp,
}

impl MtType {
	fn id(&self) -> u8 {
		match self {
			Self::Poll => 0,
			Self::Sreq => 1,
			Self::Areq => 2,
			Self::Srsp => 3,
		}
	}

	fn from_id(id: u8) -> Result<Self, Error> {
		match id {
			0 => Ok(Self::Poll),
			1 => Ok(Self::Sreq),
			2 => Ok(Self::Areq),
			3 => Ok(Self::Srsp),
			_ => Err(Error::Malformed("unknown command type"))
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
	Rpc,
	Sys,
	Mac,
	Nwk,
	Af,
	Zdo,
	Sapi,
	Util,
	Debug,
	App,
	Other(u8),
}

impl Subsystem {
	pub fn id(&self) -> u8 {
		match self {
			Self::Rpc => 0,
			Self::Sys => 1,
			Self::Mac => 2,
			Self::Nwk => 3,
			Self::Af => 4,
			Self::Zdo => 5,
			Self::Sapi => 6,
			Self::Util => 7,
			Self::Debug => 8,
			Self::App => 9,
			Self::Other(id) => *id & SUBSYSTEM_MASK,
		}
	}

	pub fn from_id(id: u8) -> Self {
		match id & SUBSYSTEM_MASK {
			0 => Self::Rpc,
			1 => Self::Sys,
			2 => Self::Mac,
			3 => Self::Nwk,
			4 => Self::Af,
			5 => Self::Zdo,
			6 => Self::Sapi,
			7 => Self::Util,
			8 => Self::Debug,
			9 => Self::App,
			id => Self::Other(id),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtFrame {
	pub kind: MtType,
	pub subsystem: Subsystem,
	pub command: u8,
	pub data: Vec<u8>
}

impl MtFrame {
	pub fn new(kind: MtType, subsystem: Subsystem, command: u8, data: Vec<u8>) -> Self {
		Self { kind, subsystem, command, data }
	}

	pub fn cmd0(&self) -> u8 {
		(self.kind.id() << TYPE_SHIFT) | self.subsystem.id()
	}

	pub fn fcs(buf: &[u8]) -> u8 {
		buf.iter().fold(0, |fcs, b| fcs ^ b)
	}

	pub fn missing_bytes(buf: &mut Vec<u8>) -> usize {
		loop {
			//resync on start of frame
			match buf.iter().position(|b| *b == SOF) {
				None => {
					if !buf.is_empty() {
						tracing::trace!("discarding {} bytes outside of frame", buf.len());
						buf.clear();
					}

					return 1;
				},
				Some(0) => {},
				Some(p) => {
					tracing::trace!("discarding {} bytes before start of frame", p);
					buf.drain(..p);
				}
			}

			if buf.len() < 2 {
				return 2 - buf.len();
			}

			let len = buf[1] as usize;

			if len > MAX_PAYLOAD {
				//not a real start of frame
				buf.remove(0);
				continue;
			}

			return (HEADER_LEN + len + 1).saturating_sub(buf.len());
		}
	}

	pub fn from_buf(buf: &[u8]) -> Result<Self, Error> {
		if buf.len() < HEADER_LEN + 1 {
			return Err(Error::Malformed("frame too small"));
		}

		if buf[0] != SOF {
			return Err(Error::Malformed("missing start of frame"));
		}

		let len = buf[1] as usize;

		if buf.len() != HEADER_LEN + len + 1 {
			return Err(Error::Malformed("length mismatch"));
		}

		if Self::fcs(&buf[1..HEADER_LEN + len]) != buf[HEADER_LEN + len] {
			return Err(Error::Malformed("bad fcs"));
		}

		Ok(MtFrame {
			kind: MtType::from_id(buf[2] >> TYPE_SHIFT)?,
			subsystem: Subsystem::from_id(buf[2]),
			command: buf[3],
			data: buf[HEADER_LEN..HEADER_LEN + len].to_vec()
		})
	}

	pub fn as_bytes(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		if self.data.len() > MAX_PAYLOAD {
			return Err(Error::Malformed("payload too large"));
		}

		let start = buf.len();

		buf.push(SOF);
		buf.push(self.data.len() as u8);
		buf.push(self.cmd0());
		buf.push(self.command);
		buf.extend_from_slice(&self.data);

		let fcs = Self::fcs(&buf[start + 1..]);
		buf.push(fcs);

		Ok(())
	}
}

impl frames::Frame for MtFrame {
	type Params = ();

	fn missing_bytes(buf: &mut Vec<u8>, _params: &Self::Params) -> Result<usize, Error> {
		Ok(MtFrame::missing_bytes(buf))
	}

	fn from_buf(buf: &[u8], _params: &Self::Params) -> Result<Self, Error> {
		MtFrame::from_buf(buf)
	}

	fn as_bytes(&self, _params: &Self::Params, buf: &mut Vec<u8>) -> Result<(), Error> {
		MtFrame::as_bytes(self, buf)
	}
}
