use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
	#[cfg(feature="serialport")]
	#[error(transparent)]
	SerialPort(#[from] serialport::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("would block")]
	WouldBlock,
	#[error("buffer not empty")]
	BufferNotEmpty,
	#[error("unexpected eof")]
	UnexpectedEof,
	#[error("malformed frame: {0}")]
	Malformed(&'static str),
}

impl Error {
	//stream is unusable, link has to be reopened
	pub fn need_reset(&self) -> bool {
		match self {
			#[cfg(feature="serialport")]
			Self::SerialPort(_) => true,
			Self::UnexpectedEof => true,
			_ => false
		}
	}
}

//non-blocking byte streams (serial port, socket in non-blocking mode, test doubles)

pub trait FrameRead {
	//may return 0 or Error::WouldBlock when there is nothing to read
	fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

pub trait FrameWrite {
	//may return 0 or Error::WouldBlock when there is no room for outgoing data
	fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;
	fn flush(&mut self) -> Result<(), Error>;
}

/// A self-delimiting frame that can be assembled from a byte stream.
pub trait Frame: Sized {
	type Params;

	/// Number of bytes still needed before `buf` holds one whole frame, `0` once it does.
	///
	/// Implementations may drop leading bytes that cannot start a frame.
	fn missing_bytes(buf: &mut Vec<u8>, params: &Self::Params) -> Result<usize, Error>;
	fn from_buf(buf: &[u8], params: &Self::Params) -> Result<Self, Error>;
	fn as_bytes(&self, params: &Self::Params, buf: &mut Vec<u8>) -> Result<(), Error>;
}

/// Holds one frame in flight, either being assembled from a stream or being drained into one.
#[derive(Default, Debug)]
pub struct FrameBuffer {
	buf: Vec<u8>,
	bytes_to_go: usize
}

impl FrameBuffer {
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	//drops a frame that is only partly written or read
	pub fn clear(&mut self) {
		self.buf.clear();
		self.bytes_to_go = 0;
	}

	pub fn push_frame<F: Frame>(&mut self, frame: &F, params: &F::Params) -> Result<(), Error> {
		if !self.buf.is_empty() {
			return Err(Error::BufferNotEmpty);
		}

		frame.as_bytes(params, &mut self.buf)?;
		self.bytes_to_go = self.buf.len();

		Ok(())
	}

	//returns true when the whole frame has been handed to the stream
	pub fn poll_write<W: FrameWrite>(&mut self, w: &mut W) -> Result<bool, Error> {
		if self.buf.is_empty() {
			return Ok(true);
		}

		let start = self.buf.len() - self.bytes_to_go;

		match w.write(&self.buf[start..]) {
			Ok(n) => {
				self.bytes_to_go -= n.min(self.bytes_to_go);
			},
			Err(Error::WouldBlock) => {},
			Err(e) => { return Err(e); }
		}

		if self.bytes_to_go == 0 {
			self.buf.clear();
			w.flush()?;

			return Ok(true);
		}

		Ok(false)
	}

	//reads as much as the stream offers, up to the end of one frame
	pub fn poll_read<F: Frame, R: FrameRead>(&mut self, r: &mut R, params: &F::Params) -> Result<Option<F>, Error> {
		loop {
			if self.bytes_to_go == 0 {
				let missing = F::missing_bytes(&mut self.buf, params)?;

				if missing == 0 {
					let frame = F::from_buf(&self.buf, params);

					self.buf.clear();

					return frame.map(Some);
				}

				let len = self.buf.len();

				self.buf.resize(len + missing, 0);
				self.bytes_to_go = missing;
			}

			let start = self.buf.len() - self.bytes_to_go;

			match r.read(&mut self.buf[start..]) {
				Ok(0) | Err(Error::WouldBlock) => {
					return Ok(None);
				},
				Ok(n) => {
					self.bytes_to_go -= n.min(self.bytes_to_go);
				},
				Err(e) => {
					tracing::trace!("dropping {} partial frame bytes", start);

					self.clear();

					return Err(e);
				}
			}
		}
	}
}
