use std::collections::VecDeque;
use frames::{ FrameBuffer, FrameRead, FrameWrite };
use crate::{ Error, mt::{ MtFrame, Subsystem } };

/// Link to the coprocessor.
///
/// `submit` only queues a request; it is written and its confirmation comes back
/// later, as a frame returned from `poll`, one frame per call. Write failures are
/// reported from `poll`.
pub trait Transport {
	fn subscribe(&mut self, subsystem: Subsystem, commands: &[u8]) -> Result<(), Error>;
	fn submit(&mut self, frame: MtFrame) -> Result<(), Error>;

	fn poll(&mut self) -> Result<Option<MtFrame>, Error> {
		Ok(None)
	}
}

//mt frames over a non-blocking byte stream, usually the znp uart
pub struct StreamTransport<S: FrameRead + FrameWrite> {
	stream: S,
	buf_out: VecDeque<MtFrame>,
	frame_in: FrameBuffer,
	frame_out: FrameBuffer,
	subscriptions: Vec<(Subsystem, u8)>
}

impl<S: FrameRead + FrameWrite> StreamTransport<S> {
	pub fn new(stream: S) -> Self {
		Self {
			stream,
			buf_out: VecDeque::new(),
			frame_in: FrameBuffer::default(),
			frame_out: FrameBuffer::default(),
			subscriptions: Vec::new()
		}
	}

	pub fn stream(&self) -> &S {
		&self.stream
	}

	pub fn stream_mut(&mut self) -> &mut S {
		&mut self.stream
	}

	pub fn queued(&self) -> usize {
		self.buf_out.len() + if self.frame_out.is_empty() { 0 } else { 1 }
	}

	fn is_subscribed(&self, frame: &MtFrame) -> bool {
		self.subscriptions.iter().any(|(s, c)| *s == frame.subsystem && *c == frame.command)
	}

	fn flush_out(&mut self) -> Result<(), Error> {
		loop {
			if self.frame_out.is_empty() {
				match self.buf_out.pop_front() {
					Some(frame) => self.frame_out.push_frame(&frame, &())?,
					None => return Ok(())
				}
			}

			match self.frame_out.poll_write(&mut self.stream) {
				Ok(true) => {},
				Ok(false) => return Ok(()),
				Err(e) => {
					//the frame is not retried, its request expires unconfirmed
					tracing::warn!("dropping outgoing frame: {}", e);
					self.frame_out.clear();

					return Err(e.into());
				}
			}
		}
	}
}

impl<S: FrameRead + FrameWrite> Transport for StreamTransport<S> {
	fn subscribe(&mut self, subsystem: Subsystem, commands: &[u8]) -> Result<(), Error> {
		for command in commands {
			if !self.subscriptions.contains(&(subsystem, *command)) {
				self.subscriptions.push((subsystem, *command));
			}
		}

		Ok(())
	}

	fn submit(&mut self, frame: MtFrame) -> Result<(), Error> {
		self.buf_out.push_back(frame);

		Ok(())
	}

	fn poll(&mut self) -> Result<Option<MtFrame>, Error> {
		self.flush_out()?;

		match self.frame_in.poll_read::<MtFrame, _>(&mut self.stream, &()) {
			Ok(Some(frame)) => {
				if self.is_subscribed(&frame) {
					Ok(Some(frame))
				}
				else {
					tracing::trace!("no subscriber for frame {:#04x} {:#04x}", frame.cmd0(), frame.command);
					Ok(None)
				}
			},
			Ok(None) => Ok(None),
			Err(e) if e.need_reset() => Err(e.into()),
			Err(e) => {
				tracing::warn!("dropping frame: {}", e);
				Ok(None)
			}
		}
	}
}

#[cfg(feature = "serialport")]
pub fn open_serial(path: &str, baud_rate: u32) -> Result<StreamTransport<impl FrameRead + FrameWrite>, Error> {
	Ok(StreamTransport::new(frames::frames_serialport::open(path, baud_rate)?))
}
