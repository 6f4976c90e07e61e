use std::time::Instant;
use tracing::{ debug, error, info, warn };
use crate::{
	Error,
	af::{ self, AddrMode, AfCommand, AfRequest, AfResponse, DataRequestExtFormat, DataRequestFormat, EndpointDescriptor, IncomingMessage, InterPanCommand, RegisterFormat },
	config::SessionConfig,
	correlator::{ Correlator, Fired, Notify, RequestId },
	error::CommandError,
	mt::{ MtFrame, Subsystem },
	sequencer::TransactionSequencer,
	status::ZStatus,
	transport::Transport
};

pub type MessageHandler = Box<dyn FnMut(&IncomingMessage)>;

/// AF layer of one znp coprocessor.
///
/// Requests return as soon as they are queued on the transport. Their outcome is
/// delivered later to the `notify` given with the request, from within `dispatch`,
/// `expire` or `close`, exactly once.
pub struct AfSession<T: Transport> {
	transport: T,
	config: SessionConfig,
	sequencer: TransactionSequencer,
	correlator: Correlator,
	message_handler: Option<MessageHandler>,
	registered: bool
}

impl<T: Transport> AfSession<T> {
	pub fn new(transport: T) -> Self {
		Self::with_config(transport, SessionConfig::default())
	}

	pub fn with_config(transport: T, config: SessionConfig) -> Self {
		Self {
			transport,
			config,
			sequencer: TransactionSequencer::default(),
			correlator: Correlator::default(),
			message_handler: None,
			registered: false
		}
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn transaction_id(&self) -> u8 {
		self.sequencer.current()
	}

	pub fn pending(&self) -> usize {
		self.correlator.len()
	}

	pub fn is_pending(&self, id: RequestId) -> bool {
		self.correlator.is_pending(id)
	}

	pub fn next_deadline(&self) -> Option<Instant> {
		self.correlator.next_deadline()
	}

	//has to be called once before any request
	pub fn register_callbacks(&mut self) -> Result<(), Error> {
		self.transport.subscribe(Subsystem::Af, &af::AF_CALLBACKS)?;
		self.registered = true;

		Ok(())
	}

	pub fn set_message_handler<F: FnMut(&IncomingMessage) + 'static>(&mut self, handler: F) {
		self.message_handler = Some(Box::new(handler));
	}

	pub fn clear_message_handler(&mut self) {
		self.message_handler = None;
	}

	pub fn register_endpoint(&mut self, descriptor: &EndpointDescriptor, notify: Option<Notify>) -> Result<RequestId, Error> {
		info!("Registering new endpoint {} with profile {:#06x}", descriptor.endpoint, descriptor.profile_id);

		let req = RegisterFormat::new(descriptor).map_err(|e| {
			error!("Cannot register endpoint {}: {}", descriptor.endpoint, e);
			e
		})?;

		self.submit(AfRequest::Register(req), notify)
	}

	pub fn set_inter_pan_endpoint(&mut self, endpoint: u8, notify: Option<Notify>) -> Result<RequestId, Error> {
		info!("Setting inter-pan endpoint {:#04x}", endpoint);

		self.inter_pan_ctl(InterPanCommand::Register { endpoint }, notify)
	}

	pub fn set_inter_pan_channel(&mut self, channel: u8, notify: Option<Notify>) -> Result<RequestId, Error> {
		info!("Setting inter-pan channel {:#04x}", channel);

		self.inter_pan_ctl(InterPanCommand::Set { channel }, notify)
	}

	pub fn clear_inter_pan(&mut self, notify: Option<Notify>) -> Result<RequestId, Error> {
		info!("Clearing inter-pan state");

		self.inter_pan_ctl(InterPanCommand::Clear, notify)
	}

	pub fn check_inter_pan(&mut self, pan_id: u16, endpoint: u8, notify: Option<Notify>) -> Result<RequestId, Error> {
		info!("Checking inter-pan state of pan {:#06x} endpoint {:#04x}", pan_id, endpoint);

		self.inter_pan_ctl(InterPanCommand::Check { pan_id, endpoint }, notify)
	}

	fn inter_pan_ctl(&mut self, command: InterPanCommand, notify: Option<Notify>) -> Result<RequestId, Error> {
		self.submit(AfRequest::InterPanCtl(command), notify)
	}

	/// Sends `data` to a short address using AF_DATA_REQUEST_EXT.
	///
	/// An empty or oversized payload fails right away with [`Error::InvalidArgument`];
	/// nothing is submitted then and `notify` is dropped without being called.
	pub fn send_data(&mut self, dst_addr: u16, dst_pan: u16, src_endpoint: u8, dst_endpoint: u8, cluster_id: u16, data: &[u8], notify: Option<Notify>) -> Result<RequestId, Error> {
		if let Err(e) = af::check_payload(data, af::MAX_DATA_REQUEST_EXT_LEN) {
			error!("Cannot send AF_DATA_REQUEST_EXT: {}", e);
			return Err(e);
		}

		debug!("Sending AF_DATA_REQUEST_EXT to {:#06x} (pan {:#06x})", dst_addr, dst_pan);

		let req = DataRequestExtFormat {
			dst_addr_mode: AddrMode::Short,
			dst_addr: af::short_dst_addr(dst_addr),
			dst_endpoint,
			dst_pan_id: dst_pan,
			src_endpoint,
			cluster_id,
			trans_id: self.sequencer.current(),
			options: self.config.options,
			radius: self.config.radius,
			len: data.len() as u16,
			data: data.to_vec()
		};

		self.submit(AfRequest::DataRequestExt(req), notify)
	}

	//same as send_data, within the own pan using the plain AF_DATA_REQUEST
	pub fn send_data_short(&mut self, dst_addr: u16, src_endpoint: u8, dst_endpoint: u8, cluster_id: u16, data: &[u8], notify: Option<Notify>) -> Result<RequestId, Error> {
		if let Err(e) = af::check_payload(data, af::MAX_DATA_REQUEST_LEN) {
			error!("Cannot send AF_DATA_REQUEST: {}", e);
			return Err(e);
		}

		debug!("Sending AF_DATA_REQUEST to {:#06x}", dst_addr);

		let req = DataRequestFormat {
			dst_addr,
			dst_endpoint,
			src_endpoint,
			cluster_id,
			trans_id: self.sequencer.current(),
			options: self.config.options,
			radius: self.config.radius,
			len: data.len() as u8,
			data: data.to_vec()
		};

		self.submit(AfRequest::DataRequest(req), notify)
	}

	fn submit(&mut self, request: AfRequest, notify: Option<Notify>) -> Result<RequestId, Error> {
		if !self.registered {
			return Err(Error::CallbacksNotRegistered);
		}

		let command = request.command();
		let frame = request.to_frame()?;
		let id = self.correlator.arm(command, notify, Instant::now() + self.config.confirm_timeout());

		debug!("Submitting {} ({:#04x}) as {:?}", command, command.id(), id);

		if let Err(e) = self.transport.submit(frame) {
			error!("Cannot submit {}: {}", command, e);
			self.correlator.cancel(id);

			return Err(e);
		}

		Ok(id)
	}

	/// Handles one AF frame received from the transport.
	pub fn dispatch(&mut self, frame: &MtFrame) -> Result<(), Error> {
		match AfResponse::from_frame(frame)? {
			AfResponse::Register { status } => {
				self.confirm(AfCommand::Register, status);
			},
			AfResponse::DataRequest { status } => {
				self.sequencer.advance_on_success(status);
				self.confirm(AfCommand::DataRequest, status);
			},
			AfResponse::DataRequestExt { status } => {
				self.sequencer.advance_on_success(status);
				self.confirm(AfCommand::DataRequestExt, status);
			},
			AfResponse::InterPanCtl { status } => {
				self.confirm(AfCommand::InterPanCtl, status);
			},
			AfResponse::DataConfirm { status, endpoint, trans_id } => {
				if status.is_success() {
					info!("Data request sent (endpoint {:#04x}, transaction {:#04x})", endpoint, trans_id);
				}
				else {
					error!("Error sending data request (endpoint {:#04x}, transaction {:#04x}): {}", endpoint, trans_id, status);
				}
			},
			AfResponse::IncomingMsg(msg) => {
				debug!(
					group_id = msg.group_id,
					cluster_id = msg.cluster_id,
					src_addr = msg.src_addr,
					src_endpoint = msg.src_endpoint,
					dst_endpoint = msg.dst_endpoint,
					was_broadcast = msg.was_broadcast,
					link_quality = msg.link_quality,
					security_use = msg.security_use,
					timestamp = msg.timestamp,
					trans_seq_num = msg.trans_seq_num,
					len = msg.len,
					"AF message received"
				);

				self.deliver(IncomingMessage::from(msg));
			},
			AfResponse::IncomingMsgExt(msg) => {
				debug!(
					group_id = msg.group_id,
					cluster_id = msg.cluster_id,
					src_addr_mode = ?msg.src_addr_mode,
					src_addr = msg.src_addr,
					src_endpoint = msg.src_endpoint,
					src_pan_id = msg.src_pan_id,
					dst_endpoint = msg.dst_endpoint,
					was_broadcast = msg.was_broadcast,
					link_quality = msg.link_quality,
					security_use = msg.security_use,
					timestamp = msg.timestamp,
					trans_seq_num = msg.trans_seq_num,
					len = msg.len,
					"Extended AF message received"
				);

				//TODO: reassemble payloads spread over several AF_DATA_RETRIEVE chunks
				match IncomingMessage::try_from(msg) {
					Ok(m) => self.deliver(m),
					Err(e) => warn!("Dropping incoming message: {}", e)
				}
			},
			AfResponse::ReflectError { status, endpoint, trans_id, dst_addr_mode, dst_addr } => {
				warn!("Reflected message failed (endpoint {:#04x}, transaction {:#04x}, {:?} {:#06x}): {}", endpoint, trans_id, dst_addr_mode, dst_addr, status);
			},
			AfResponse::DataRetrieve { status, length, .. } => {
				debug!("Unhandled AF_DATA_RETRIEVE response ({}, {} bytes)", status, length);
			}
		}

		Ok(())
	}

	fn confirm(&mut self, command: AfCommand, status: ZStatus) {
		let outcome = if status.is_success() {
			match command {
				AfCommand::Register => info!("New endpoint registered"),
				AfCommand::DataRequest => info!("Data request sent to remote device"),
				AfCommand::DataRequestExt => info!("Extended data request sent to remote device"),
				AfCommand::InterPanCtl => info!("Inter-pan command applied"),
			}

			Ok(())
		}
		else {
			error!("{} rejected: {}", command, status);

			Err(CommandError::Rejected(status))
		};

		match self.correlator.fire(command, outcome) {
			Some(Fired::Resolved(_)) => {},
			Some(Fired::Late(id)) => warn!("{} ({:?}) confirmed after it expired", command, id),
			None => warn!("{} confirmation without pending request", command)
		}
	}

	fn deliver(&mut self, msg: IncomingMessage) {
		if let Some(handler) = self.message_handler.as_mut() {
			handler(&msg);
		}
	}

	/// Resolves requests whose confirmation is overdue with [`CommandError::Unconfirmed`].
	pub fn expire(&mut self, now: Instant) -> usize {
		let expired = self.correlator.expire(now);

		for (id, command) in expired.iter() {
			warn!("{} ({:?}) was never confirmed", command, id);
		}

		expired.len()
	}

	//one turn of the host event loop, returns true when a frame was handled
	pub fn run_once(&mut self) -> Result<bool, Error> {
		let frame = self.transport.poll()?;

		if let Some(frame) = &frame {
			if let Err(e) = self.dispatch(frame) {
				warn!("Dropping frame: {}", e);
			}
		}

		self.expire(Instant::now());

		Ok(frame.is_some())
	}

	//resolves everything still pending, the session can't be used afterwards
	pub fn close(&mut self) {
		let n = self.correlator.close();

		if n > 0 {
			warn!("Session closed with {} unconfirmed requests", n);
		}

		self.message_handler = None;
		self.registered = false;
	}
}

impl<T: Transport> Drop for AfSession<T> {
	fn drop(&mut self) {
		self.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ af::IncomingMsgFormat, error::Outcome, mt::MtType };
	use deku::DekuContainerWrite;
	use std::{ cell::RefCell, rc::Rc, time::Duration };

	#[derive(Default)]
	struct MockTransport {
		submitted: Vec<MtFrame>,
		subscribed: Vec<(Subsystem, u8)>,
		fail: bool
	}

	impl Transport for MockTransport {
		fn subscribe(&mut self, subsystem: Subsystem, commands: &[u8]) -> Result<(), Error> {
			self.subscribed.extend(commands.iter().map(|c| (subsystem, *c)));
			Ok(())
		}

		fn submit(&mut self, frame: MtFrame) -> Result<(), Error> {
			if self.fail {
				return Err(frames::Error::WouldBlock.into());
			}

			self.submitted.push(frame);
			Ok(())
		}
	}

	fn session() -> AfSession<MockTransport> {
		let mut s = AfSession::new(MockTransport::default());
		s.register_callbacks().unwrap();
		s
	}

	fn outcomes() -> (Rc<RefCell<Vec<Outcome>>>, impl Fn() -> Option<Notify>) {
		let log = Rc::new(RefCell::new(Vec::new()));
		let l = log.clone();

		(log, move || {
			let l = l.clone();
			Some(Box::new(move |o| l.borrow_mut().push(o)) as Notify)
		})
	}

	fn srsp(command: u8, status: ZStatus) -> MtFrame {
		MtFrame::new(MtType::Srsp, Subsystem::Af, command, status.to_bytes().unwrap())
	}

	#[test]
	fn requires_registered_callbacks() {
		let mut s = AfSession::new(MockTransport::default());

		assert!(matches!(s.set_inter_pan_channel(11, None), Err(Error::CallbacksNotRegistered)));
		assert!(s.transport().submitted.is_empty());

		s.register_callbacks().unwrap();
		assert_eq!(s.transport().subscribed.len(), af::AF_CALLBACKS.len());
		assert!(s.set_inter_pan_channel(11, None).is_ok());
	}

	#[test]
	fn register_endpoint_confirmed() {
		let (log, notify) = outcomes();
		let mut s = session();

		let descriptor = EndpointDescriptor {
			endpoint: 1,
			profile_id: 0x0104,
			device_id: 5,
			device_version: 1,
			input_clusters: vec![0x0000, 0x0006],
			output_clusters: vec![]
		};

		let id = s.register_endpoint(&descriptor, notify()).unwrap();

		assert!(s.is_pending(id));
		assert_eq!(s.transport().submitted[0].command, af::AF_REGISTER);

		s.dispatch(&srsp(af::AF_REGISTER, ZStatus::Success)).unwrap();

		assert_eq!(*log.borrow(), vec![Ok(())]);
		assert_eq!(s.transaction_id(), 0);
		assert_eq!(s.pending(), 0);
	}

	#[test]
	fn send_data_uses_current_transaction_id() {
		let (log, notify) = outcomes();
		let mut s = session();
		s.sequencer = TransactionSequencer::starting_at(5);

		s.send_data(0x1234, 0xABCD, 1, 1, 0x0006, &[0x01], notify()).unwrap();

		match AfRequest::from_frame(&s.transport().submitted[0]).unwrap() {
			AfRequest::DataRequestExt(req) => {
				assert_eq!(req.trans_id, 5);
				assert_eq!(req.dst_addr_mode, AddrMode::Short);
				assert_eq!(req.dst_addr, [0x34, 0x12, 0, 0, 0, 0, 0, 0]);
				assert_eq!(req.radius, 5);
				assert_eq!(req.data, vec![0x01]);
			},
			r => panic!("unexpected request {:?}", r)
		}

		s.dispatch(&srsp(af::AF_DATA_REQUEST_EXT, ZStatus::Success)).unwrap();

		assert_eq!(s.transaction_id(), 6);
		assert_eq!(*log.borrow(), vec![Ok(())]);
	}

	#[test]
	fn empty_payload_is_not_submitted() {
		let (log, notify) = outcomes();
		let mut s = session();

		assert!(matches!(s.send_data(0x1234, 0xABCD, 1, 1, 0x0006, &[], notify()), Err(Error::InvalidArgument(_))));
		assert!(matches!(s.send_data_short(0x1234, 1, 1, 0x0006, &[], notify()), Err(Error::InvalidArgument(_))));

		assert!(s.transport().submitted.is_empty());
		assert_eq!(s.pending(), 0);

		s.close();
		assert!(log.borrow().is_empty());
	}

	#[test]
	fn rejection_reaches_notify_and_keeps_sequence() {
		let (log, notify) = outcomes();
		let mut s = session();

		s.send_data_short(0x0000, 1, 1, 0x0006, &[0x01], notify()).unwrap();
		s.dispatch(&srsp(af::AF_DATA_REQUEST, ZStatus::Failure)).unwrap();

		assert_eq!(s.transaction_id(), 0);
		assert_eq!(*log.borrow(), vec![Err(CommandError::Rejected(ZStatus::Failure))]);
	}

	#[test]
	fn failed_submit_is_not_pending() {
		let (log, notify) = outcomes();
		let mut s = session();
		s.transport_mut().fail = true;

		assert!(s.set_inter_pan_endpoint(2, notify()).is_err());
		assert_eq!(s.pending(), 0);

		s.close();
		assert!(log.borrow().is_empty());
	}

	#[test]
	fn overdue_request_resolves_unconfirmed() {
		let (log, notify) = outcomes();
		let mut s = session();

		s.set_inter_pan_channel(11, notify()).unwrap();

		assert_eq!(s.expire(Instant::now()), 0);
		assert_eq!(s.expire(Instant::now() + Duration::from_secs(6)), 1);
		assert_eq!(*log.borrow(), vec![Err(CommandError::Unconfirmed)]);

		//late confirmation finds nothing to resolve
		s.dispatch(&srsp(af::AF_INTER_PAN_CTL, ZStatus::Success)).unwrap();
		assert_eq!(log.borrow().len(), 1);
	}

	#[test]
	fn late_confirmation_is_not_taken_by_next_request() {
		let (first, notify_first) = outcomes();
		let (second, notify_second) = outcomes();
		let mut s = session();

		s.set_inter_pan_channel(11, notify_first()).unwrap();
		assert_eq!(s.expire(Instant::now() + Duration::from_secs(6)), 1);

		let id = s.set_inter_pan_channel(12, notify_second()).unwrap();

		//answer to channel 11 arrives after its deadline
		s.dispatch(&srsp(af::AF_INTER_PAN_CTL, ZStatus::InvalidParameter)).unwrap();

		assert!(s.is_pending(id));
		assert!(second.borrow().is_empty());

		s.dispatch(&srsp(af::AF_INTER_PAN_CTL, ZStatus::Success)).unwrap();

		assert_eq!(*first.borrow(), vec![Err(CommandError::Unconfirmed)]);
		assert_eq!(*second.borrow(), vec![Ok(())]);
		assert_eq!(s.pending(), 0);
	}

	#[test]
	fn plain_data_request_success_advances_sequence() {
		let (log, notify) = outcomes();
		let mut s = session();

		s.send_data_short(0x1234, 1, 1, 0x0006, &[0x01], notify()).unwrap();

		match AfRequest::from_frame(&s.transport().submitted[0]).unwrap() {
			AfRequest::DataRequest(req) => assert_eq!(req.trans_id, 0),
			r => panic!("unexpected request {:?}", r)
		}

		s.dispatch(&srsp(af::AF_DATA_REQUEST, ZStatus::Success)).unwrap();

		assert_eq!(s.transaction_id(), 1);
		assert_eq!(*log.borrow(), vec![Ok(())]);
		assert_eq!(s.pending(), 0);
	}

	#[test]
	fn incoming_message_reaches_handler() {
		let received = Rc::new(RefCell::new(Vec::new()));
		let r = received.clone();
		let mut s = session();

		s.set_message_handler(move |m| r.borrow_mut().push(m.clone()));

		let msg = IncomingMsgFormat {
			group_id: 0,
			cluster_id: 0x0006,
			src_addr: 0x1234,
			src_endpoint: 1,
			dst_endpoint: 2,
			was_broadcast: 0,
			link_quality: 0x50,
			security_use: 0,
			timestamp: 0,
			trans_seq_num: 1,
			len: 2,
			data: vec![0x10, 0x20]
		};

		s.dispatch(&AfResponse::IncomingMsg(msg).to_frame().unwrap()).unwrap();

		assert_eq!(*received.borrow(), vec![IncomingMessage { endpoint: 2, cluster_id: 0x0006, data: vec![0x10, 0x20] }]);
	}

	#[test]
	fn cleared_handler_receives_nothing() {
		let received = Rc::new(RefCell::new(0));
		let r = received.clone();
		let mut s = session();

		s.set_message_handler(move |_| *r.borrow_mut() += 1);

		let frame = AfResponse::IncomingMsg(IncomingMsgFormat {
			group_id: 0,
			cluster_id: 0x0006,
			src_addr: 0x1234,
			src_endpoint: 1,
			dst_endpoint: 2,
			was_broadcast: 0,
			link_quality: 0x50,
			security_use: 0,
			timestamp: 0,
			trans_seq_num: 1,
			len: 1,
			data: vec![0x10]
		}).to_frame().unwrap();

		s.dispatch(&frame).unwrap();
		s.clear_message_handler();
		s.dispatch(&frame).unwrap();

		assert_eq!(*received.borrow(), 1);
	}
}
