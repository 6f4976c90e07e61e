//application framework (AF) subsystem of the znp monitor and test protocol

use deku::{ self, prelude::* };
use crate::{ Error, mt::{ MtFrame, MtType, Subsystem }, status::ZStatus };

pub const MAX_CLUSTERS: usize = 16;
pub const MAX_DATA_REQUEST_LEN: usize = 128;
pub const MAX_DATA_REQUEST_EXT_LEN: usize = 230;

pub const DATA_REQUEST_DEFAULT_OPTIONS: u8 = 0x00;
pub const DATA_REQUEST_DEFAULT_RADIUS: u8 = 0x05;

//cmd1 values
pub const AF_REGISTER: u8 = 0x00;
pub const AF_DATA_REQUEST: u8 = 0x01;
pub const AF_DATA_REQUEST_EXT: u8 = 0x02;
pub const AF_INTER_PAN_CTL: u8 = 0x10;
pub const AF_DATA_RETRIEVE: u8 = 0x12;
pub const AF_DATA_CONFIRM: u8 = 0x80;
pub const AF_INCOMING_MSG: u8 = 0x81;
pub const AF_INCOMING_MSG_EXT: u8 = 0x82;
pub const AF_REFLECT_ERROR: u8 = 0x83;

//responses and indications the session wants from the transport
pub const AF_CALLBACKS: [u8; 9] = [
	AF_REGISTER,
	AF_DATA_REQUEST,
	AF_DATA_REQUEST_EXT,
	AF_DATA_CONFIRM,
	AF_INCOMING_MSG,
	AF_INCOMING_MSG_EXT,
	AF_DATA_RETRIEVE,
	AF_REFLECT_ERROR,
	AF_INTER_PAN_CTL,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AfCommand {
	Register,
	DataRequest,
	DataRequestExt,
	InterPanCtl,
}

impl AfCommand {
	pub fn id(&self) -> u8 {
		match self {
			Self::Register => AF_REGISTER,
			Self::DataRequest => AF_DATA_REQUEST,
			Self::DataRequestExt => AF_DATA_REQUEST_EXT,
			Self::InterPanCtl => AF_INTER_PAN_CTL,
		}
	}
}

impl core::fmt::Display for AfCommand {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Register => write!(f, "AF_REGISTER"),
			Self::DataRequest => write!(f, "AF_DATA_REQUEST"),
			Self::DataRequestExt => write!(f, "AF_DATA_REQUEST_EXT"),
			Self::InterPanCtl => write!(f, "AF_INTER_PAN_CTL"),
		}
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum Latency {
	#[deku(id = "0x00")]
	NoLatency,
	#[deku(id = "0x01")]
	FastBeacons,
	#[deku(id = "0x02")]
	SlowBeacons,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum AddrMode {
	#[deku(id = "0x00")]
	NotPresent,
	#[deku(id = "0x01")]
	Group,
	#[deku(id = "0x02")]
	Short,
	#[deku(id = "0x03")]
	Extended,
	#[deku(id = "0xFF")]
	Broadcast,
	#[deku(id_pat = "_")]
	Other(u8),
}

//endpoint to be registered, cluster lists are copied into the request as they are
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointDescriptor {
	pub endpoint: u8,
	pub profile_id: u16,
	pub device_id: u16,
	pub device_version: u8,
	pub input_clusters: Vec<u16>,
	pub output_clusters: Vec<u16>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct RegisterFormat {
	pub endpoint: u8,
	#[deku(endian = "little")]
	pub app_prof_id: u16,
	#[deku(endian = "little")]
	pub app_device_id: u16,
	pub app_dev_ver: u8,
	pub latency_req: Latency,
	pub app_num_in_clusters: u8,
	#[deku(count = "app_num_in_clusters", endian = "little")]
	pub app_in_cluster_list: Vec<u16>,
	pub app_num_out_clusters: u8,
	#[deku(count = "app_num_out_clusters", endian = "little")]
	pub app_out_cluster_list: Vec<u16>,
}

impl RegisterFormat {
	pub fn new(descriptor: &EndpointDescriptor) -> Result<Self, Error> {
		if descriptor.input_clusters.len() > MAX_CLUSTERS {
			return Err(Error::InvalidArgument("too many input clusters"));
		}

		if descriptor.output_clusters.len() > MAX_CLUSTERS {
			return Err(Error::InvalidArgument("too many output clusters"));
		}

		Ok(RegisterFormat {
			endpoint: descriptor.endpoint,
			app_prof_id: descriptor.profile_id,
			app_device_id: descriptor.device_id,
			app_dev_ver: descriptor.device_version,
			latency_req: Latency::NoLatency,
			app_num_in_clusters: descriptor.input_clusters.len() as u8,
			app_in_cluster_list: descriptor.input_clusters.clone(),
			app_num_out_clusters: descriptor.output_clusters.len() as u8,
			app_out_cluster_list: descriptor.output_clusters.clone(),
		})
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct DataRequestFormat {
	#[deku(endian = "little")]
	pub dst_addr: u16,
	pub dst_endpoint: u8,
	pub src_endpoint: u8,
	#[deku(endian = "little")]
	pub cluster_id: u16,
	pub trans_id: u8,
	pub options: u8,
	pub radius: u8,
	pub len: u8,
	#[deku(count = "len")]
	pub data: Vec<u8>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct DataRequestExtFormat {
	pub dst_addr_mode: AddrMode,
	pub dst_addr: [u8; 8],
	pub dst_endpoint: u8,
	#[deku(endian = "little")]
	pub dst_pan_id: u16,
	pub src_endpoint: u8,
	#[deku(endian = "little")]
	pub cluster_id: u16,
	pub trans_id: u8,
	pub options: u8,
	pub radius: u8,
	#[deku(endian = "little")]
	pub len: u16,
	#[deku(count = "len")]
	pub data: Vec<u8>,
}

//payload checks shared by both data request forms
pub fn check_payload(data: &[u8], max: usize) -> Result<(), Error> {
	if data.is_empty() {
		return Err(Error::InvalidArgument("length is invalid"));
	}

	if data.len() > max {
		return Err(Error::InvalidArgument("payload too large"));
	}

	Ok(())
}

//only the short (16-bit) destination address is ever built,
//it takes the first two bytes of the 8-byte address field, little-endian
pub fn short_dst_addr(addr: u16) -> [u8; 8] {
	let mut dst_addr = [0; 8];

	dst_addr[..2].copy_from_slice(&addr.to_le_bytes());

	dst_addr
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum InterPanCommand {
	#[deku(id = "0x00")]
	Clear,
	#[deku(id = "0x01")]
	Set {
		channel: u8
	},
	#[deku(id = "0x02")]
	Register {
		endpoint: u8
	},
	#[deku(id = "0x03")]
	Check {
		#[deku(endian = "little")]
		pan_id: u16,
		endpoint: u8
	},
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum AfRequest {
	#[deku(id = "0x00")]
	Register(RegisterFormat),
	#[deku(id = "0x01")]
	DataRequest(DataRequestFormat),
	#[deku(id = "0x02")]
	DataRequestExt(DataRequestExtFormat),
	#[deku(id = "0x10")]
	InterPanCtl(InterPanCommand),
}

impl AfRequest {
	pub fn command(&self) -> AfCommand {
		match self {
			Self::Register(_) => AfCommand::Register,
			Self::DataRequest(_) => AfCommand::DataRequest,
			Self::DataRequestExt(_) => AfCommand::DataRequestExt,
			Self::InterPanCtl(_) => AfCommand::InterPanCtl,
		}
	}

	pub fn to_frame(&self) -> Result<MtFrame, Error> {
		let mut data = self.to_bytes()?;
		let command = data.remove(0);

		Ok(MtFrame::new(MtType::Sreq, Subsystem::Af, command, data))
	}

	pub fn from_frame(frame: &MtFrame) -> Result<Self, Error> {
		if frame.subsystem != Subsystem::Af || frame.kind != MtType::Sreq {
			return Err(Error::UnexpectedFrame { cmd0: frame.cmd0(), cmd1: frame.command });
		}

		let buf = with_command(frame);
		let (_rest, request) = AfRequest::from_bytes((&buf, 0))?;

		Ok(request)
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct IncomingMsgFormat {
	#[deku(endian = "little")]
	pub group_id: u16,
	#[deku(endian = "little")]
	pub cluster_id: u16,
	#[deku(endian = "little")]
	pub src_addr: u16,
	pub src_endpoint: u8,
	pub dst_endpoint: u8,
	pub was_broadcast: u8,
	pub link_quality: u8,
	pub security_use: u8,
	#[deku(endian = "little")]
	pub timestamp: u32,
	pub trans_seq_num: u8,
	pub len: u8,
	#[deku(count = "len")]
	pub data: Vec<u8>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct IncomingMsgExtFormat {
	#[deku(endian = "little")]
	pub group_id: u16,
	#[deku(endian = "little")]
	pub cluster_id: u16,
	pub src_addr_mode: AddrMode,
	#[deku(endian = "little")]
	pub src_addr: u64,
	pub src_endpoint: u8,
	#[deku(endian = "little")]
	pub src_pan_id: u16,
	pub dst_endpoint: u8,
	pub was_broadcast: u8,
	pub link_quality: u8,
	pub security_use: u8,
	#[deku(endian = "little")]
	pub timestamp: u32,
	pub trans_seq_num: u8,
	#[deku(endian = "little")]
	pub len: u16,
	//may carry less than len bytes, the rest has to be fetched with AF_DATA_RETRIEVE
	#[deku(read_all)]
	pub data: Vec<u8>,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum AfResponse {
	#[deku(id = "0x00")]
	Register {
		status: ZStatus
	},
	#[deku(id = "0x01")]
	DataRequest {
		status: ZStatus
	},
	#[deku(id = "0x02")]
	DataRequestExt {
		status: ZStatus
	},
	#[deku(id = "0x10")]
	InterPanCtl {
		status: ZStatus
	},
	#[deku(id = "0x12")]
	DataRetrieve {
		status: ZStatus,
		length: u8,
		#[deku(count = "length")]
		data: Vec<u8>
	},
	#[deku(id = "0x80")]
	DataConfirm {
		status: ZStatus,
		endpoint: u8,
		trans_id: u8
	},
	#[deku(id = "0x81")]
	IncomingMsg(IncomingMsgFormat),
	#[deku(id = "0x82")]
	IncomingMsgExt(IncomingMsgExtFormat),
	#[deku(id = "0x83")]
	ReflectError {
		status: ZStatus,
		endpoint: u8,
		trans_id: u8,
		dst_addr_mode: AddrMode,
		#[deku(endian = "little")]
		dst_addr: u16
	},
}

impl AfResponse {
	//synchronous responses share cmd1 with their request, indications start at 0x80
	fn expected_type(command: u8) -> MtType {
		if command & 0x80 == 0 { MtType::Srsp } else { MtType::Areq }
	}

	pub fn from_frame(frame: &MtFrame) -> Result<Self, Error> {
		if frame.subsystem != Subsystem::Af || frame.kind != Self::expected_type(frame.command) {
			return Err(Error::UnexpectedFrame { cmd0: frame.cmd0(), cmd1: frame.command });
		}

		let buf = with_command(frame);
		let (_rest, response) = AfResponse::from_bytes((&buf, 0))?;

		Ok(response)
	}

	pub fn to_frame(&self) -> Result<MtFrame, Error> {
		let mut data = self.to_bytes()?;
		let command = data.remove(0);

		Ok(MtFrame::new(Self::expected_type(command), Subsystem::Af, command, data))
	}
}

fn with_command(frame: &MtFrame) -> Vec<u8> {
	let mut buf = Vec::with_capacity(frame.data.len() + 1);

	buf.push(frame.command);
	buf.extend_from_slice(&frame.data);

	buf
}

/// Incoming AF message as handed to the application, whichever encoding it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
	pub endpoint: u8,
	pub cluster_id: u16,
	pub data: Vec<u8>,
}

impl IncomingMessage {
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

impl From<IncomingMsgFormat> for IncomingMessage {
	fn from(msg: IncomingMsgFormat) -> Self {
		IncomingMessage {
			endpoint: msg.dst_endpoint,
			cluster_id: msg.cluster_id,
			data: msg.data
		}
	}
}

impl TryFrom<IncomingMsgExtFormat> for IncomingMessage {
	type Error = Error;

	fn try_from(mut msg: IncomingMsgExtFormat) -> Result<Self, Error> {
		let declared = msg.len as usize;

		if msg.data.len() < declared {
			return Err(Error::Fragmented { declared: msg.len, carried: msg.data.len() });
		}

		msg.data.truncate(declared);

		Ok(IncomingMessage {
			endpoint: msg.dst_endpoint,
			cluster_id: msg.cluster_id,
			data: msg.data
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_register() {
		let descriptor = EndpointDescriptor {
			endpoint: 1,
			profile_id: 0x0104,
			device_id: 5,
			device_version: 1,
			input_clusters: vec![0x0000, 0x0006],
			output_clusters: vec![],
		};

		let frame = AfRequest::Register(RegisterFormat::new(&descriptor).unwrap()).to_frame().unwrap();

		assert_eq!(frame.cmd0(), 0x24);
		assert_eq!(frame.command, AF_REGISTER);
		assert_eq!(frame.data, vec![
			0x01,
			0x04, 0x01,
			0x05, 0x00,
			0x01,
			0x00,
			0x02, 0x00, 0x00, 0x06, 0x00,
			0x00
		]);
	}

	#[test]
	fn rejects_oversized_cluster_list() {
		let descriptor = EndpointDescriptor {
			input_clusters: vec![0; MAX_CLUSTERS + 1],
			..Default::default()
		};

		assert!(matches!(RegisterFormat::new(&descriptor), Err(Error::InvalidArgument(_))));
	}

	#[test]
	fn encodes_data_request() {
		let request = AfRequest::DataRequest(DataRequestFormat {
			dst_addr: 0x1234,
			dst_endpoint: 1,
			src_endpoint: 1,
			cluster_id: 0x0006,
			trans_id: 0,
			options: DATA_REQUEST_DEFAULT_OPTIONS,
			radius: DATA_REQUEST_DEFAULT_RADIUS,
			len: 1,
			data: vec![0x01],
		});

		let frame = request.to_frame().unwrap();

		assert_eq!(request.command().id(), AF_DATA_REQUEST);
		assert_eq!(frame.cmd0(), 0x24);
		assert_eq!(frame.command, AF_DATA_REQUEST);
		assert_eq!(frame.data, vec![
			0x34, 0x12,
			0x01,
			0x01,
			0x06, 0x00,
			0x00,
			0x00,
			0x05,
			0x01,
			0x01
		]);
		assert_eq!(AfRequest::from_frame(&frame).unwrap(), request);
	}

	#[test]
	fn encodes_data_request_ext() {
		let request = AfRequest::DataRequestExt(DataRequestExtFormat {
			dst_addr_mode: AddrMode::Short,
			dst_addr: short_dst_addr(0x1234),
			dst_endpoint: 1,
			dst_pan_id: 0xABCD,
			src_endpoint: 1,
			cluster_id: 0x0006,
			trans_id: 5,
			options: DATA_REQUEST_DEFAULT_OPTIONS,
			radius: DATA_REQUEST_DEFAULT_RADIUS,
			len: 1,
			data: vec![0x01],
		});

		let frame = request.to_frame().unwrap();

		assert_eq!(frame.command, AF_DATA_REQUEST_EXT);
		assert_eq!(frame.data, vec![
			0x02,
			0x34, 0x12, 0, 0, 0, 0, 0, 0,
			0x01,
			0xCD, 0xAB,
			0x01,
			0x06, 0x00,
			0x05,
			0x00,
			0x05,
			0x01, 0x00,
			0x01
		]);
		assert_eq!(AfRequest::from_frame(&frame).unwrap(), request);
	}

	#[test]
	fn encodes_inter_pan_commands() {
		let set = AfRequest::InterPanCtl(InterPanCommand::Set { channel: 11 }).to_frame().unwrap();
		assert_eq!((set.command, set.data), (AF_INTER_PAN_CTL, vec![0x01, 11]));

		let clear = AfRequest::InterPanCtl(InterPanCommand::Clear).to_frame().unwrap();
		assert_eq!(clear.data, vec![0x00]);

		let check = AfRequest::InterPanCtl(InterPanCommand::Check { pan_id: 0x1A62, endpoint: 2 }).to_frame().unwrap();
		assert_eq!(check.data, vec![0x03, 0x62, 0x1A, 0x02]);
	}

	#[test]
	fn checks_payload() {
		assert!(matches!(check_payload(&[], MAX_DATA_REQUEST_EXT_LEN), Err(Error::InvalidArgument(_))));
		assert!(matches!(check_payload(&[0; 129], MAX_DATA_REQUEST_LEN), Err(Error::InvalidArgument(_))));
		assert!(check_payload(&[0; 128], MAX_DATA_REQUEST_LEN).is_ok());
	}

	#[test]
	fn decodes_srsp_status() {
		let frame = MtFrame::new(MtType::Srsp, Subsystem::Af, AF_DATA_REQUEST_EXT, vec![0xCD]);

		assert_eq!(AfResponse::from_frame(&frame).unwrap(), AfResponse::DataRequestExt { status: ZStatus::NwkNoRoute });
	}

	#[test]
	fn rejects_frame_of_wrong_type() {
		let frame = MtFrame::new(MtType::Areq, Subsystem::Af, AF_REGISTER, vec![0x00]);

		assert!(matches!(AfResponse::from_frame(&frame), Err(Error::UnexpectedFrame { cmd0: 0x44, cmd1: 0x00 })));

		let frame = MtFrame::new(MtType::Srsp, Subsystem::Zdo, AF_REGISTER, vec![0x00]);
		assert!(matches!(AfResponse::from_frame(&frame), Err(Error::UnexpectedFrame { .. })));
	}

	#[test]
	fn decodes_incoming_msg() {
		let data = vec![
			0x00, 0x00,	//group
			0x06, 0x00,	//cluster
			0x34, 0x12,	//src addr
			0x01,	//src endpoint
			0x02,	//dst endpoint
			0x00, 0x50, 0x00,
			0x04, 0x03, 0x02, 0x01,	//timestamp
			0x07,
			0x03, 0xAA, 0xBB, 0xCC
		];
		let frame = MtFrame::new(MtType::Areq, Subsystem::Af, AF_INCOMING_MSG, data);

		match AfResponse::from_frame(&frame).unwrap() {
			AfResponse::IncomingMsg(msg) => {
				assert_eq!(msg.src_addr, 0x1234);
				assert_eq!(msg.link_quality, 0x50);
				assert_eq!(msg.timestamp, 0x01020304);
				assert_eq!(msg.trans_seq_num, 7);
				assert_eq!(IncomingMessage::from(msg), IncomingMessage { endpoint: 2, cluster_id: 6, data: vec![0xAA, 0xBB, 0xCC] });
			},
			r => panic!("unexpected response {:?}", r)
		}
	}

	#[test]
	fn extended_message_with_missing_bytes_is_fragmented() {
		let msg = IncomingMsgExtFormat {
			group_id: 0,
			cluster_id: 6,
			src_addr_mode: AddrMode::Extended,
			src_addr: 0x00124B0001020304,
			src_endpoint: 1,
			src_pan_id: 0x1A62,
			dst_endpoint: 1,
			was_broadcast: 0,
			link_quality: 0x40,
			security_use: 0,
			timestamp: 0,
			trans_seq_num: 1,
			len: 300,
			data: vec![0; 200],
		};

		let frame = AfResponse::IncomingMsgExt(msg.clone()).to_frame().unwrap();
		assert_eq!(frame.kind, MtType::Areq);

		match AfResponse::from_frame(&frame).unwrap() {
			AfResponse::IncomingMsgExt(decoded) => assert_eq!(decoded, msg),
			r => panic!("unexpected response {:?}", r)
		}

		assert!(matches!(IncomingMessage::try_from(msg), Err(Error::Fragmented { declared: 300, carried: 200 })));
	}
}
