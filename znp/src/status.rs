use deku::{ self, prelude::* };

//z-stack status codes, as returned in every SRSP and most AREQ frames

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum ZStatus {
	#[deku(id = "0x00")]
	Success,
	#[deku(id = "0x01")]
	Failure,
	#[deku(id = "0x02")]
	InvalidParameter,
	#[deku(id = "0x03")]
	NvItemUninit,
	#[deku(id = "0x04")]
	NvOperFailed,
	#[deku(id = "0x05")]
	NvBadItemLen,
	#[deku(id = "0x10")]
	MemError,
	#[deku(id = "0x11")]
	BufferFull,
	#[deku(id = "0x12")]
	UnsupportedMode,
	#[deku(id = "0x13")]
	MacMemError,
	#[deku(id = "0x80")]
	ZdoInvalidRequestType,
	#[deku(id = "0x82")]
	ZdoInvalidEndpoint,
	#[deku(id = "0x84")]
	ZdoUnsupported,
	#[deku(id = "0x85")]
	ZdoTimeout,
	#[deku(id = "0x86")]
	ZdoNoMatch,
	#[deku(id = "0x87")]
	ZdoTableFull,
	#[deku(id = "0x88")]
	ZdoNoBindEntry,
	#[deku(id = "0xA1")]
	SecNoKey,
	#[deku(id = "0xA2")]
	SecOldFrmCount,
	#[deku(id = "0xA3")]
	SecMaxFrmCount,
	#[deku(id = "0xA4")]
	SecCcmFail,
	#[deku(id = "0xB1")]
	ApsFail,
	#[deku(id = "0xB2")]
	ApsTableFull,
	#[deku(id = "0xB3")]
	ApsIllegalRequest,
	#[deku(id = "0xB4")]
	ApsInvalidBinding,
	#[deku(id = "0xB5")]
	ApsUnsupportedAttrib,
	#[deku(id = "0xB6")]
	ApsNotSupported,
	#[deku(id = "0xB7")]
	ApsNoAck,
	#[deku(id = "0xB8")]
	ApsDuplicateEntry,
	#[deku(id = "0xB9")]
	ApsNoBoundDevice,
	#[deku(id = "0xBA")]
	ApsNotAllowed,
	#[deku(id = "0xBB")]
	ApsNotAuthenticated,
	#[deku(id = "0xC1")]
	NwkInvalidParam,
	#[deku(id = "0xC2")]
	NwkInvalidRequest,
	#[deku(id = "0xC3")]
	NwkNotPermitted,
	#[deku(id = "0xC4")]
	NwkStartupFailure,
	#[deku(id = "0xC7")]
	NwkTableFull,
	#[deku(id = "0xC8")]
	NwkUnknownDevice,
	#[deku(id = "0xC9")]
	NwkUnsupportedAttribute,
	#[deku(id = "0xCA")]
	NwkNoNetworks,
	#[deku(id = "0xCB")]
	NwkLeaveUnconfirmed,
	#[deku(id = "0xCC")]
	NwkNoAck,
	#[deku(id = "0xCD")]
	NwkNoRoute,
	#[deku(id = "0xE9")]
	MacNoAck,
	#[deku(id = "0xF0")]
	MacTransactionExpired,
	//codes this table doesn't know, kept so the raw value can still be logged
	#[deku(id_pat = "_")]
	Unknown(u8),
}

impl ZStatus {
	pub fn is_success(&self) -> bool {
		*self == ZStatus::Success
	}

	pub fn reason(&self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failure => "failure",
			Self::InvalidParameter => "invalid parameter",
			Self::NvItemUninit => "nv item not initialized",
			Self::NvOperFailed => "nv operation failed",
			Self::NvBadItemLen => "nv item has bad length",
			Self::MemError => "out of memory",
			Self::BufferFull => "buffer full",
			Self::UnsupportedMode => "unsupported mode",
			Self::MacMemError => "mac out of memory",
			Self::ZdoInvalidRequestType => "zdo invalid request type",
			Self::ZdoInvalidEndpoint => "zdo invalid endpoint",
			Self::ZdoUnsupported => "zdo unsupported",
			Self::ZdoTimeout => "zdo timeout",
			Self::ZdoNoMatch => "zdo no match",
			Self::ZdoTableFull => "zdo table full",
			Self::ZdoNoBindEntry => "zdo no bind entry",
			Self::SecNoKey => "security: no key",
			Self::SecOldFrmCount => "security: old frame counter",
			Self::SecMaxFrmCount => "security: max frame counter",
			Self::SecCcmFail => "security: ccm failure",
			Self::ApsFail => "aps failure",
			Self::ApsTableFull => "aps table full",
			Self::ApsIllegalRequest => "aps illegal request",
			Self::ApsInvalidBinding => "aps invalid binding",
			Self::ApsUnsupportedAttrib => "aps unsupported attribute",
			Self::ApsNotSupported => "aps not supported",
			Self::ApsNoAck => "aps no ack",
			Self::ApsDuplicateEntry => "aps duplicate entry",
			Self::ApsNoBoundDevice => "aps no bound device",
			Self::ApsNotAllowed => "aps not allowed",
			Self::ApsNotAuthenticated => "aps not authenticated",
			Self::NwkInvalidParam => "nwk invalid parameter",
			Self::NwkInvalidRequest => "nwk invalid request",
			Self::NwkNotPermitted => "nwk not permitted",
			Self::NwkStartupFailure => "nwk startup failure",
			Self::NwkTableFull => "nwk table full",
			Self::NwkUnknownDevice => "nwk unknown device",
			Self::NwkUnsupportedAttribute => "nwk unsupported attribute",
			Self::NwkNoNetworks => "nwk no networks",
			Self::NwkLeaveUnconfirmed => "nwk leave unconfirmed",
			Self::NwkNoAck => "nwk no ack",
			Self::NwkNoRoute => "nwk no route",
			Self::MacNoAck => "mac no ack",
			Self::MacTransactionExpired => "mac transaction expired",
			Self::Unknown(_) => "unknown status",
		}
	}
}

impl core::fmt::Display for ZStatus {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Unknown(code) => write!(f, "unknown status {:#04x}", code),
			_ => write!(f, "{}", self.reason())
		}
	}
}
