use serde::{ Deserialize };
use std::time::Duration;
use crate::{ Error, af::{ DATA_REQUEST_DEFAULT_OPTIONS, DATA_REQUEST_DEFAULT_RADIUS } };

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
	pub confirm_timeout_ms: u64,	//how long a command may wait for its SRSP
	pub options: u8,	//transmit options of data requests
	pub radius: u8,	//max hops of data requests
}

impl Default for SessionConfig {
	fn default() -> Self {
		SessionConfig {
			confirm_timeout_ms: 5000,
			options: DATA_REQUEST_DEFAULT_OPTIONS,
			radius: DATA_REQUEST_DEFAULT_RADIUS,
		}
	}
}

impl SessionConfig {
	pub fn from_json(s: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(s)?)
	}

	pub fn confirm_timeout(&self) -> Duration {
		Duration::from_millis(self.confirm_timeout_ms)
	}
}
