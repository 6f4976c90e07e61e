use crate::status::ZStatus;

/// Rolling 8-bit transaction id stamped on outgoing data requests.
///
/// Only a successful data request confirmation moves it forward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSequencer {
	value: u8
}

impl TransactionSequencer {
	pub fn starting_at(value: u8) -> Self {
		Self { value }
	}

	pub fn current(&self) -> u8 {
		self.value
	}

	pub fn advance_on_success(&mut self, status: ZStatus) -> u8 {
		if status.is_success() {
			self.value = self.value.wrapping_add(1);
		}

		self.value
	}
}
