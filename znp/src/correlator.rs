//matches SRSP confirmations to the commands waiting for them
//the znp answers SREQs in order, so the oldest pending entry for a command is the one confirmed
//a timed out request stays queued as an expired marker, its late SRSP must not reach a newer request

use std::{ collections::VecDeque, time::Instant };
use crate::{ af::AfCommand, error::{ CommandError, Outcome } };

pub type Notify = Box<dyn FnOnce(Outcome)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
	Resolved(RequestId),
	//confirmation of a request already resolved as unconfirmed
	Late(RequestId)
}

struct Pending {
	id: RequestId,
	command: AfCommand,
	deadline: Instant,
	expired: bool,
	notify: Option<Notify>
}

impl Pending {
	fn resolve(&mut self, outcome: Outcome) {
		if let Some(notify) = self.notify.take() {
			notify(outcome);
		}
	}
}

impl core::fmt::Debug for Pending {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Pending")
			.field("id", &self.id)
			.field("command", &self.command)
			.field("deadline", &self.deadline)
			.field("expired", &self.expired)
			.field("notify", &self.notify.is_some())
			.finish()
	}
}

#[derive(Debug, Default)]
pub struct Correlator {
	pending: VecDeque<Pending>,
	next_id: u32
}

impl Correlator {
	pub fn arm(&mut self, command: AfCommand, notify: Option<Notify>, deadline: Instant) -> RequestId {
		let id = RequestId(self.next_id);

		self.next_id = self.next_id.wrapping_add(1);
		self.pending.push_back(Pending { id, command, deadline, expired: false, notify });

		id
	}

	//drops a request that never reached the radio, its notification is not called
	pub fn cancel(&mut self, id: RequestId) -> bool {
		match self.pending.iter().position(|p| p.id == id) {
			Some(i) => {
				self.pending.remove(i);
				true
			},
			None => false
		}
	}

	pub fn fire(&mut self, command: AfCommand, outcome: Outcome) -> Option<Fired> {
		let i = self.pending.iter().position(|p| p.command == command)?;

		//expired requests submitted before this one will never be answered
		let mut index = 0;
		let mut stale = 0;

		self.pending.retain(|p| {
			let keep = index >= i || !p.expired;

			index += 1;
			if !keep {
				stale += 1;
			}

			keep
		});

		if stale > 0 {
			tracing::debug!("dropped {} expired requests without confirmation", stale);
		}

		let mut pending = self.pending.remove(i - stale)?;

		if pending.expired {
			return Some(Fired::Late(pending.id));
		}

		pending.resolve(outcome);

		Some(Fired::Resolved(pending.id))
	}

	pub fn expire(&mut self, now: Instant) -> Vec<(RequestId, AfCommand)> {
		let mut expired = Vec::new();

		for p in self.pending.iter_mut().filter(|p| !p.expired && p.deadline <= now) {
			p.expired = true;
			expired.push((p.id, p.command));
			p.resolve(Err(CommandError::Unconfirmed));
		}

		expired
	}

	pub fn close(&mut self) -> usize {
		let pending = std::mem::take(&mut self.pending);
		let mut n = 0;

		for mut p in pending.into_iter().filter(|p| !p.expired) {
			p.resolve(Err(CommandError::Unconfirmed));
			n += 1;
		}

		n
	}

	fn live(&self) -> impl Iterator<Item = &Pending> {
		self.pending.iter().filter(|p| !p.expired)
	}

	pub fn is_pending(&self, id: RequestId) -> bool {
		self.live().any(|p| p.id == id)
	}

	pub fn next_deadline(&self) -> Option<Instant> {
		self.live().map(|p| p.deadline).min()
	}

	//requests still waiting for an outcome, expired markers not counted
	pub fn len(&self) -> usize {
		self.live().count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
