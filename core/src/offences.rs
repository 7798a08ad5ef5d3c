//! Offence bookkeeping: deduplicates equivocation reports and hands accepted
//! offences to the slashing boundary.
use crate::{
	data::{Database, OffenceReportKey},
	equivocation::{EquivocationOffence, TimeSlot},
	error::OffenceError,
	types::AccountId,
};
use codec::Encode;
use mockall::automock;
use tracing::warn;

use crate::LOG_TARGET;

#[automock]
pub trait ReportOffence {
	/// Reports the offence, failing if it was already reported for the same
	/// offender at the same time slot.
	fn report_offence(
		&self,
		reporters: Vec<AccountId>,
		offence: EquivocationOffence,
	) -> Result<(), OffenceError>;

	fn is_known_offence(&self, offenders: &[AccountId], time_slot: &TimeSlot) -> bool;
}

/// Receives offences that passed validation and deduplication.
pub trait OnOffenceHandler {
	fn on_offence(&self, reporters: &[AccountId], offence: &EquivocationOffence);
}

impl OnOffenceHandler for () {
	fn on_offence(&self, _reporters: &[AccountId], _offence: &EquivocationOffence) {}
}

/// Keeps every accepted report keyed by offence kind, time slot and offender.
/// Reports are never pruned, a report for an old time slot stays a duplicate.
pub struct Offences<D: Database> {
	db: D,
	handler: Box<dyn OnOffenceHandler>,
}

impl<D: Database> Offences<D> {
	pub fn new(db: D) -> Self {
		Self::with_handler(db, Box::new(()))
	}

	pub fn with_handler(db: D, handler: Box<dyn OnOffenceHandler>) -> Self {
		Offences { db, handler }
	}

	fn report_key(time_slot: &TimeSlot, offender: &AccountId) -> OffenceReportKey {
		OffenceReportKey((EquivocationOffence::ID, time_slot, offender).encode())
	}
}

impl<D: Database> ReportOffence for Offences<D> {
	fn report_offence(
		&self,
		reporters: Vec<AccountId>,
		offence: EquivocationOffence,
	) -> Result<(), OffenceError> {
		if self.is_known_offence(std::slice::from_ref(&offence.offender), &offence.time_slot) {
			return Err(OffenceError::DuplicateReport);
		}
		self.db.put(
			Self::report_key(&offence.time_slot, &offence.offender),
			reporters.clone(),
		);

		warn!(
			target: LOG_TARGET,
			offender = %offence.offender,
			set_id = offence.time_slot.set_id,
			round = offence.time_slot.round,
			session = offence.session_index,
			"Equivocation offence reported"
		);
		self.handler.on_offence(&reporters, &offence);
		Ok(())
	}

	fn is_known_offence(&self, offenders: &[AccountId], time_slot: &TimeSlot) -> bool {
		offenders
			.iter()
			.any(|offender| self.db.exists(Self::report_key(time_slot, offender)))
	}
}
