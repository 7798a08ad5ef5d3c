//! Session rotation hooks of the GRANDPA module.
use crate::{
	data::{with_transaction, CurrentSetIdKey, Database, SetIdSessionKey, StalledKey},
	error::{GenesisError, ScheduleError, StorageError},
	pallet::Pallet,
	types::{to_authorities, AccountId, AuthorityId, AuthorityIndex, ConsensusLog, SessionIndex},
};
use mockall::automock;
use tracing::{debug, info};

use crate::LOG_TARGET;

/// Session module as seen by the GRANDPA module.
#[automock]
pub trait SessionInfo {
	fn current_index(&self) -> SessionIndex;

	fn validators(&self) -> Vec<(AccountId, AuthorityId)>;
}

/// Handler for session life cycle events.
pub trait OneSessionHandler {
	/// The given validator set will be used for the genesis session.
	fn on_genesis_session(&self, validators: &[(AccountId, AuthorityId)])
		-> Result<(), GenesisError>;

	/// Session set has changed; act appropriately. Note that this can be
	/// called before initialization of the module.
	fn on_new_session(
		&self,
		changed: bool,
		validators: &[(AccountId, AuthorityId)],
		queued_validators: &[(AccountId, AuthorityId)],
	) -> Result<(), StorageError>;

	/// A notification for end of the session.
	fn on_before_session_ending(&self) {}

	/// A validator got disabled. Act accordingly until a new session begins.
	fn on_disabled(&self, validator_index: u32) -> Result<(), StorageError>;
}

impl<D: Database> OneSessionHandler for Pallet<D> {
	fn on_genesis_session(
		&self,
		validators: &[(AccountId, AuthorityId)],
	) -> Result<(), GenesisError> {
		self.initialize(to_authorities(validators))
	}

	fn on_new_session(
		&self,
		changed: bool,
		validators: &[(AccountId, AuthorityId)],
		_queued_validators: &[(AccountId, AuthorityId)],
	) -> Result<(), StorageError> {
		with_transaction(&self.db, || {
			// Always issue a change if `session` says that the validators have changed.
			// Even if their session keys are the same as before, the underlying economic
			// identities have changed.
			let current_set_id = if changed || self.db.exists(StalledKey) {
				let next_authorities = to_authorities(validators);

				let result = match self.db.take(StalledKey)? {
					Some((further_wait, median)) => {
						self.schedule_change(next_authorities, further_wait, Some(median))
					},
					None => self.schedule_change(next_authorities, 0, None),
				};

				match result {
					Ok(()) => {
						let current_set_id = self.db.mutate(CurrentSetIdKey, |set_id| {
							let next = set_id.unwrap_or_default() + 1;
							*set_id = Some(next);
							next
						})?;

						let max_set_id_session_entries =
							self.config.max_set_id_session_entries.max(1);
						if current_set_id >= max_set_id_session_entries {
							self.db.delete(SetIdSessionKey(
								current_set_id - max_set_id_session_entries,
							));
						}

						info!(target: LOG_TARGET, current_set_id, "New authority set");
						current_set_id
					},
					Err(ScheduleError::Storage(error)) => return Err(error),
					Err(error) => {
						// a change is already pending or a forced change came too soon,
						// the set id stays where it is.
						debug!(target: LOG_TARGET, "Authority set change not scheduled: {error}");
						self.current_set_id()?
					},
				}
			} else {
				// nothing's changed, neither economic conditions nor session keys. update the pointer
				// of the current set.
				self.current_set_id()?
			};

			// update the mapping to note that the current set corresponds to the
			// latest equivalent session (i.e. now).
			let session_index = self.session.current_index();
			self.db.put(SetIdSessionKey(current_set_id), session_index);

			Ok(())
		})
	}

	fn on_disabled(&self, validator_index: u32) -> Result<(), StorageError> {
		self.deposit_log(ConsensusLog::OnDisabled(validator_index as AuthorityIndex))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::GrandpaConfig,
		data::MemoryDB,
		historical::MockKeyOwnerProofSystem,
		report::MockOffenceReportSystem,
		system::MockSystem,
		types::{ed25519, DigestItem},
	};
	use mockall::predicate::eq;
	use std::sync::Arc;

	fn validators(seeds: &[u8]) -> Vec<(AccountId, AuthorityId)> {
		seeds
			.iter()
			.map(|seed| {
				(
					AccountId::new([*seed; 32]),
					ed25519::Public::from_raw([*seed; 32]),
				)
			})
			.collect()
	}

	fn pallet(system: MockSystem, session_index: SessionIndex) -> Pallet<MemoryDB> {
		let mut session = MockSessionInfo::new();
		session
			.expect_current_index()
			.return_const(session_index);
		Pallet::new(
			MemoryDB::default(),
			GrandpaConfig::default(),
			Box::new(system),
			Box::new(session),
			Arc::new(MockKeyOwnerProofSystem::new()),
			Box::new(MockOffenceReportSystem::new()),
		)
	}

	#[test]
	fn unchanged_session_keeps_set_id() {
		let pallet = pallet(MockSystem::new(), 3);

		pallet
			.on_new_session(false, &validators(&[1]), &[])
			.unwrap();
		assert_eq!(pallet.current_set_id().unwrap(), 0);
		assert_eq!(pallet.session_for_set(0).unwrap(), Some(3));
		assert_eq!(pallet.pending_change().unwrap(), None);
	}

	#[test]
	fn changed_session_schedules_immediate_change() {
		let mut system = MockSystem::new();
		system.expect_block_number().returning(|| Ok(4));
		let pallet = pallet(system, 1);

		pallet
			.on_new_session(true, &validators(&[1, 2]), &[])
			.unwrap();
		let pending = pallet.pending_change().unwrap().unwrap();
		assert_eq!(pending.scheduled_at, 4);
		assert_eq!(pending.delay, 0);
		assert_eq!(pending.forced, None);
		assert_eq!(pending.next_authorities, to_authorities(&validators(&[1, 2])));
		assert_eq!(pallet.current_set_id().unwrap(), 1);
		assert_eq!(pallet.session_for_set(1).unwrap(), Some(1));
	}

	#[test]
	fn disabled_validator_is_signaled() {
		let mut system = MockSystem::new();
		system
			.expect_deposit_log()
			.with(eq(DigestItem::grandpa(&ConsensusLog::OnDisabled(2))))
			.times(1)
			.returning(|_| Ok(()));
		let pallet = pallet(system, 0);

		pallet.on_disabled(2).unwrap();
		pallet.on_before_session_ending();
	}
}
