//! GRANDPA authority set state machine.
//!
//! Tracks the current authority set and schedules its changes. Changes are
//! signaled through consensus logs in the block digest at the block they are
//! scheduled at, and enacted once their delay has passed. The same goes for
//! pausing and resuming the current set.
use crate::{
	config::GrandpaConfig,
	data::{
		with_transaction, AuthoritiesKey, CurrentSetIdKey, Database, NextForcedKey,
		PendingChangeKey, SetIdSessionKey, StalledKey, StateKey,
	},
	error::{DispatchError, Error, GenesisError, ScheduleError, StorageError},
	historical::KeyOwnerProofSystem,
	report::OffenceReportSystem,
	session::SessionInfo,
	system::System,
	types::{
		AuthorityList, BlockNumber, ConsensusLog, DigestItem, Event, ScheduledChange,
		SessionIndex, SetId, StoredPendingChange, StoredState,
	},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::LOG_TARGET;

pub struct Pallet<D: Database> {
	pub(crate) db: D,
	pub(crate) config: GrandpaConfig,
	pub(crate) system: Box<dyn System>,
	pub(crate) session: Box<dyn SessionInfo>,
	pub(crate) key_owner_proof_system: Arc<dyn KeyOwnerProofSystem>,
	pub(crate) report_system: Box<dyn OffenceReportSystem>,
}

impl<D: Database> Pallet<D> {
	pub fn new(
		db: D,
		config: GrandpaConfig,
		system: Box<dyn System>,
		session: Box<dyn SessionInfo>,
		key_owner_proof_system: Arc<dyn KeyOwnerProofSystem>,
		report_system: Box<dyn OffenceReportSystem>,
	) -> Self {
		Pallet {
			db,
			config,
			system,
			session,
			key_owner_proof_system,
			report_system,
		}
	}

	pub fn config(&self) -> &GrandpaConfig {
		&self.config
	}

	/// Current authority set, empty before genesis.
	pub fn grandpa_authorities(&self) -> Result<AuthorityList, StorageError> {
		Ok(self
			.db
			.get(AuthoritiesKey)?
			.map(AuthorityList::from)
			.unwrap_or_default())
	}

	/// The number of changes (both in terms of keys and underlying economic
	/// responsibilities) in the "set" of GRANDPA validators from genesis.
	pub fn current_set_id(&self) -> Result<SetId, StorageError> {
		Ok(self.db.get(CurrentSetIdKey)?.unwrap_or_default())
	}

	pub fn pending_change(&self) -> Result<Option<StoredPendingChange>, StorageError> {
		self.db.get(PendingChangeKey)
	}

	pub fn next_forced(&self) -> Result<Option<BlockNumber>, StorageError> {
		self.db.get(NextForcedKey)
	}

	pub fn stalled(&self) -> Result<Option<(BlockNumber, BlockNumber)>, StorageError> {
		self.db.get(StalledKey)
	}

	pub fn state(&self) -> Result<StoredState, StorageError> {
		Ok(self.db.get(StateKey)?.unwrap_or_default())
	}

	/// Session index that was current when the given set id became active.
	pub fn session_for_set(&self, set_id: SetId) -> Result<Option<SessionIndex>, StorageError> {
		self.db.get(SetIdSessionKey(set_id))
	}

	/// Sets the genesis authority set. The set id to session mapping of the
	/// genesis set is always recorded.
	pub fn initialize(&self, authorities: AuthorityList) -> Result<(), GenesisError> {
		with_transaction(&self.db, || {
			if !authorities.is_empty() {
				if !self.grandpa_authorities()?.is_empty() {
					return Err(GenesisError::AlreadyInitialized);
				}
				if authorities.len() > self.config.max_authorities as usize {
					return Err(GenesisError::TooManyAuthorities(self.config.max_authorities));
				}
				info!(
					target: LOG_TARGET,
					count = authorities.len(),
					"Initialized genesis authority set"
				);
				self.db.put(AuthoritiesKey, authorities.into());
			}

			// NOTE: initialize first session of first set. this is necessary for
			// the genesis set and session since we only update the set -> session
			// mapping whenever a new session starts, i.e. through `on_new_session`.
			self.db.put(SetIdSessionKey(0), 0);
			Ok(())
		})
	}

	/// Schedule a change in the authorities.
	///
	/// The change will be applied at the end of execution of the block
	/// `in_blocks` after the current block. This value may be 0, in which
	/// case the change is applied at the end of the current block.
	///
	/// If the `forced` parameter is defined, this indicates that the current
	/// set has been synchronously determined to be offline and that after
	/// `in_blocks` the given change should be applied. The given block number
	/// indicates the median last finalized block number and it should be used
	/// as the canon block when starting the new grandpa voter.
	///
	/// No change should be signaled while any change is pending. Returns an
	/// error if a change is already pending.
	pub fn schedule_change(
		&self,
		next_authorities: AuthorityList,
		in_blocks: BlockNumber,
		forced: Option<BlockNumber>,
	) -> Result<(), ScheduleError> {
		with_transaction(&self.db, || {
			if self.db.exists(PendingChangeKey) {
				return Err(Error::ChangePending.into());
			}

			let scheduled_at = self.system.block_number()?;

			if forced.is_some() {
				if self
					.next_forced()?
					.map_or(false, |next| next > scheduled_at)
				{
					return Err(Error::TooSoon.into());
				}

				// only allow the next forced change when twice the window has passed since
				// this one.
				self.db.put(
					NextForcedKey,
					scheduled_at.saturating_add(in_blocks.saturating_mul(2)),
				);
			}

			if next_authorities.len() > self.config.max_authorities as usize {
				return Err(ScheduleError::TooManyAuthorities(self.config.max_authorities));
			}

			info!(
				target: LOG_TARGET,
				scheduled_at,
				delay = in_blocks,
				?forced,
				count = next_authorities.len(),
				"Scheduled authority set change"
			);
			self.db.put(
				PendingChangeKey,
				StoredPendingChange {
					scheduled_at,
					delay: in_blocks,
					next_authorities,
					forced,
				},
			);
			Ok(())
		})
	}

	/// Schedule GRANDPA to pause starting in the given number of blocks.
	pub fn schedule_pause(&self, in_blocks: BlockNumber) -> Result<(), DispatchError> {
		with_transaction(&self.db, || {
			if self.state()? != StoredState::Live {
				return Err(Error::PauseFailed.dispatch(self.config.pallet_index));
			}

			let scheduled_at = self.system.block_number()?;
			self.db.put(
				StateKey,
				StoredState::PendingPause {
					scheduled_at,
					delay: in_blocks,
				},
			);
			info!(target: LOG_TARGET, scheduled_at, delay = in_blocks, "Scheduled pause");
			Ok(())
		})
	}

	/// Schedule a resume of GRANDPA after pausing.
	pub fn schedule_resume(&self, in_blocks: BlockNumber) -> Result<(), DispatchError> {
		with_transaction(&self.db, || {
			if self.state()? != StoredState::Paused {
				return Err(Error::ResumeFailed.dispatch(self.config.pallet_index));
			}

			let scheduled_at = self.system.block_number()?;
			self.db.put(
				StateKey,
				StoredState::PendingResume {
					scheduled_at,
					delay: in_blocks,
				},
			);
			info!(target: LOG_TARGET, scheduled_at, delay = in_blocks, "Scheduled resume");
			Ok(())
		})
	}

	/// Notes that the current authority set has stalled. The next session
	/// rotation forces a change after `further_wait` blocks, using
	/// `median` as the last finalized block.
	pub fn on_stalled(
		&self,
		further_wait: BlockNumber,
		median: BlockNumber,
	) -> Result<(), StorageError> {
		// when we record old authority sets we could try to figure out _who_
		// failed. until then, we can't meaningfully guard against
		// `next == last` the way that normal session changes do.
		self.db.put(StalledKey, (further_wait, median));
		warn!(target: LOG_TARGET, further_wait, median, "Authority set stalled");
		Ok(())
	}

	/// Signals and enacts pending changes and pause/resume transitions.
	/// Called once at the end of each block.
	pub fn on_finalize(&self, block_number: BlockNumber) -> Result<(), StorageError> {
		with_transaction(&self.db, || {
			// check for scheduled pending authority set changes
			if let Some(pending_change) = self.pending_change()? {
				// emit signal if we're at the block that scheduled the change
				if block_number == pending_change.scheduled_at {
					let change = ScheduledChange {
						next_authorities: pending_change.next_authorities.clone(),
						delay: pending_change.delay,
					};
					let log = match pending_change.forced {
						Some(median) => ConsensusLog::ForcedChange(median, change),
						None => ConsensusLog::ScheduledChange(change),
					};
					self.deposit_log(log)?;
				}

				// enact the change if we've reached the enacting block
				if block_number
					== pending_change
						.scheduled_at
						.saturating_add(pending_change.delay)
				{
					info!(
						target: LOG_TARGET,
						block_number,
						count = pending_change.next_authorities.len(),
						"Enacted authority set change"
					);
					self.db.put(
						AuthoritiesKey,
						pending_change.next_authorities.clone().into(),
					);
					self.system.deposit_event(Event::NewAuthorities {
						authority_set: pending_change.next_authorities,
					})?;
					self.db.delete(PendingChangeKey);
				}
			}

			// check for scheduled pending state changes
			match self.state()? {
				StoredState::PendingPause {
					scheduled_at,
					delay,
				} => {
					// signal change to pause
					if block_number == scheduled_at {
						self.deposit_log(ConsensusLog::Pause(delay))?;
					}

					// enact change to paused state
					if block_number == scheduled_at.saturating_add(delay) {
						self.db.put(StateKey, StoredState::Paused);
						self.system.deposit_event(Event::Paused)?;
						info!(target: LOG_TARGET, block_number, "Authority set paused");
					}
				},
				StoredState::PendingResume {
					scheduled_at,
					delay,
				} => {
					// signal change to resume
					if block_number == scheduled_at {
						self.deposit_log(ConsensusLog::Resume(delay))?;
					}

					// enact change to live state
					if block_number == scheduled_at.saturating_add(delay) {
						self.db.put(StateKey, StoredState::Live);
						self.system.deposit_event(Event::Resumed)?;
						info!(target: LOG_TARGET, block_number, "Authority set resumed");
					}
				},
				StoredState::Live | StoredState::Paused => {},
			}

			Ok(())
		})
	}

	/// Deposit one of this module's logs.
	pub(crate) fn deposit_log(&self, log: ConsensusLog) -> Result<(), StorageError> {
		self.system.deposit_log(DigestItem::grandpa(&log))
	}
}
