//! Validation of equivocation evidence and its hand-off to the offences module.
use crate::{
	call::{Call, RuntimeCall},
	config::GrandpaConfig,
	data::{Database, SetIdSessionKey},
	equivocation::{check_equivocation_proof, EquivocationOffence, EquivocationProof, TimeSlot},
	error::{DispatchError, Error, InvalidTransaction, SubmitError, TransactionValidityError},
	historical::{KeyOwnerProofSystem, MembershipProof},
	offences::ReportOffence,
	types::{AccountId, KEY_TYPE},
};
use codec::Encode;
use mockall::automock;
use std::sync::Arc;
use tracing::{error, info};

use crate::LOG_TARGET;

/// Equivocation proof together with the proof that the offender key was part of
/// the validator set at the time of the offence.
pub type Evidence = (EquivocationProof, MembershipProof);

#[automock]
pub trait OffenceReportSystem {
	/// Submits the evidence as an unsigned `report_equivocation_unsigned` transaction.
	fn publish_evidence(&self, evidence: Evidence) -> Result<(), SubmitError>;

	/// Cheap checks done before the evidence is accepted into the transaction pool.
	fn check_evidence(&self, evidence: &Evidence) -> Result<(), TransactionValidityError>;

	/// Validates the evidence and reports the offence.
	fn process_evidence(
		&self,
		reporter: Option<AccountId>,
		evidence: Evidence,
	) -> Result<(), DispatchError>;
}

#[automock]
pub trait Authorship {
	/// Author of the block being executed, if known.
	fn author(&self) -> Option<AccountId>;
}

#[automock]
pub trait SubmitTransaction {
	fn submit_unsigned_transaction(&self, encoded_call: Vec<u8>) -> Result<(), SubmitError>;
}

pub struct EquivocationReportSystem<D: Database> {
	db: D,
	pallet_index: u8,
	key_owners: Arc<dyn KeyOwnerProofSystem>,
	offences: Box<dyn ReportOffence>,
	authorship: Box<dyn Authorship>,
	submitter: Box<dyn SubmitTransaction>,
}

impl<D: Database> EquivocationReportSystem<D> {
	pub fn new(
		db: D,
		config: &GrandpaConfig,
		key_owners: Arc<dyn KeyOwnerProofSystem>,
		offences: Box<dyn ReportOffence>,
		authorship: Box<dyn Authorship>,
		submitter: Box<dyn SubmitTransaction>,
	) -> Self {
		EquivocationReportSystem {
			db,
			pallet_index: config.pallet_index,
			key_owners,
			offences,
			authorship,
			submitter,
		}
	}

	fn invalid(&self, error: Error) -> DispatchError {
		error.dispatch(self.pallet_index)
	}
}

impl<D: Database> OffenceReportSystem for EquivocationReportSystem<D> {
	fn publish_evidence(
		&self,
		(equivocation_proof, key_owner_proof): Evidence,
	) -> Result<(), SubmitError> {
		let call = RuntimeCall {
			pallet_index: self.pallet_index,
			call: Call::ReportEquivocationUnsigned {
				equivocation_proof: Box::new(equivocation_proof),
				key_owner_proof,
			},
		};

		match self.submitter.submit_unsigned_transaction(call.encode()) {
			Ok(()) => {
				info!(target: LOG_TARGET, "Submitted equivocation report");
				Ok(())
			},
			Err(error) => {
				error!(target: LOG_TARGET, "Error submitting equivocation report: {error}");
				Err(error)
			},
		}
	}

	fn check_evidence(
		&self,
		(equivocation_proof, key_owner_proof): &Evidence,
	) -> Result<(), TransactionValidityError> {
		// check the membership proof to extract the offender's id
		let key = (KEY_TYPE, *equivocation_proof.offender());
		let offender = self
			.key_owners
			.check_proof(key, key_owner_proof.clone())?
			.ok_or(InvalidTransaction::BadProof)?;

		// check if the offence has already been reported, and if so then we can
		// discard the report.
		let time_slot = TimeSlot {
			set_id: equivocation_proof.set_id(),
			round: equivocation_proof.round(),
		};
		if self.offences.is_known_offence(&[offender], &time_slot) {
			return Err(InvalidTransaction::Stale.into());
		}
		Ok(())
	}

	fn process_evidence(
		&self,
		reporter: Option<AccountId>,
		(equivocation_proof, key_owner_proof): Evidence,
	) -> Result<(), DispatchError> {
		let reporter = reporter.or_else(|| self.authorship.author());
		let offender = *equivocation_proof.offender();

		// we check the equivocation within the context of its set id (and
		// associated session) and round. we also need to know the validator
		// set count when the offence since it is required to calculate the
		// slash amount.
		let set_id = equivocation_proof.set_id();
		let round = equivocation_proof.round();
		let session_index = key_owner_proof.session();
		let validator_set_count = key_owner_proof.validator_count();

		// validate equivocation proof (check votes are different and
		// signatures are valid).
		if !check_equivocation_proof(&equivocation_proof) {
			return Err(self.invalid(Error::InvalidEquivocationProof));
		}

		// validate the key ownership proof extracting the id of the offender.
		let offender = self
			.key_owners
			.check_proof((KEY_TYPE, offender), key_owner_proof)?
			.ok_or_else(|| self.invalid(Error::InvalidKeyOwnershipProof))?;

		// fetch the current and previous sets last session index.
		// on the genesis set there's no previous set.
		let set_id_session_index = self
			.db
			.get(SetIdSessionKey(set_id))?
			.ok_or_else(|| self.invalid(Error::InvalidEquivocationProof))?;
		let previous_set_id_session_index = match set_id {
			0 => None,
			_ => Some(
				self.db
					.get(SetIdSessionKey(set_id - 1))?
					.ok_or_else(|| self.invalid(Error::InvalidEquivocationProof))?,
			),
		};

		// check that the session id for the membership proof is within the
		// bounds of the set id reported in the equivocation.
		if session_index > set_id_session_index
			|| previous_set_id_session_index
				.map_or(false, |previous_index| session_index <= previous_index)
		{
			return Err(self.invalid(Error::InvalidEquivocationProof));
		}

		let offence = EquivocationOffence {
			time_slot: TimeSlot { set_id, round },
			session_index,
			validator_set_count,
			offender,
		};

		info!(target: LOG_TARGET, set_id, round, session_index, "Equivocation proof accepted");
		self.offences
			.report_offence(reporter.into_iter().collect(), offence)
			.map_err(|_| self.invalid(Error::DuplicateOffenceReport))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		data::MemoryDB,
		equivocation::tests::prevote_equivocation,
		error::{OffenceError, StorageError},
		historical::MockKeyOwnerProofSystem,
		offences::MockReportOffence,
		types::ed25519,
	};
	use mockall::predicate::eq;
	use sp_core::Pair;
	use test_case::test_case;

	const PALLET_INDEX: u8 = 4;

	fn offender() -> ed25519::Pair {
		ed25519::Pair::from_seed(&[1; 32])
	}

	fn owner() -> AccountId {
		AccountId::new([7; 32])
	}

	fn membership(session: u32) -> MembershipProof {
		MembershipProof {
			session,
			trie_nodes: vec![],
			validator_count: 3,
		}
	}

	fn key_owners(owner: Option<AccountId>) -> Arc<MockKeyOwnerProofSystem> {
		let mut key_owners = MockKeyOwnerProofSystem::new();
		key_owners
			.expect_check_proof()
			.returning(move |_, _| Ok(owner.clone()));
		Arc::new(key_owners)
	}

	fn author(author: Option<AccountId>) -> Box<MockAuthorship> {
		let mut authorship = MockAuthorship::new();
		authorship.expect_author().returning(move || author.clone());
		Box::new(authorship)
	}

	fn report_system(
		db: MemoryDB,
		key_owners: Arc<MockKeyOwnerProofSystem>,
		offences: MockReportOffence,
		authorship: Box<MockAuthorship>,
	) -> EquivocationReportSystem<MemoryDB> {
		let config = GrandpaConfig {
			pallet_index: PALLET_INDEX,
			..Default::default()
		};
		EquivocationReportSystem::new(
			db,
			&config,
			key_owners,
			Box::new(offences),
			authorship,
			Box::new(MockSubmitTransaction::new()),
		)
	}

	fn accepting_offences() -> MockReportOffence {
		let mut offences = MockReportOffence::new();
		offences.expect_report_offence().returning(|_, _| Ok(()));
		offences
	}

	/// Set 0 began at session 0, set 1 at session 2, set 2 at session 4.
	fn db_with_sessions() -> MemoryDB {
		let db = MemoryDB::default();
		db.put(SetIdSessionKey(0), 0);
		db.put(SetIdSessionKey(1), 2);
		db.put(SetIdSessionKey(2), 4);
		db
	}

	fn module_error(result: Result<(), DispatchError>) -> Option<Error> {
		result.err().and_then(|error| error.module_error())
	}

	#[test_case(0, 0 => None; "genesis set has no lower bound")]
	#[test_case(1, 0 => Some(Error::InvalidEquivocationProof); "session of previous set")]
	#[test_case(1, 2 => None; "last session of the set")]
	#[test_case(2, 3 => None; "session within the set")]
	#[test_case(1, 3 => Some(Error::InvalidEquivocationProof); "session after the set")]
	#[test_case(2, 2 => Some(Error::InvalidEquivocationProof); "session equal to previous bound")]
	#[test_case(3, 4 => Some(Error::InvalidEquivocationProof); "unknown set id")]
	fn session_bounds(set_id: u64, session: u32) -> Option<Error> {
		let system = report_system(
			db_with_sessions(),
			key_owners(Some(owner())),
			accepting_offences(),
			author(None),
		);
		let proof = prevote_equivocation(&offender(), 1, set_id);

		module_error(system.process_evidence(None, (proof, membership(session))))
	}

	#[test_case(0 => Some(Error::InvalidEquivocationProof); "session of an evicted set")]
	#[test_case(3 => Some(Error::InvalidEquivocationProof); "session within the set")]
	#[test_case(4 => Some(Error::InvalidEquivocationProof); "last session of the set")]
	fn missing_previous_set_session_rejects(session: u32) -> Option<Error> {
		let db = MemoryDB::default();
		db.put(SetIdSessionKey(2), 4);
		let system = report_system(
			db,
			key_owners(Some(owner())),
			MockReportOffence::new(),
			author(None),
		);
		let proof = prevote_equivocation(&offender(), 1, 2);

		module_error(system.process_evidence(None, (proof, membership(session))))
	}

	#[test]
	fn corrupted_key_ownership_records_abort_processing() {
		let mut key_owners = MockKeyOwnerProofSystem::new();
		key_owners
			.expect_check_proof()
			.returning(|_, _| Err(StorageError::Decode("corrupted".to_string())));
		let system = report_system(
			db_with_sessions(),
			Arc::new(key_owners),
			MockReportOffence::new(),
			author(None),
		);
		let evidence = (prevote_equivocation(&offender(), 1, 2), membership(4));

		assert_eq!(
			system.process_evidence(None, evidence.clone()),
			Err(DispatchError::Storage(StorageError::Decode("corrupted".to_string())))
		);
		assert_eq!(
			system.check_evidence(&evidence),
			Err(TransactionValidityError::Storage(StorageError::Decode(
				"corrupted".to_string()
			)))
		);
	}

	#[test]
	fn invalid_signatures_are_rejected_before_key_ownership() {
		let mut key_owners = MockKeyOwnerProofSystem::new();
		key_owners.expect_check_proof().never();
		let system = report_system(
			db_with_sessions(),
			Arc::new(key_owners),
			MockReportOffence::new(),
			author(None),
		);
		// signed for set 1, claimed for set 2
		let signed = prevote_equivocation(&offender(), 1, 1);
		let proof = EquivocationProof::new(2, signed.equivocation().clone());

		assert_eq!(
			module_error(system.process_evidence(None, (proof, membership(3)))),
			Some(Error::InvalidEquivocationProof)
		);
	}

	#[test]
	fn unknown_key_owner_is_rejected() {
		let system = report_system(
			db_with_sessions(),
			key_owners(None),
			MockReportOffence::new(),
			author(None),
		);
		let proof = prevote_equivocation(&offender(), 1, 2);

		let error = system
			.process_evidence(None, (proof, membership(3)))
			.unwrap_err();
		assert_eq!(
			error,
			DispatchError::Module {
				index: PALLET_INDEX,
				error: Error::InvalidKeyOwnershipProof
			}
		);
	}

	#[test]
	fn offence_is_reported_with_resolved_reporter() {
		let reporter = AccountId::new([9; 32]);
		let mut offences = MockReportOffence::new();
		offences
			.expect_report_offence()
			.with(
				eq(vec![reporter.clone()]),
				eq(EquivocationOffence {
					time_slot: TimeSlot { set_id: 2, round: 5 },
					session_index: 4,
					validator_set_count: 3,
					offender: owner(),
				}),
			)
			.times(1)
			.returning(|_, _| Ok(()));
		let system = report_system(
			db_with_sessions(),
			key_owners(Some(owner())),
			offences,
			author(Some(reporter)),
		);
		let proof = prevote_equivocation(&offender(), 5, 2);

		assert_eq!(system.process_evidence(None, (proof, membership(4))), Ok(()));
	}

	#[test]
	fn unresolved_reporter_reports_without_reporters() {
		let mut offences = MockReportOffence::new();
		offences
			.expect_report_offence()
			.withf(|reporters, _| reporters.is_empty())
			.times(1)
			.returning(|_, _| Ok(()));
		let system = report_system(
			db_with_sessions(),
			key_owners(Some(owner())),
			offences,
			author(None),
		);
		let proof = prevote_equivocation(&offender(), 5, 2);

		assert_eq!(system.process_evidence(None, (proof, membership(4))), Ok(()));
	}

	#[test]
	fn duplicate_offence_is_reported_as_module_error() {
		let mut offences = MockReportOffence::new();
		offences
			.expect_report_offence()
			.returning(|_, _| Err(OffenceError::DuplicateReport));
		let system = report_system(
			db_with_sessions(),
			key_owners(Some(owner())),
			offences,
			author(None),
		);
		let proof = prevote_equivocation(&offender(), 5, 2);

		assert_eq!(
			module_error(system.process_evidence(Some(owner()), (proof, membership(4)))),
			Some(Error::DuplicateOffenceReport)
		);
	}

	#[test]
	fn check_evidence_rejects_known_offences() {
		let mut offences = MockReportOffence::new();
		offences
			.expect_is_known_offence()
			.returning(|offenders, time_slot| {
				offenders.to_vec() == vec![owner()]
					&& *time_slot == TimeSlot { set_id: 2, round: 1 }
			});
		let system = report_system(
			db_with_sessions(),
			key_owners(Some(owner())),
			offences,
			author(None),
		);

		let known = (prevote_equivocation(&offender(), 1, 2), membership(4));
		let fresh = (prevote_equivocation(&offender(), 2, 2), membership(4));
		assert_eq!(
			system.check_evidence(&known),
			Err(TransactionValidityError::Invalid(InvalidTransaction::Stale))
		);
		assert_eq!(system.check_evidence(&fresh), Ok(()));
	}

	#[test]
	fn check_evidence_rejects_bad_key_ownership_proof() {
		let system = report_system(
			db_with_sessions(),
			key_owners(None),
			MockReportOffence::new(),
			author(None),
		);
		let evidence = (prevote_equivocation(&offender(), 1, 2), membership(4));

		assert_eq!(
			system.check_evidence(&evidence),
			Err(TransactionValidityError::Invalid(InvalidTransaction::BadProof))
		);
	}

	#[test]
	fn publish_evidence_submits_unsigned_call() {
		let proof = prevote_equivocation(&offender(), 1, 2);
		let expected = RuntimeCall {
			pallet_index: PALLET_INDEX,
			call: Call::ReportEquivocationUnsigned {
				equivocation_proof: Box::new(proof.clone()),
				key_owner_proof: membership(4),
			},
		}
		.encode();

		let mut submitter = MockSubmitTransaction::new();
		submitter
			.expect_submit_unsigned_transaction()
			.with(eq(expected))
			.times(1)
			.returning(|_| Ok(()));
		let system = EquivocationReportSystem::new(
			MemoryDB::default(),
			&GrandpaConfig::default(),
			key_owners(None),
			Box::new(MockReportOffence::new()),
			author(None),
			Box::new(submitter),
		);

		assert_eq!(system.publish_evidence((proof, membership(4))), Ok(()));
	}
}
