//! Dispatchable calls of the GRANDPA module and validation of their unsigned form.
use crate::{
	data::{with_transaction, Database},
	equivocation::EquivocationProof,
	error::{DispatchError, InvalidTransaction, TransactionValidityError},
	historical::MembershipProof,
	pallet::Pallet,
	system::{ensure_none, ensure_root, ensure_signed, Origin},
	types::BlockNumber,
};
use codec::{Decode, DecodeAll, Encode};
use tracing::warn;

use crate::LOG_TARGET;

/// Tag prefix of the unsigned equivocation reports in the transaction pool.
const TAG_PREFIX: &str = "GrandpaEquivocation";

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Call {
	/// Report voter equivocation/misbehavior. This method will verify the
	/// equivocation proof and validate the given key ownership proof
	/// against the extracted offender. If both are valid, the offence
	/// will be reported.
	#[codec(index = 0)]
	ReportEquivocation {
		equivocation_proof: Box<EquivocationProof>,
		key_owner_proof: MembershipProof,
	},
	/// Report voter equivocation/misbehavior without a signed origin. Only
	/// submitted by block authors through the local transaction pool.
	#[codec(index = 1)]
	ReportEquivocationUnsigned {
		equivocation_proof: Box<EquivocationProof>,
		key_owner_proof: MembershipProof,
	},
	/// Note that the current authority set of the GRANDPA finality gadget has stalled.
	///
	/// This will trigger a forced authority set change at the beginning of the next session, to
	/// be enacted `delay` blocks after that. The `delay` should be high enough to safely assume
	/// that the block signalling the forced change will not be re-orged e.g. 1000 blocks.
	/// The block production rate (which may be slowed down because of finality lagging) should
	/// be taken into account when choosing the `delay`. The GRANDPA voters based on the new
	/// authority will start voting on top of `best_finalized_block_number` for new finalized
	/// blocks. `best_finalized_block_number` should be the highest of the latest finalized
	/// block of all validators of the new authority set.
	#[codec(index = 2)]
	NoteStalled {
		delay: BlockNumber,
		best_finalized_block_number: BlockNumber,
	},
}

/// A call addressed to the module at `pallet_index`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RuntimeCall {
	pub pallet_index: u8,
	pub call: Call,
}

impl RuntimeCall {
	/// Decodes an encoded call, failing on trailing bytes or calls of other modules.
	pub fn decode_for(pallet_index: u8, encoded: &[u8]) -> Result<Call, DispatchError> {
		let runtime_call = RuntimeCall::decode_all(&mut &encoded[..])
			.map_err(|_| DispatchError::Other("Cannot decode call"))?;
		if runtime_call.pallet_index != pallet_index {
			return Err(DispatchError::Other("Call of unknown module"));
		}
		Ok(runtime_call.call)
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pays {
	#[default]
	Yes,
	No,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostDispatchInfo {
	pub pays_fee: Pays,
}

impl From<Pays> for PostDispatchInfo {
	fn from(pays_fee: Pays) -> Self {
		PostDispatchInfo { pays_fee }
	}
}

pub type DispatchResultWithPostInfo = Result<PostDispatchInfo, DispatchError>;

/// Where an unsigned transaction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionSource {
	/// Already part of a block.
	InBlock,
	/// Submitted by the local node.
	Local,
	/// Received from the network.
	External,
}

/// Information on a transaction accepted into the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidTransaction {
	pub priority: u64,
	pub requires: Vec<Vec<u8>>,
	pub provides: Vec<Vec<u8>>,
	pub longevity: u64,
	pub propagate: bool,
}

impl<D: Database> Pallet<D> {
	pub fn dispatch(&self, origin: Origin, call: Call) -> DispatchResultWithPostInfo {
		match call {
			Call::ReportEquivocation {
				equivocation_proof,
				key_owner_proof,
			} => self.report_equivocation(origin, equivocation_proof, key_owner_proof),
			Call::ReportEquivocationUnsigned {
				equivocation_proof,
				key_owner_proof,
			} => self.report_equivocation_unsigned(origin, equivocation_proof, key_owner_proof),
			Call::NoteStalled {
				delay,
				best_finalized_block_number,
			} => self.note_stalled(origin, delay, best_finalized_block_number),
		}
	}

	pub fn report_equivocation(
		&self,
		origin: Origin,
		equivocation_proof: Box<EquivocationProof>,
		key_owner_proof: MembershipProof,
	) -> DispatchResultWithPostInfo {
		let reporter = ensure_signed(origin)?;

		with_transaction(&self.db, || {
			self.report_system
				.process_evidence(Some(reporter), (*equivocation_proof, key_owner_proof))?;
			// waive the fee since the report is valid and beneficial
			Ok(Pays::No.into())
		})
	}

	pub fn report_equivocation_unsigned(
		&self,
		origin: Origin,
		equivocation_proof: Box<EquivocationProof>,
		key_owner_proof: MembershipProof,
	) -> DispatchResultWithPostInfo {
		ensure_none(origin)?;

		with_transaction(&self.db, || {
			self.report_system
				.process_evidence(None, (*equivocation_proof, key_owner_proof))?;
			Ok(Pays::No.into())
		})
	}

	pub fn note_stalled(
		&self,
		origin: Origin,
		delay: BlockNumber,
		best_finalized_block_number: BlockNumber,
	) -> DispatchResultWithPostInfo {
		ensure_root(origin)?;

		with_transaction(&self.db, || {
			self.on_stalled(delay, best_finalized_block_number)?;
			Ok(Pays::Yes.into())
		})
	}

	/// Validates unsigned equivocation reports before they enter the pool.
	pub fn validate_unsigned(
		&self,
		source: TransactionSource,
		call: &Call,
	) -> Result<ValidTransaction, TransactionValidityError> {
		let Call::ReportEquivocationUnsigned {
			equivocation_proof,
			key_owner_proof,
		} = call
		else {
			return Err(InvalidTransaction::Call.into());
		};

		// discard equivocation report not coming from the local node
		match source {
			TransactionSource::Local | TransactionSource::InBlock => {},
			TransactionSource::External => {
				warn!(
					target: LOG_TARGET,
					"rejecting unsigned report equivocation transaction because it is not local/in-block."
				);
				return Err(InvalidTransaction::Call.into());
			},
		}

		let evidence = (*equivocation_proof.clone(), key_owner_proof.clone());
		self.report_system.check_evidence(&evidence)?;

		let tag = (
			TAG_PREFIX,
			equivocation_proof.offender(),
			equivocation_proof.set_id(),
			equivocation_proof.round(),
		);
		Ok(ValidTransaction {
			// We assign the maximum priority for any equivocation report.
			priority: u64::MAX,
			requires: vec![],
			// Only one equivocation report for the same offender at the same slot.
			provides: vec![tag.encode()],
			longevity: self.config.report_longevity,
			// We don't propagate this. This can never be included on a remote node.
			propagate: false,
		})
	}

	/// Repeats the evidence checks right before an unsigned report is applied.
	pub fn pre_dispatch(&self, call: &Call) -> Result<(), TransactionValidityError> {
		match call {
			Call::ReportEquivocationUnsigned {
				equivocation_proof,
				key_owner_proof,
			} => {
				let evidence = (*equivocation_proof.clone(), key_owner_proof.clone());
				self.report_system.check_evidence(&evidence)
			},
			_ => Err(InvalidTransaction::Call.into()),
		}
	}
}
