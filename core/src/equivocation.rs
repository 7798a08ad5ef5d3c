//! GRANDPA equivocation proofs.
//!
//! Misbehavior in GRANDPA happens when a voter votes on the same round (either
//! at prevote or precommit stage) for different blocks. Proving is achieved by
//! collecting the signed messages of conflicting votes.
use crate::types::{
	AccountId, AuthorityId, AuthoritySignature, BlockNumber, RoundNumber, SessionIndex, SetId,
	H256,
};
use codec::{Decode, Encode};
use sp_core::{ed25519, Pair};
use tracing::debug;

use crate::LOG_TARGET;

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Prevote {
	pub target_hash: H256,
	/// The target block's number
	pub target_number: BlockNumber,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Precommit {
	pub target_hash: H256,
	/// The target block's number
	pub target_number: BlockNumber,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PrimaryPropose {
	pub target_hash: H256,
	/// The target block's number
	pub target_number: BlockNumber,
}

/// A message the voters sign, localized to a round and set id before signing.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Message {
	Prevote(Prevote),
	Precommit(Precommit),
	PrimaryPropose(PrimaryPropose),
}

/// A vote that can be part of an equivocation.
pub trait Vote: Clone {
	fn target(&self) -> (&H256, BlockNumber);

	fn into_message(self) -> Message;
}

impl Vote for Prevote {
	fn target(&self) -> (&H256, BlockNumber) {
		(&self.target_hash, self.target_number)
	}

	fn into_message(self) -> Message {
		Message::Prevote(self)
	}
}

impl Vote for Precommit {
	fn target(&self) -> (&H256, BlockNumber) {
		(&self.target_hash, self.target_number)
	}

	fn into_message(self) -> Message {
		Message::Precommit(self)
	}
}

/// Two conflicting signed votes of the same voter in the same round.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct VoteEquivocation<V> {
	pub round_number: RoundNumber,
	/// The identity of the equivocator.
	pub identity: AuthorityId,
	pub first: (V, AuthoritySignature),
	pub second: (V, AuthoritySignature),
}

/// Unifies prevote and precommit equivocations under a common type.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Equivocation {
	/// Proof of equivocation at prevote stage.
	Prevote(VoteEquivocation<Prevote>),
	/// Proof of equivocation at precommit stage.
	Precommit(VoteEquivocation<Precommit>),
}

impl Equivocation {
	/// Returns the authority id of the equivocator.
	pub fn offender(&self) -> &AuthorityId {
		match self {
			Equivocation::Prevote(equivocation) => &equivocation.identity,
			Equivocation::Precommit(equivocation) => &equivocation.identity,
		}
	}

	/// Returns the round number when the equivocation happened.
	pub fn round_number(&self) -> RoundNumber {
		match self {
			Equivocation::Prevote(equivocation) => equivocation.round_number,
			Equivocation::Precommit(equivocation) => equivocation.round_number,
		}
	}
}

/// Proof of voter misbehavior on a given set id.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct EquivocationProof {
	set_id: SetId,
	equivocation: Equivocation,
}

impl EquivocationProof {
	pub fn new(set_id: SetId, equivocation: Equivocation) -> Self {
		EquivocationProof {
			set_id,
			equivocation,
		}
	}

	/// Returns the set id at which the equivocation occurred.
	pub fn set_id(&self) -> SetId {
		self.set_id
	}

	/// Returns the round number at which the equivocation occurred.
	pub fn round(&self) -> RoundNumber {
		self.equivocation.round_number()
	}

	/// Returns the authority id of the equivocator.
	pub fn offender(&self) -> &AuthorityId {
		self.equivocation.offender()
	}

	pub fn equivocation(&self) -> &Equivocation {
		&self.equivocation
	}
}

/// Encode round message localized to a given round and set id.
pub fn localized_payload(round: RoundNumber, set_id: SetId, message: &Message) -> Vec<u8> {
	(message, round, set_id).encode()
}

/// Check a message signature by encoding the message as a localized payload and
/// verifying the provided signature using the expected authority id.
pub fn check_message_signature(
	message: &Message,
	id: &AuthorityId,
	signature: &AuthoritySignature,
	round: RoundNumber,
	set_id: SetId,
) -> bool {
	let payload = localized_payload(round, set_id, message);
	let valid = <ed25519::Pair as Pair>::verify(signature, payload, id);

	if !valid {
		debug!(target: LOG_TARGET, "Bad signature on message from {id:?}");
	}

	valid
}

/// Localizes the message to the given set and round and signs the payload.
pub fn sign_message(
	pair: &ed25519::Pair,
	message: &Message,
	round: RoundNumber,
	set_id: SetId,
) -> AuthoritySignature {
	pair.sign(&localized_payload(round, set_id, message))
}

fn check_vote_equivocation<V: Vote>(equivocation: &VoteEquivocation<V>, set_id: SetId) -> bool {
	let (first_vote, first_signature) = &equivocation.first;
	let (second_vote, second_signature) = &equivocation.second;

	// if both votes have the same target the equivocation is invalid.
	if first_vote.target() == second_vote.target() {
		return false;
	}

	let valid_first = check_message_signature(
		&first_vote.clone().into_message(),
		&equivocation.identity,
		first_signature,
		equivocation.round_number,
		set_id,
	);
	let valid_second = check_message_signature(
		&second_vote.clone().into_message(),
		&equivocation.identity,
		second_signature,
		equivocation.round_number,
		set_id,
	);

	valid_first && valid_second
}

/// Verifies the equivocation proof by making sure that both votes target
/// different blocks and that its signatures are valid.
pub fn check_equivocation_proof(report: &EquivocationProof) -> bool {
	match &report.equivocation {
		Equivocation::Prevote(equivocation) => check_vote_equivocation(equivocation, report.set_id),
		Equivocation::Precommit(equivocation) => {
			check_vote_equivocation(equivocation, report.set_id)
		},
	}
}

/// A round number and set id which point on the time of an offence.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, Eq, PartialEq, Encode, Decode)]
pub struct TimeSlot {
	// The order of these matters for `derive(Ord)`.
	pub set_id: SetId,
	pub round: RoundNumber,
}

/// A GRANDPA equivocation offence report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivocationOffence {
	/// Time slot at which this incident happened.
	pub time_slot: TimeSlot,
	/// The session index in which the incident happened.
	pub session_index: SessionIndex,
	/// The size of the validator set at the time of the offence.
	pub validator_set_count: u32,
	/// The account owning the equivocating authority key.
	pub offender: AccountId,
}

impl EquivocationOffence {
	pub const ID: [u8; 16] = *b"grandpa:equivoca";
}
