//! Shared runtime structs and enums.
use codec::{Decode, Encode, Input, Output};
pub use sp_core::{
	crypto::{AccountId32, KeyTypeId},
	ed25519, H256,
};

/// Identity of a GRANDPA authority.
pub type AuthorityId = ed25519::Public;
/// Signature for a GRANDPA authority.
pub type AuthoritySignature = ed25519::Signature;
/// The weight of an authority.
pub type AuthorityWeight = u64;
/// The index of an authority.
pub type AuthorityIndex = u64;
/// A list of GRANDPA authorities with associated weights.
pub type AuthorityList = Vec<(AuthorityId, AuthorityWeight)>;
/// The monotonic identifier of a GRANDPA set of authorities.
pub type SetId = u64;
/// The round indicator.
pub type RoundNumber = u64;
pub type BlockNumber = u64;
pub type SessionIndex = u32;
pub type AccountId = AccountId32;
pub type ConsensusEngineId = [u8; 4];

/// The `ConsensusEngineId` of GRANDPA.
pub const GRANDPA_ENGINE_ID: ConsensusEngineId = *b"FRNK";

/// Key type for GRANDPA session keys.
pub const KEY_TYPE: KeyTypeId = KeyTypeId(*b"gran");

/// The current version of the stored [`AuthorityList`] type.
const AUTHORITIES_VERSION: u8 = 1;

/// A scheduled change of authority set.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ScheduledChange {
	/// The new authorities after the change, along with their respective weights.
	pub next_authorities: AuthorityList,
	/// The number of blocks to delay.
	pub delay: BlockNumber,
}

/// A stored pending change.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct StoredPendingChange {
	/// The block number this was scheduled at.
	pub scheduled_at: BlockNumber,
	/// The delay in blocks until it will be applied.
	pub delay: BlockNumber,
	/// The next authority set.
	pub next_authorities: AuthorityList,
	/// If defined it means the change was forced and the given block number
	/// indicates the median last finalized block when the change was signaled.
	pub forced: Option<BlockNumber>,
}

/// Current state of the GRANDPA authority set. State transitions must happen in
/// the same order of states defined below, e.g. `Paused` implies a prior
/// `PendingPause`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub enum StoredState {
	/// The current authority set is live, and GRANDPA is enabled.
	#[default]
	Live,
	/// There is a pending pause event which will be enacted at the given block
	/// height.
	PendingPause {
		scheduled_at: BlockNumber,
		delay: BlockNumber,
	},
	/// The current GRANDPA authority set is paused.
	Paused,
	/// There is a pending resume event which will be enacted at the given block
	/// height.
	PendingResume {
		scheduled_at: BlockNumber,
		delay: BlockNumber,
	},
}

/// A consensus log item for GRANDPA.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum ConsensusLog {
	/// Schedule an authority set change.
	///
	/// The earliest digest of this type in a single block will be respected,
	/// provided that there is no `ForcedChange` digest. If there is, then the
	/// `ForcedChange` will take precedence.
	#[codec(index = 1)]
	ScheduledChange(ScheduledChange),
	/// Force an authority set change.
	///
	/// Forced changes are applied after a delay of _imported_ blocks,
	/// while pending changes are applied after a delay of _finalized_ blocks.
	#[codec(index = 2)]
	ForcedChange(BlockNumber, ScheduledChange),
	/// Note that the authority with given index is disabled until the next change.
	#[codec(index = 3)]
	OnDisabled(AuthorityIndex),
	/// A signal to pause the current authority set after the given delay.
	#[codec(index = 4)]
	Pause(BlockNumber),
	/// A signal to resume the current authority set after the given delay.
	#[codec(index = 5)]
	Resume(BlockNumber),
}

/// Header digest item. Only the consensus variant is produced by this module.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum DigestItem {
	#[codec(index = 4)]
	Consensus(ConsensusEngineId, Vec<u8>),
}

impl DigestItem {
	pub fn grandpa(log: &ConsensusLog) -> Self {
		DigestItem::Consensus(GRANDPA_ENGINE_ID, log.encode())
	}

	/// Decodes the GRANDPA log carried by this item, if any.
	pub fn as_grandpa_log(&self) -> Option<ConsensusLog> {
		match self {
			DigestItem::Consensus(GRANDPA_ENGINE_ID, data) => {
				ConsensusLog::decode(&mut data.as_slice()).ok()
			},
			DigestItem::Consensus(..) => None,
		}
	}
}

/// Events deposited by the GRANDPA module.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Event {
	/// New authority set has been applied.
	NewAuthorities { authority_set: AuthorityList },
	/// Current authority set has been paused.
	Paused,
	/// Current authority set has been resumed.
	Resumed,
}

/// An [`AuthorityList`] that is encoded with a version specifier, so that
/// encodings of different versions are differentiable. Decoding a list with an
/// unknown version fails.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionedAuthorityList(pub AuthorityList);

impl From<AuthorityList> for VersionedAuthorityList {
	fn from(authorities: AuthorityList) -> Self {
		VersionedAuthorityList(authorities)
	}
}

impl From<VersionedAuthorityList> for AuthorityList {
	fn from(versioned: VersionedAuthorityList) -> Self {
		versioned.0
	}
}

impl Encode for VersionedAuthorityList {
	fn size_hint(&self) -> usize {
		(AUTHORITIES_VERSION, &self.0).size_hint()
	}

	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		(AUTHORITIES_VERSION, &self.0).encode_to(dest)
	}
}

impl Decode for VersionedAuthorityList {
	fn decode<I: Input>(value: &mut I) -> Result<Self, codec::Error> {
		let (version, authorities): (u8, AuthorityList) = Decode::decode(value)?;
		if version != AUTHORITIES_VERSION {
			return Err("unknown Grandpa authorities version".into());
		}
		Ok(authorities.into())
	}
}

/// Maps session validators into an equally weighted authority list.
pub fn to_authorities(validators: &[(AccountId, AuthorityId)]) -> AuthorityList {
	validators
		.iter()
		.map(|(_, authority_id)| (*authority_id, 1))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use codec::DecodeAll;
	use hex_literal::hex;
	use test_case::test_case;

	fn authority(seed: u8) -> AuthorityId {
		ed25519::Public::from_raw([seed; 32])
	}

	#[test]
	fn versioned_authority_list_is_prefixed_with_version() {
		let list = VersionedAuthorityList(vec![(authority(1), 7)]);
		let encoded = list.encode();

		assert_eq!(encoded[0], AUTHORITIES_VERSION);
		// compact length 1
		assert_eq!(encoded[1], 4);
		assert_eq!(encoded.len(), 2 + 32 + 8);
		assert_eq!(VersionedAuthorityList::decode_all(&mut &encoded[..]).unwrap(), list);
	}

	#[test]
	fn versioned_authority_list_rejects_unknown_version() {
		let mut encoded = VersionedAuthorityList(vec![(authority(1), 1)]).encode();
		encoded[0] = 2;

		assert!(VersionedAuthorityList::decode(&mut &encoded[..]).is_err());
	}

	#[test_case(ConsensusLog::OnDisabled(3) => hex!("030300000000000000").to_vec(); "on disabled")]
	#[test_case(ConsensusLog::Pause(5) => hex!("040500000000000000").to_vec(); "pause")]
	#[test_case(ConsensusLog::Resume(1) => hex!("050100000000000000").to_vec(); "resume")]
	fn consensus_log_tags(log: ConsensusLog) -> Vec<u8> {
		log.encode()
	}

	#[test]
	fn forced_change_precedes_median() {
		let log = ConsensusLog::ForcedChange(
			18,
			ScheduledChange {
				next_authorities: vec![],
				delay: 5,
			},
		);

		assert_eq!(
			log.encode(),
			hex!("021200000000000000000500000000000000").to_vec()
		);
	}

	#[test]
	fn digest_item_carries_grandpa_engine_id() {
		let log = ConsensusLog::Pause(2);
		let item = DigestItem::grandpa(&log);

		assert_eq!(item.as_grandpa_log(), Some(log));
		assert_eq!(DigestItem::Consensus(*b"BABE", vec![4]).as_grandpa_log(), None);
	}

	#[test]
	fn stored_state_defaults_to_live() {
		assert_eq!(StoredState::default(), StoredState::Live);
		assert_eq!(StoredState::Live.encode(), vec![0]);
		assert_eq!(
			StoredState::PendingResume {
				scheduled_at: 1,
				delay: 2
			}
			.encode()[0],
			3
		);
	}
}
