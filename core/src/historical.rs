//! Historical session records used to prove that an authority key belonged to a
//! given account at a given session.
use crate::{
	data::{
		Database, HistoricalSessionKey, HistoricalValidatorsKey, StoredRangeKey,
	},
	error::StorageError,
	types::{AccountId, AuthorityId, KeyTypeId, SessionIndex, H256, KEY_TYPE},
	utils::blake2_256,
};
use codec::{Decode, DecodeAll, Encode};
use mockall::automock;
use tracing::{debug, info};

use crate::LOG_TARGET;

/// Proof of membership of a key in the validator set of a specific session.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct MembershipProof {
	/// The session index on which the specific key is a member.
	pub session: SessionIndex,
	/// Trie nodes of the proof.
	pub trie_nodes: Vec<Vec<u8>>,
	/// The validator count of the session on which the specific key is a member.
	pub validator_count: u32,
}

impl MembershipProof {
	pub fn session(&self) -> SessionIndex {
		self.session
	}

	pub fn validator_count(&self) -> u32 {
		self.validator_count
	}
}

/// Key ownership proof in its encoded form, as it crosses the runtime API boundary.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct OpaqueKeyOwnershipProof(Vec<u8>);

impl OpaqueKeyOwnershipProof {
	pub fn new(inner: Vec<u8>) -> OpaqueKeyOwnershipProof {
		OpaqueKeyOwnershipProof(inner)
	}

	/// Try to decode the inner bytes into the given concrete key ownership proof type.
	pub fn decode<T: Decode>(self) -> Option<T> {
		T::decode_all(&mut &self.0[..]).ok()
	}
}

#[automock]
pub trait KeyOwnerProofSystem {
	/// Proves membership of the key in the current session.
	fn prove(
		&self,
		key: (KeyTypeId, AuthorityId),
	) -> Result<Option<MembershipProof>, StorageError>;

	/// Checks the proof, returning the account which owned the key in the proven session.
	fn check_proof(
		&self,
		key: (KeyTypeId, AuthorityId),
		proof: MembershipProof,
	) -> Result<Option<AccountId>, StorageError>;
}

/// Stores a commitment to every session validator set, along with the set itself.
#[derive(Clone)]
pub struct HistoricalSessions<D: Database> {
	db: D,
}

impl<D: Database> HistoricalSessions<D> {
	pub fn new(db: D) -> Self {
		HistoricalSessions { db }
	}

	/// Records the validator set of the given session, which becomes the current one.
	pub fn note_session(
		&self,
		session: SessionIndex,
		validators: Vec<(AccountId, AuthorityId)>,
	) -> Result<(), StorageError> {
		let encoded = validators.encode();
		let root = H256::from(blake2_256(&encoded));
		let count = validators.len() as u32;

		self.db.put(HistoricalSessionKey(session), (root, count));
		self.db.put(HistoricalValidatorsKey(session), validators);
		self.db.mutate(StoredRangeKey, |range| {
			let start = range.map_or(session, |(start, _)| start);
			*range = Some((start, session + 1));
		})?;

		debug!(target: LOG_TARGET, session, count, ?root, "Noted historical session");
		Ok(())
	}

	/// Drops all records of sessions before `up_to`.
	pub fn prune_up_to(&self, up_to: SessionIndex) -> Result<(), StorageError> {
		let Some((start, end)) = self.db.get(StoredRangeKey)? else {
			return Ok(());
		};
		let up_to = up_to.min(end);
		if up_to <= start {
			return Ok(());
		}

		for session in start..up_to {
			self.db.delete(HistoricalSessionKey(session));
			self.db.delete(HistoricalValidatorsKey(session));
		}
		if up_to == end {
			self.db.delete(StoredRangeKey);
		} else {
			self.db.put(StoredRangeKey, (up_to, end));
		}

		info!(target: LOG_TARGET, start, up_to, "Pruned historical sessions");
		Ok(())
	}

	pub fn stored_range(&self) -> Result<Option<(SessionIndex, SessionIndex)>, StorageError> {
		self.db.get(StoredRangeKey)
	}

	fn current_session(&self) -> Result<Option<SessionIndex>, StorageError> {
		Ok(self.stored_range()?.map(|(_, end)| end - 1))
	}
}

impl<D: Database> KeyOwnerProofSystem for HistoricalSessions<D> {
	fn prove(
		&self,
		(key_type, authority_id): (KeyTypeId, AuthorityId),
	) -> Result<Option<MembershipProof>, StorageError> {
		if key_type != KEY_TYPE {
			return Ok(None);
		}
		let Some(session) = self.current_session()? else {
			return Ok(None);
		};
		let Some(validators) = self.db.get(HistoricalValidatorsKey(session))? else {
			return Ok(None);
		};
		if !validators.iter().any(|(_, id)| *id == authority_id) {
			return Ok(None);
		}

		Ok(Some(MembershipProof {
			session,
			validator_count: validators.len() as u32,
			trie_nodes: vec![validators.encode()],
		}))
	}

	fn check_proof(
		&self,
		(key_type, authority_id): (KeyTypeId, AuthorityId),
		proof: MembershipProof,
	) -> Result<Option<AccountId>, StorageError> {
		if key_type != KEY_TYPE {
			return Ok(None);
		}
		let Some((root, count)) = self.db.get(HistoricalSessionKey(proof.session))? else {
			return Ok(None);
		};
		let [node] = proof.trie_nodes.as_slice() else {
			return Ok(None);
		};
		if H256::from(blake2_256(node)) != root || proof.validator_count != count {
			return Ok(None);
		}

		// the node matches the stored commitment, a decode failure means a malformed proof
		let Ok(validators) = Vec::<(AccountId, AuthorityId)>::decode_all(&mut &node[..]) else {
			return Ok(None);
		};
		Ok(validators
			.into_iter()
			.find(|(_, id)| *id == authority_id)
			.map(|(owner, _)| owner))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		data::{MemoryDB, RecordKey},
		types::ed25519,
	};

	fn validator(seed: u8) -> (AccountId, AuthorityId) {
		(
			AccountId::new([seed; 32]),
			ed25519::Public::from_raw([seed + 100; 32]),
		)
	}

	fn sessions() -> HistoricalSessions<MemoryDB> {
		let historical = HistoricalSessions::new(MemoryDB::default());
		historical
			.note_session(0, vec![validator(1), validator(2)])
			.unwrap();
		historical
			.note_session(1, vec![validator(2), validator(3), validator(4)])
			.unwrap();
		historical
	}

	#[test]
	fn proves_against_current_session() {
		let historical = sessions();
		let (owner, key) = validator(3);

		let proof = historical.prove((KEY_TYPE, key)).unwrap().unwrap();
		assert_eq!(proof.session(), 1);
		assert_eq!(proof.validator_count(), 3);
		assert_eq!(historical.check_proof((KEY_TYPE, key), proof), Ok(Some(owner)));
	}

	#[test]
	fn unknown_key_has_no_proof() {
		let historical = sessions();
		assert_eq!(historical.prove((KEY_TYPE, validator(1).1)), Ok(None));
		assert_eq!(historical.prove((KeyTypeId(*b"babe"), validator(3).1)), Ok(None));
	}

	#[test]
	fn proof_for_other_key_resolves_nothing() {
		let historical = sessions();
		let proof = historical.prove((KEY_TYPE, validator(3).1)).unwrap().unwrap();

		assert_eq!(historical.check_proof((KEY_TYPE, validator(9).1), proof), Ok(None));
	}

	#[test]
	fn tampered_proofs_are_rejected() {
		let historical = sessions();
		let key = validator(2).1;
		let proof = historical.prove((KEY_TYPE, key)).unwrap().unwrap();

		let mut wrong_count = proof.clone();
		wrong_count.validator_count = 2;
		assert_eq!(historical.check_proof((KEY_TYPE, key), wrong_count), Ok(None));

		let mut wrong_session = proof.clone();
		wrong_session.session = 0;
		assert_eq!(historical.check_proof((KEY_TYPE, key), wrong_session), Ok(None));

		let mut forged = proof.clone();
		forged.trie_nodes = vec![vec![validator(5), (validator(2).0, key)].encode()];
		forged.validator_count = 2;
		assert_eq!(historical.check_proof((KEY_TYPE, key), forged), Ok(None));

		let mut extra_nodes = proof;
		extra_nodes.trie_nodes.push(vec![]);
		assert_eq!(historical.check_proof((KEY_TYPE, key), extra_nodes), Ok(None));
	}

	#[test]
	fn pruning_drops_old_sessions() {
		let historical = sessions();
		let key = validator(2).1;
		let old_proof = MembershipProof {
			session: 0,
			trie_nodes: vec![vec![validator(1), validator(2)].encode()],
			validator_count: 2,
		};
		assert!(historical.check_proof((KEY_TYPE, key), old_proof.clone()).unwrap().is_some());

		historical.prune_up_to(1).unwrap();
		assert_eq!(historical.stored_range().unwrap(), Some((1, 2)));
		assert_eq!(historical.check_proof((KEY_TYPE, key), old_proof), Ok(None));
	}

	#[test]
	fn corrupted_records_fail_with_storage_error() {
		let historical = sessions();
		let key = validator(2).1;
		let proof = MembershipProof {
			session: 0,
			trie_nodes: vec![vec![validator(1), validator(2)].encode()],
			validator_count: 2,
		};
		historical
			.db
			.put_raw(&HistoricalSessionKey(0).key(), vec![0xff]);
		historical
			.db
			.put_raw(&HistoricalValidatorsKey(1).key(), vec![0xff]);

		assert!(matches!(
			historical.check_proof((KEY_TYPE, key), proof),
			Err(StorageError::Decode(_))
		));
		assert!(matches!(
			historical.prove((KEY_TYPE, key)),
			Err(StorageError::Decode(_))
		));
	}

	#[test]
	fn opaque_proof_rejects_trailing_bytes() {
		let proof = sessions().prove((KEY_TYPE, validator(4).1)).unwrap().unwrap();
		let mut encoded = proof.encode();

		assert_eq!(
			OpaqueKeyOwnershipProof::new(encoded.clone()).decode::<MembershipProof>(),
			Some(proof)
		);
		encoded.push(0);
		assert_eq!(
			OpaqueKeyOwnershipProof::new(encoded).decode::<MembershipProof>(),
			None
		);
	}
}
