//! Key-value storage consumed by the runtime modules.
//!
//! Every persisted item has its own [`RecordKey`] type which knows the final
//! storage key and the SCALE-encoded value type stored under it. Keys are built
//! as `twox_128(prefix) ++ twox_128(item)`, with map keys appended through the
//! `Twox64Concat` hasher.
use crate::{
	error::StorageError,
	types::{
		AccountId, AuthorityId, BlockNumber, DigestItem, Event, SessionIndex, SetId,
		StoredPendingChange, StoredState, VersionedAuthorityList, H256,
	},
};
use codec::{Decode, DecodeAll, Encode, EncodeAppend};
use sp_core::hashing::{twox_128, twox_64};

mod keys;
pub use keys::*;

mod mem_db;
pub use mem_db::*;

/// Type of the database key which we can get from the custom key.
pub trait RecordKey {
	type Type: Encode + Decode;

	/// Returns the final storage key
	fn key(&self) -> Vec<u8>;
}

pub trait Database {
	/// Gets raw value stored under the given key.
	fn get_raw(&self, key: &[u8]) -> Option<Vec<u8>>;

	/// Puts raw value under the given key.
	fn put_raw(&self, key: &[u8], value: Vec<u8>);

	/// Deletes raw value stored under the given key.
	fn delete_raw(&self, key: &[u8]);

	/// Returns all visible keys starting with the given prefix, in ascending order.
	fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>>;

	/// Opens a new nested storage transaction.
	fn start_transaction(&self);

	/// Merges changes of the innermost transaction into its parent.
	fn commit_transaction(&self) -> Result<(), StorageError>;

	/// Discards changes of the innermost transaction.
	fn rollback_transaction(&self) -> Result<(), StorageError>;

	/// Gets value for given key.
	/// Stored bytes are decoded into the key type, trailing bytes are rejected.
	fn get<T: RecordKey>(&self, key: T) -> Result<Option<T::Type>, StorageError> {
		self.get_raw(&key.key())
			.map(|value| <T::Type>::decode_all(&mut &value[..]))
			.transpose()
			.map_err(Into::into)
	}

	/// Puts value for given key into database.
	fn put<T: RecordKey>(&self, key: T, value: T::Type) {
		self.put_raw(&key.key(), value.encode());
	}

	/// Deletes value from the database for the given key.
	fn delete<T: RecordKey>(&self, key: T) {
		self.delete_raw(&key.key());
	}

	fn exists<T: RecordKey>(&self, key: T) -> bool {
		self.get_raw(&key.key()).is_some()
	}

	/// Reads and clears the value stored under the given key.
	fn take<T: RecordKey>(&self, key: T) -> Result<Option<T::Type>, StorageError> {
		let key = key.key();
		let Some(value) = self.get_raw(&key) else {
			return Ok(None);
		};
		self.delete_raw(&key);
		Ok(Some(<T::Type>::decode_all(&mut &value[..])?))
	}

	/// Read-modify-write of a single value. `None` left in place deletes the entry.
	fn mutate<T, R, F>(&self, key: T, f: F) -> Result<R, StorageError>
	where
		T: RecordKey,
		F: FnOnce(&mut Option<T::Type>) -> R,
	{
		self.try_mutate(key, |value| Ok::<R, StorageError>(f(value)))
	}

	/// Same as [`Database::mutate`], but nothing is written when `f` fails.
	fn try_mutate<T, R, E, F>(&self, key: T, f: F) -> Result<R, E>
	where
		T: RecordKey,
		E: From<StorageError>,
		F: FnOnce(&mut Option<T::Type>) -> Result<R, E>,
	{
		let key = key.key();
		let mut value = self
			.get_raw(&key)
			.map(|value| <T::Type>::decode_all(&mut &value[..]))
			.transpose()
			.map_err(StorageError::from)?;

		let result = f(&mut value)?;
		match value {
			Some(value) => self.put_raw(&key, value.encode()),
			None => self.delete_raw(&key),
		}
		Ok(result)
	}

	/// Appends an item to a stored SCALE vector without decoding it.
	fn append<T, I>(&self, key: T, item: I) -> Result<(), StorageError>
	where
		T: RecordKey<Type = Vec<I>>,
		I: Encode,
	{
		let key = key.key();
		let encoded = self.get_raw(&key).unwrap_or_default();
		let appended = <Vec<I> as EncodeAppend>::append_or_new(encoded, std::iter::once(&item))?;
		self.put_raw(&key, appended);
		Ok(())
	}

	/// Removes up to `limit` keys starting with the given prefix, returns number of removed keys.
	fn clear_prefix(&self, prefix: &[u8], limit: Option<u32>) -> u32 {
		let keys = self.keys_with_prefix(prefix);
		let limit = limit.map_or(keys.len(), |limit| limit as usize);
		let mut removed = 0;
		for key in keys.iter().take(limit) {
			self.delete_raw(key);
			removed += 1;
		}
		removed
	}
}

/// Runs `f` inside a nested storage transaction. Changes are committed when `f`
/// succeeds and discarded when it fails.
pub fn with_transaction<D, R, E, F>(db: &D, f: F) -> Result<R, E>
where
	D: Database + ?Sized,
	E: From<StorageError>,
	F: FnOnce() -> Result<R, E>,
{
	db.start_transaction();
	match f() {
		Ok(result) => {
			db.commit_transaction()?;
			Ok(result)
		},
		Err(error) => {
			db.rollback_transaction()?;
			Err(error)
		},
	}
}

pub fn storage_prefix(prefix: &str, item: &str) -> Vec<u8> {
	[twox_128(prefix.as_bytes()), twox_128(item.as_bytes())].concat()
}

fn twox_64_concat(prefix: &str, item: &str, key: impl Encode) -> Vec<u8> {
	let encoded = key.encode();
	let mut storage_key = storage_prefix(prefix, item);
	storage_key.extend_from_slice(&twox_64(&encoded));
	storage_key.extend_from_slice(&encoded);
	storage_key
}

pub struct AuthoritiesKey;

impl RecordKey for AuthoritiesKey {
	type Type = VersionedAuthorityList;

	fn key(&self) -> Vec<u8> {
		GRANDPA_AUTHORITIES_KEY.to_vec()
	}
}

pub struct CurrentSetIdKey;

impl RecordKey for CurrentSetIdKey {
	type Type = SetId;

	fn key(&self) -> Vec<u8> {
		storage_prefix(GRANDPA_PREFIX, CURRENT_SET_ID_ITEM)
	}
}

/// `true` if we are currently stalled: further wait and median last finalized block.
pub struct StalledKey;

impl RecordKey for StalledKey {
	type Type = (BlockNumber, BlockNumber);

	fn key(&self) -> Vec<u8> {
		storage_prefix(GRANDPA_PREFIX, STALLED_ITEM)
	}
}

pub struct PendingChangeKey;

impl RecordKey for PendingChangeKey {
	type Type = StoredPendingChange;

	fn key(&self) -> Vec<u8> {
		storage_prefix(GRANDPA_PREFIX, PENDING_CHANGE_ITEM)
	}
}

pub struct StateKey;

impl RecordKey for StateKey {
	type Type = StoredState;

	fn key(&self) -> Vec<u8> {
		storage_prefix(GRANDPA_PREFIX, STATE_ITEM)
	}
}

/// Next block number where we can force a change.
pub struct NextForcedKey;

impl RecordKey for NextForcedKey {
	type Type = BlockNumber;

	fn key(&self) -> Vec<u8> {
		storage_prefix(GRANDPA_PREFIX, NEXT_FORCED_ITEM)
	}
}

/// Session index that was current when the given set id became active.
pub struct SetIdSessionKey(pub SetId);

impl RecordKey for SetIdSessionKey {
	type Type = SessionIndex;

	fn key(&self) -> Vec<u8> {
		let SetIdSessionKey(set_id) = self;
		twox_64_concat(GRANDPA_PREFIX, SET_ID_SESSION_ITEM, set_id)
	}
}

pub struct BlockNumberKey;

impl RecordKey for BlockNumberKey {
	type Type = BlockNumber;

	fn key(&self) -> Vec<u8> {
		storage_prefix(SYSTEM_PREFIX, NUMBER_ITEM)
	}
}

pub struct EventsKey;

impl RecordKey for EventsKey {
	type Type = Vec<Event>;

	fn key(&self) -> Vec<u8> {
		storage_prefix(SYSTEM_PREFIX, EVENTS_ITEM)
	}
}

pub struct DigestKey;

impl RecordKey for DigestKey {
	type Type = Vec<DigestItem>;

	fn key(&self) -> Vec<u8> {
		storage_prefix(SYSTEM_PREFIX, DIGEST_ITEM)
	}
}

/// Validator set commitment and count of the given session.
pub struct HistoricalSessionKey(pub SessionIndex);

impl RecordKey for HistoricalSessionKey {
	type Type = (H256, u32);

	fn key(&self) -> Vec<u8> {
		let HistoricalSessionKey(session) = self;
		twox_64_concat(HISTORICAL_PREFIX, HISTORICAL_SESSIONS_ITEM, session)
	}
}

pub struct HistoricalValidatorsKey(pub SessionIndex);

impl RecordKey for HistoricalValidatorsKey {
	type Type = Vec<(AccountId, AuthorityId)>;

	fn key(&self) -> Vec<u8> {
		let HistoricalValidatorsKey(session) = self;
		twox_64_concat(HISTORICAL_PREFIX, HISTORICAL_VALIDATORS_ITEM, session)
	}
}

/// The range of historical sessions we store: `[start, end)`.
pub struct StoredRangeKey;

impl RecordKey for StoredRangeKey {
	type Type = (SessionIndex, SessionIndex);

	fn key(&self) -> Vec<u8> {
		storage_prefix(HISTORICAL_PREFIX, STORED_RANGE_ITEM)
	}
}

/// Reporters of an offence, keyed by its encoded kind, time slot and offender.
pub struct OffenceReportKey(pub Vec<u8>);

impl RecordKey for OffenceReportKey {
	type Type = Vec<AccountId>;

	fn key(&self) -> Vec<u8> {
		let OffenceReportKey(report_id) = self;
		twox_64_concat(OFFENCES_PREFIX, REPORTS_ITEM, report_id)
	}
}
