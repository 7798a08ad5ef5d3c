//! Block context consumed by the GRANDPA module: block number, event and digest
//! sinks and call origins.
use crate::{
	data::{BlockNumberKey, Database, DigestKey, EventsKey},
	error::{DispatchError, StorageError},
	types::{AccountId, BlockNumber, ConsensusLog, DigestItem, Event},
};
use mockall::automock;

#[automock]
pub trait System {
	fn block_number(&self) -> Result<BlockNumber, StorageError>;

	fn deposit_event(&self, event: Event) -> Result<(), StorageError>;

	fn deposit_log(&self, item: DigestItem) -> Result<(), StorageError>;
}

/// [`System`] backed by the same store as the modules, so deposited events and
/// logs are rolled back together with the transaction that produced them.
#[derive(Clone)]
pub struct BlockContext<D: Database> {
	db: D,
}

impl<D: Database> BlockContext<D> {
	pub fn new(db: D) -> Self {
		BlockContext { db }
	}

	/// Starts execution of a new block, clearing events and digest of the previous one.
	pub fn initialize(&self, number: BlockNumber) {
		self.db.put(BlockNumberKey, number);
		self.db.delete(EventsKey);
		self.db.delete(DigestKey);
	}

	pub fn events(&self) -> Result<Vec<Event>, StorageError> {
		Ok(self.db.get(EventsKey)?.unwrap_or_default())
	}

	pub fn digest(&self) -> Result<Vec<DigestItem>, StorageError> {
		Ok(self.db.get(DigestKey)?.unwrap_or_default())
	}

	/// GRANDPA consensus logs of the current block digest.
	pub fn grandpa_logs(&self) -> Result<Vec<ConsensusLog>, StorageError> {
		Ok(self
			.digest()?
			.iter()
			.filter_map(DigestItem::as_grandpa_log)
			.collect())
	}
}

impl<D: Database> System for BlockContext<D> {
	fn block_number(&self) -> Result<BlockNumber, StorageError> {
		Ok(self.db.get(BlockNumberKey)?.unwrap_or_default())
	}

	fn deposit_event(&self, event: Event) -> Result<(), StorageError> {
		self.db.append(EventsKey, event)
	}

	fn deposit_log(&self, item: DigestItem) -> Result<(), StorageError> {
		self.db.append(DigestKey, item)
	}
}

/// Origin of a dispatched call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
	Root,
	Signed(AccountId),
	None,
}

pub fn ensure_root(origin: Origin) -> Result<(), DispatchError> {
	match origin {
		Origin::Root => Ok(()),
		_ => Err(DispatchError::BadOrigin),
	}
}

pub fn ensure_signed(origin: Origin) -> Result<AccountId, DispatchError> {
	match origin {
		Origin::Signed(who) => Ok(who),
		_ => Err(DispatchError::BadOrigin),
	}
}

pub fn ensure_none(origin: Origin) -> Result<(), DispatchError> {
	match origin {
		Origin::None => Ok(()),
		_ => Err(DispatchError::BadOrigin),
	}
}
