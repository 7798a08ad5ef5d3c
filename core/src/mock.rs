//! Test runtime wiring the module to in-memory collaborators.
use crate::{
	config::GrandpaConfig,
	data::MemoryDB,
	error::SubmitError,
	historical::HistoricalSessions,
	offences::Offences,
	pallet::Pallet,
	report::{Authorship, EquivocationReportSystem, SubmitTransaction},
	session::{OneSessionHandler, SessionInfo},
	system::{BlockContext, System},
	types::{ed25519, AccountId, AuthorityId, BlockNumber, SessionIndex},
};
use sp_core::Pair;
use std::sync::{Arc, Mutex};

pub(crate) type Validators = Vec<(AccountId, AuthorityId)>;

pub(crate) fn pair(seed: u8) -> ed25519::Pair {
	ed25519::Pair::from_seed(&[seed; 32])
}

pub(crate) fn account(seed: u8) -> AccountId {
	AccountId::new([seed; 32])
}

pub(crate) fn validators(seeds: &[u8]) -> Validators {
	seeds
		.iter()
		.map(|seed| (account(*seed), pair(*seed).public()))
		.collect()
}

#[derive(Clone, Default)]
struct TestSession {
	index: Arc<Mutex<SessionIndex>>,
	validators: Arc<Mutex<Validators>>,
}

impl SessionInfo for TestSession {
	fn current_index(&self) -> SessionIndex {
		*self.index.lock().unwrap()
	}

	fn validators(&self) -> Validators {
		self.validators.lock().unwrap().clone()
	}
}

struct TestAuthor;

impl Authorship for TestAuthor {
	fn author(&self) -> Option<AccountId> {
		Some(account(99))
	}
}

#[derive(Clone, Default)]
pub(crate) struct TestPool(Arc<Mutex<Vec<Vec<u8>>>>);

impl TestPool {
	pub(crate) fn drain(&self) -> Vec<Vec<u8>> {
		std::mem::take(&mut *self.0.lock().unwrap())
	}
}

impl SubmitTransaction for TestPool {
	fn submit_unsigned_transaction(&self, encoded_call: Vec<u8>) -> Result<(), SubmitError> {
		self.0.lock().unwrap().push(encoded_call);
		Ok(())
	}
}

pub(crate) struct TestRuntime {
	pub db: MemoryDB,
	pub context: BlockContext<MemoryDB>,
	pub historical: HistoricalSessions<MemoryDB>,
	pub pool: TestPool,
	pub pallet: Pallet<MemoryDB>,
	session: TestSession,
}

impl TestRuntime {
	pub(crate) fn new(config: GrandpaConfig) -> Self {
		let db = MemoryDB::default();
		let context = BlockContext::new(db.clone());
		let historical = HistoricalSessions::new(db.clone());
		let key_owners = Arc::new(historical.clone());
		let pool = TestPool::default();
		let session = TestSession::default();

		let report_system = EquivocationReportSystem::new(
			db.clone(),
			&config,
			key_owners.clone(),
			Box::new(Offences::new(db.clone())),
			Box::new(TestAuthor),
			Box::new(pool.clone()),
		);
		let pallet = Pallet::new(
			db.clone(),
			config,
			Box::new(context.clone()),
			Box::new(session.clone()),
			key_owners,
			Box::new(report_system),
		);

		TestRuntime {
			db,
			context,
			historical,
			pool,
			pallet,
			session,
		}
	}

	/// Builds the genesis state with the given validators at block 1.
	pub(crate) fn with_genesis(config: GrandpaConfig, seeds: &[u8]) -> Self {
		let runtime = Self::new(config);
		let validators = validators(seeds);
		*runtime.session.validators.lock().unwrap() = validators.clone();
		runtime.historical.note_session(0, validators.clone()).unwrap();
		runtime.pallet.on_genesis_session(&validators).unwrap();
		runtime.context.initialize(1);
		runtime
	}

	/// Rotates to the next session, optionally with a new validator set.
	pub(crate) fn rotate_session(&self, next: Option<&[u8]>) -> SessionIndex {
		let changed = next.is_some();
		let index = {
			let mut index = self.session.index.lock().unwrap();
			*index += 1;
			*index
		};
		if let Some(seeds) = next {
			*self.session.validators.lock().unwrap() = validators(seeds);
		}
		let validators = self.session.validators();
		self.historical.note_session(index, validators.clone()).unwrap();
		self.pallet
			.on_new_session(changed, &validators, &validators)
			.unwrap();
		index
	}

	pub(crate) fn block_number(&self) -> BlockNumber {
		System::block_number(&self.context).unwrap()
	}

	pub(crate) fn start_block(&self, number: BlockNumber) {
		self.context.initialize(number);
	}

	/// Runs the finalization hook of the current block. Its events and logs stay
	/// readable until the next block starts.
	pub(crate) fn finalize_block(&self) {
		self.pallet.on_finalize(self.block_number()).unwrap();
	}

	/// Finalizes blocks until `target` is started.
	pub(crate) fn run_to_block(&self, target: BlockNumber) {
		while self.block_number() < target {
			self.finalize_block();
			self.start_block(self.block_number() + 1);
		}
	}
}
