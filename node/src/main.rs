#![doc = include_str!("../README.md")]

use crate::{cli::CliOpts, config::RuntimeConfig};
use clap::Parser;
use codec::{DecodeAll, Encode};
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use grandpa_pallet_core::{
	call::{Call, RuntimeCall, TransactionSource},
	data::MemoryDB,
	equivocation::{
		sign_message, Equivocation, EquivocationProof, Message, Prevote, VoteEquivocation,
	},
	error::SubmitError,
	historical::{HistoricalSessions, OpaqueKeyOwnershipProof},
	offences::Offences,
	report::{Authorship, EquivocationReportSystem, SubmitTransaction},
	runtime_api::{
		self, GENERATE_KEY_OWNERSHIP_PROOF, SUBMIT_REPORT_EQUIVOCATION_UNSIGNED_EXTRINSIC,
	},
	session::{OneSessionHandler, SessionInfo},
	system::{BlockContext, Origin},
	types::{ed25519, AccountId, AuthorityId, BlockNumber, SessionIndex, H256},
	utils::{default_subscriber, json_subscriber},
	Pallet,
};
use sp_core::Pair;
use std::{
	fs,
	sync::{Arc, Mutex},
};
use tracing::{error, info, warn};

mod cli;
mod config;

type Validators = Vec<(AccountId, AuthorityId)>;

/// Session rotation of the development chain.
#[derive(Clone, Default)]
struct DevSession {
	index: Arc<Mutex<SessionIndex>>,
	validators: Arc<Mutex<Validators>>,
}

impl SessionInfo for DevSession {
	fn current_index(&self) -> SessionIndex {
		*self.index.lock().expect("Lock acquired")
	}

	fn validators(&self) -> Validators {
		self.validators.lock().expect("Lock acquired").clone()
	}
}

/// Every block is authored by the first genesis authority.
struct DevAuthor(AccountId);

impl Authorship for DevAuthor {
	fn author(&self) -> Option<AccountId> {
		Some(self.0.clone())
	}
}

/// Unsigned transactions waiting for the next block.
#[derive(Clone, Default)]
struct LocalPool(Arc<Mutex<Vec<Vec<u8>>>>);

impl LocalPool {
	fn drain(&self) -> Vec<Vec<u8>> {
		std::mem::take(&mut *self.0.lock().expect("Lock acquired"))
	}
}

impl SubmitTransaction for LocalPool {
	fn submit_unsigned_transaction(&self, encoded_call: Vec<u8>) -> Result<(), SubmitError> {
		info!(call = %hex::encode(&encoded_call), "Transaction added to the local pool");
		self.0.lock().expect("Lock acquired").push(encoded_call);
		Ok(())
	}
}

struct Node {
	cfg: RuntimeConfig,
	keys: Vec<ed25519::Pair>,
	context: BlockContext<MemoryDB>,
	historical: HistoricalSessions<MemoryDB>,
	session: DevSession,
	pool: LocalPool,
	pallet: Pallet<MemoryDB>,
}

fn account(pair: &ed25519::Pair) -> AccountId {
	AccountId::new(pair.public().0)
}

impl Node {
	fn new(cfg: RuntimeConfig) -> Result<Self> {
		let keys = cfg
			.authorities
			.iter()
			.map(|suri| {
				ed25519::Pair::from_string(suri, None)
					.map_err(|error| eyre!("Invalid authority secret URI {suri}: {error:?}"))
			})
			.collect::<Result<Vec<_>>>()?;
		let author = keys
			.first()
			.map(account)
			.ok_or_else(|| eyre!("At least one authority is required"))?;

		let db = MemoryDB::default();
		let context = BlockContext::new(db.clone());
		let historical = HistoricalSessions::new(db.clone());
		let key_owners = Arc::new(historical.clone());
		let session = DevSession::default();
		let pool = LocalPool::default();

		let report_system = EquivocationReportSystem::new(
			db.clone(),
			&cfg.grandpa,
			key_owners.clone(),
			Box::new(Offences::new(db.clone())),
			Box::new(DevAuthor(author)),
			Box::new(pool.clone()),
		);
		let pallet = Pallet::new(
			db,
			cfg.grandpa.clone(),
			Box::new(context.clone()),
			Box::new(session.clone()),
			key_owners,
			Box::new(report_system),
		);

		Ok(Node {
			cfg,
			keys,
			context,
			historical,
			session,
			pool,
			pallet,
		})
	}

	/// Validators of the given session, the authority order rotates every session.
	fn validators(&self, session: SessionIndex) -> Validators {
		let mut validators: Validators = self
			.keys
			.iter()
			.map(|pair| (account(pair), pair.public()))
			.collect();
		let len = validators.len();
		validators.rotate_left(session as usize % len);
		validators
	}

	fn genesis(&self) -> Result<()> {
		let validators = self.validators(0);
		*self.session.validators.lock().expect("Lock acquired") = validators.clone();
		self.historical.note_session(0, validators.clone())?;
		self.pallet
			.on_genesis_session(&validators)
			.wrap_err("Failed to build genesis authority set")?;
		info!(authorities = validators.len(), "Genesis authority set initialized");
		Ok(())
	}

	fn rotate_session(&self) -> Result<()> {
		let index = {
			let mut index = self.session.index.lock().expect("Lock acquired");
			*index += 1;
			*index
		};
		let validators = self.validators(index);
		*self.session.validators.lock().expect("Lock acquired") = validators.clone();

		self.pallet.on_before_session_ending();
		self.historical.note_session(index, validators.clone())?;
		self.pallet
			.on_new_session(true, &validators, &validators)
			.wrap_err("Failed to rotate session")?;

		let history_depth = self.cfg.grandpa.max_set_id_session_entries as SessionIndex;
		self.historical.prune_up_to(index.saturating_sub(history_depth))?;

		info!(
			session = index,
			set_id = self.pallet.current_set_id()?,
			"New session"
		);
		Ok(())
	}

	/// Includes the unsigned transactions of the local pool in the current block.
	fn apply_pool(&self) -> Result<()> {
		for encoded in self.pool.drain() {
			let call = match RuntimeCall::decode_for(self.cfg.grandpa.pallet_index, &encoded) {
				Ok(call) => call,
				Err(error) => {
					warn!("Dropping undecodable transaction: {error}");
					continue;
				},
			};

			if let Err(error) = self
				.pallet
				.validate_unsigned(TransactionSource::InBlock, &call)
				.and_then(|_| self.pallet.pre_dispatch(&call))
			{
				warn!("Dropping invalid transaction: {error}");
				continue;
			}

			match self.pallet.dispatch(Origin::None, call) {
				Ok(info) => info!(pays_fee = ?info.pays_fee, "Transaction applied"),
				Err(error) => error!("Transaction failed: {error}"),
			}
		}
		Ok(())
	}

	fn note_stalled(&self, number: BlockNumber) -> Result<()> {
		let call = Call::NoteStalled {
			delay: self.cfg.forced_change_delay,
			best_finalized_block_number: number.saturating_sub(1),
		};
		self.pallet
			.dispatch(Origin::Root, call)
			.wrap_err("Failed to note stalled authority set")?;
		Ok(())
	}

	/// The first authority votes for two different blocks in the same round, the
	/// evidence is reported through the runtime API.
	fn equivocate(&self, number: BlockNumber) -> Result<()> {
		let offender = &self.keys[0];
		let set_id = self.pallet.current_set_id()?;
		let round = number;

		let signed = |target_hash: H256| {
			let prevote = Prevote {
				target_hash,
				target_number: number,
			};
			let signature =
				sign_message(offender, &Message::Prevote(prevote.clone()), round, set_id);
			(prevote, signature)
		};
		let equivocation_proof = EquivocationProof::new(
			set_id,
			Equivocation::Prevote(VoteEquivocation {
				round_number: round,
				identity: offender.public(),
				first: signed(H256::repeat_byte(1)),
				second: signed(H256::repeat_byte(2)),
			}),
		);

		let output = runtime_api::call(
			&self.pallet,
			GENERATE_KEY_OWNERSHIP_PROOF,
			&(set_id, offender.public()).encode(),
		)?;
		let key_owner_proof = Option::<OpaqueKeyOwnershipProof>::decode_all(&mut &output[..])?
			.ok_or_else(|| eyre!("No key ownership proof for the offender"))?;

		let output = runtime_api::call(
			&self.pallet,
			SUBMIT_REPORT_EQUIVOCATION_UNSIGNED_EXTRINSIC,
			&(equivocation_proof, key_owner_proof).encode(),
		)?;
		if Option::<()>::decode_all(&mut &output[..])?.is_none() {
			return Err(eyre!("Equivocation report was not submitted"));
		}
		info!(set_id, round, "Equivocation reported");
		Ok(())
	}

	fn run(&self) -> Result<()> {
		self.genesis()?;

		for number in 1..=self.cfg.blocks {
			self.context.initialize(number);

			if number % self.cfg.session_length == 0 {
				self.rotate_session()?;
			}
			self.apply_pool()?;
			if self.cfg.stall_at == Some(number) {
				self.note_stalled(number)?;
			}
			if self.cfg.equivocate_at == Some(number) {
				self.equivocate(number)?;
			}

			self.pallet.on_finalize(number)?;

			for event in self.context.events()? {
				info!(block_number = number, ?event, "Event");
			}
			for log in self.context.grandpa_logs()? {
				info!(block_number = number, ?log, "Consensus log");
			}
		}

		info!(
			set_id = self.pallet.current_set_id()?,
			authorities = self.pallet.grandpa_authorities()?.len(),
			state = ?self.pallet.state()?,
			"Finished"
		);
		Ok(())
	}
}

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {}", config_path))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags override the config parameters
	if let Some(blocks) = opts.blocks {
		cfg.blocks = blocks;
	}
	if let Some(session_length) = opts.session_length {
		cfg.session_length = session_length;
	}
	cfg.stall_at = opts.stall_at.or(cfg.stall_at);
	cfg.equivocate_at = opts.equivocate_at.or(cfg.equivocate_at);

	if cfg.session_length == 0 {
		return Err(eyre!("Session length must be at least one block"));
	}

	Ok(cfg)
}

pub fn install_panic_hooks() -> Result<()> {
	// initialize color-eyre hooks
	let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
		.display_location_section(true)
		.display_env_section(true)
		.into_hooks();

	// install hook as global handler
	eyre_hook.install()?;

	std::panic::set_hook(Box::new(move |panic_info| {
		let msg = format!("{}", panic_hook.panic_report(panic_info));
		error!("Error: {}", strip_ansi_escapes::strip_str(msg));

		#[cfg(debug_assertions)]
		{
			// better-panic stacktrace that is only enabled when debugging
			better_panic::Settings::auto()
				.most_recent_first(false)
				.lineno_suffix(true)
				.verbosity(better_panic::Verbosity::Medium)
				.create_panic_handler()(panic_info);
		}
	}));
	Ok(())
}

fn main() -> Result<()> {
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks()?;

	let version = clap::crate_version!();
	info!("Running GRANDPA development node version: {version}.");
	info!("Using config: {cfg:?}");

	let node = Node::new(cfg)?;
	if let Err(error) = node.run() {
		error!("{error:#}");
		return Err(error.wrap_err("Development node failed"));
	}

	Ok(())
}
