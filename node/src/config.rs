use grandpa_pallet_core::config::{tracing_level_format, GrandpaConfig};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Representation of a configuration used by this project.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RuntimeConfig {
	#[serde(flatten)]
	pub grandpa: GrandpaConfig,
	/// Log level, default is `INFO`. See `<https://docs.rs/log/0.4.14/log/enum.LevelFilter.html>` for possible log level values. (default: `INFO`).
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// If set to true, logs are displayed in JSON format, which is used for structured logging. Otherwise, plain text format is used (default: false).
	pub log_format_json: bool,
	/// Number of blocks to execute (default: 60).
	pub blocks: u64,
	/// Number of blocks per session (default: 10).
	pub session_length: u64,
	/// Secret URIs of the development authorities (default: //Alice, //Bob, //Charlie).
	pub authorities: Vec<String>,
	/// Block at which the current authority set is noted as stalled (default: None).
	pub stall_at: Option<u64>,
	/// Delay of the forced change which replaces a stalled set (default: 5).
	pub forced_change_delay: u64,
	/// Block at which the first authority equivocates (default: None).
	pub equivocate_at: Option<u64>,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfig {
			grandpa: GrandpaConfig::default(),
			log_level: Level::INFO,
			log_format_json: false,
			blocks: 60,
			session_length: 10,
			authorities: vec![
				"//Alice".to_string(),
				"//Bob".to_string(),
				"//Charlie".to_string(),
			],
			stall_at: None,
			forced_change_delay: 5,
			equivocate_at: None,
		}
	}
}
