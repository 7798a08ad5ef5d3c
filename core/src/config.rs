use serde::{Deserialize, Serialize};

/// Runtime constants of the GRANDPA module.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct GrandpaConfig {
	/// Max authorities in use (default: 100).
	pub max_authorities: u32,
	/// Maximum number of entries kept in the set id to session index map. Should be
	/// at least the bonding duration in sessions, so that equivocations can be
	/// reported for as long as the offender can be slashed (default: 168).
	pub max_set_id_session_entries: u64,
	/// Index of the module in the runtime, prefixes encoded calls and module errors (default: 4).
	pub pallet_index: u8,
	/// Number of blocks an unsigned equivocation report stays valid in the pool (default: 168).
	pub report_longevity: u64,
}

impl Default for GrandpaConfig {
	fn default() -> Self {
		GrandpaConfig {
			max_authorities: 100,
			max_set_id_session_entries: 168,
			pallet_index: 4,
			report_longevity: 168,
		}
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}
