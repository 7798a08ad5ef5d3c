use clap::{command, Parser};
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
	/// Number of blocks to execute
	#[arg(short, long)]
	pub blocks: Option<u64>,
	/// Number of blocks per session
	#[arg(long)]
	pub session_length: Option<u64>,
	/// Block at which the current authority set is noted as stalled
	#[arg(long)]
	pub stall_at: Option<u64>,
	/// Block at which the first authority equivocates
	#[arg(long)]
	pub equivocate_at: Option<u64>,
}
