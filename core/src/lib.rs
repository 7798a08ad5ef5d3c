//! GRANDPA finality gadget runtime module.
//!
//! Manages the GRANDPA authority set ready for the native code. The authority
//! set and its changes are signaled through consensus logs in block digests,
//! and equivocations of the voters can be reported with proofs that are
//! validated against historical session data.
pub mod call;
pub mod config;
pub mod data;
pub mod equivocation;
pub mod error;
pub mod historical;
pub mod offences;
pub mod pallet;
pub mod report;
pub mod runtime_api;
pub mod session;
pub mod system;
pub mod types;
pub mod utils;

#[cfg(test)]
mod mock;

pub use pallet::Pallet;

/// Log target of the module.
pub const LOG_TARGET: &str = "runtime::grandpa";
