use codec::{Decode, Encode};
use thiserror::Error;

/// Errors of the GRANDPA module. The discriminant is the stable index exposed
/// to callers in [`DispatchError::Module`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Error {
	#[error("Attempt to signal GRANDPA pause when the authority set isn't live")]
	PauseFailed = 0,
	#[error("Attempt to signal GRANDPA resume when the authority set isn't paused")]
	ResumeFailed = 1,
	#[error("Attempt to signal GRANDPA change with one already pending")]
	ChangePending = 2,
	#[error("Cannot signal forced change so soon after last")]
	TooSoon = 3,
	#[error("A key ownership proof provided as part of an equivocation report is invalid")]
	InvalidKeyOwnershipProof = 4,
	#[error("An equivocation proof provided as part of an equivocation report is invalid")]
	InvalidEquivocationProof = 5,
	#[error("A given equivocation report is valid but already previously reported")]
	DuplicateOffenceReport = 6,
}

impl Error {
	pub fn index(&self) -> u8 {
		*self as u8
	}

	/// Wraps the error into a dispatch failure of the module at `pallet_index`.
	pub fn dispatch(self, pallet_index: u8) -> DispatchError {
		DispatchError::Module {
			index: pallet_index,
			error: self,
		}
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
	#[error("Cannot decode stored value: {0}")]
	Decode(String),
	#[error("No open storage transaction")]
	NoOpenTransaction,
}

impl From<codec::Error> for StorageError {
	fn from(error: codec::Error) -> Self {
		StorageError::Decode(error.to_string())
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
	#[error("Bad origin")]
	BadOrigin,
	#[error("Module {index} error: {error}")]
	Module { index: u8, error: Error },
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error("{0}")]
	Other(&'static str),
}

impl DispatchError {
	pub fn module_error(&self) -> Option<Error> {
		match self {
			DispatchError::Module { error, .. } => Some(*error),
			_ => None,
		}
	}
}

/// Failures of authority set scheduling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
	#[error(transparent)]
	Module(#[from] Error),
	#[error("Next authority set exceeds the maximum of {0} authorities")]
	TooManyAuthorities(u32),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Failures while building the genesis authority set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
	#[error("Authorities are already initialized!")]
	AlreadyInitialized,
	#[error("Genesis authorities exceed the maximum of {0} authorities")]
	TooManyAuthorities(u32),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OffenceError {
	#[error("The offence has already been reported")]
	DuplicateReport,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
	#[error("Transaction pool rejected the call: {0}")]
	Rejected(String),
}

/// Reasons an unsigned transaction is refused by the pool.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTransaction {
	#[error("The call is not allowed from this source")]
	Call,
	#[error("The attached proof is invalid")]
	BadProof,
	#[error("The report is outdated or already known")]
	Stale,
}

/// Failures of unsigned transaction validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionValidityError {
	#[error(transparent)]
	Invalid(#[from] InvalidTransaction),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
	#[error("Unknown runtime API method {0}")]
	UnknownMethod(String),
	#[error("Cannot decode runtime API input: {0}")]
	Decode(String),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

impl From<codec::Error> for ApiError {
	fn from(error: codec::Error) -> Self {
		ApiError::Decode(error.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	#[test_case(Error::PauseFailed => 0)]
	#[test_case(Error::ResumeFailed => 1)]
	#[test_case(Error::ChangePending => 2)]
	#[test_case(Error::TooSoon => 3)]
	#[test_case(Error::InvalidKeyOwnershipProof => 4)]
	#[test_case(Error::InvalidEquivocationProof => 5)]
	#[test_case(Error::DuplicateOffenceReport => 6)]
	fn module_error_indices_are_stable(error: Error) -> u8 {
		assert_eq!(error.encode(), vec![error.index()]);
		error.index()
	}

	#[test]
	fn dispatch_keeps_module_error() {
		let error = Error::TooSoon.dispatch(4);
		assert_eq!(
			error,
			DispatchError::Module {
				index: 4,
				error: Error::TooSoon
			}
		);
		assert_eq!(error.module_error(), Some(Error::TooSoon));
		assert_eq!(DispatchError::BadOrigin.module_error(), None);
	}
}
