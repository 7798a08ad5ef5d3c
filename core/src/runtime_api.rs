//! Runtime API exposed to the node side GRANDPA voter.
//!
//! Arguments and results cross the boundary SCALE encoded, [`call`] routes an
//! encoded request by method name.
use crate::{
	data::Database,
	equivocation::EquivocationProof,
	error::{ApiError, StorageError},
	historical::{MembershipProof, OpaqueKeyOwnershipProof},
	pallet::Pallet,
	types::{AuthorityId, AuthorityList, SetId, KEY_TYPE},
};
use codec::{DecodeAll, Encode};
use tracing::debug;

use crate::LOG_TARGET;

pub const GRANDPA_AUTHORITIES: &str = "GrandpaApi_grandpa_authorities";
pub const CURRENT_SET_ID: &str = "GrandpaApi_current_set_id";
pub const SUBMIT_REPORT_EQUIVOCATION_UNSIGNED_EXTRINSIC: &str =
	"GrandpaApi_submit_report_equivocation_unsigned_extrinsic";
pub const GENERATE_KEY_OWNERSHIP_PROOF: &str = "GrandpaApi_generate_key_ownership_proof";

pub trait GrandpaApi {
	/// Get the current GRANDPA authorities and weights. This should not change except
	/// for when changes are scheduled and the corresponding delay has passed.
	fn grandpa_authorities(&self) -> Result<AuthorityList, StorageError>;

	/// Get current GRANDPA authority set id.
	fn current_set_id(&self) -> Result<SetId, StorageError>;

	/// Submits an unsigned extrinsic to report an equivocation. The caller must
	/// provide the equivocation proof and a key ownership proof (should be obtained
	/// using `generate_key_ownership_proof`). Returns `None` when the submission
	/// failed or the key ownership proof could not be decoded.
	fn submit_report_equivocation_unsigned_extrinsic(
		&self,
		equivocation_proof: EquivocationProof,
		key_owner_proof: OpaqueKeyOwnershipProof,
	) -> Option<()>;

	/// Generates a proof of key ownership for the given authority in the given set.
	/// The proof is generated against the current session, `set_id` is not used to
	/// look up historical sessions.
	fn generate_key_ownership_proof(
		&self,
		set_id: SetId,
		authority_id: AuthorityId,
	) -> Result<Option<OpaqueKeyOwnershipProof>, StorageError>;
}

impl<D: Database> GrandpaApi for Pallet<D> {
	fn grandpa_authorities(&self) -> Result<AuthorityList, StorageError> {
		Pallet::grandpa_authorities(self)
	}

	fn current_set_id(&self) -> Result<SetId, StorageError> {
		Pallet::current_set_id(self)
	}

	fn submit_report_equivocation_unsigned_extrinsic(
		&self,
		equivocation_proof: EquivocationProof,
		key_owner_proof: OpaqueKeyOwnershipProof,
	) -> Option<()> {
		let key_owner_proof = key_owner_proof.decode::<MembershipProof>()?;

		self.report_system
			.publish_evidence((equivocation_proof, key_owner_proof))
			.ok()
	}

	fn generate_key_ownership_proof(
		&self,
		_set_id: SetId,
		authority_id: AuthorityId,
	) -> Result<Option<OpaqueKeyOwnershipProof>, StorageError> {
		Ok(self
			.key_owner_proof_system
			.prove((KEY_TYPE, authority_id))?
			.map(|proof| OpaqueKeyOwnershipProof::new(proof.encode())))
	}
}

/// Executes the runtime API `method` with SCALE encoded `input`, returning the
/// SCALE encoded result.
pub fn call(api: &impl GrandpaApi, method: &str, input: &[u8]) -> Result<Vec<u8>, ApiError> {
	let mut input = input;
	debug!(target: LOG_TARGET, method, input_len = input.len(), "Runtime API call");

	let output = match method {
		GRANDPA_AUTHORITIES => {
			<()>::decode_all(&mut input)?;
			api.grandpa_authorities()?.encode()
		},
		CURRENT_SET_ID => {
			<()>::decode_all(&mut input)?;
			api.current_set_id()?.encode()
		},
		SUBMIT_REPORT_EQUIVOCATION_UNSIGNED_EXTRINSIC => {
			let (equivocation_proof, key_owner_proof) =
				<(EquivocationProof, OpaqueKeyOwnershipProof)>::decode_all(&mut input)?;
			api.submit_report_equivocation_unsigned_extrinsic(equivocation_proof, key_owner_proof)
				.encode()
		},
		GENERATE_KEY_OWNERSHIP_PROOF => {
			let (set_id, authority_id) = <(SetId, AuthorityId)>::decode_all(&mut input)?;
			api.generate_key_ownership_proof(set_id, authority_id)?
				.encode()
		},
		_ => return Err(ApiError::UnknownMethod(method.to_string())),
	};

	Ok(output)
}
