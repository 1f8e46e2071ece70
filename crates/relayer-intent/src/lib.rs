//! Intent model and signature verification.
//!
//! This crate owns the EIP-712 side of the relayer: building the domain
//! and the wallet-facing typed-data payload, and recovering/checking the
//! user signature over it. Everything here is pure and local; no network
//! calls are involved in verification.
//!
//! The domain constants and the `SwapIntent` layout in `relayer-types`
//! must stay in lockstep with the deployed RouterHub verifier. A mismatch
//! in either direction fails every real signature without any other
//! symptom, so changes here require re-checking against the contract.

use alloy::{
	dyn_abi::TypedData,
	primitives::{Address, Signature, B256, U256},
	sol_types::{Eip712Domain, SolStruct},
};
use std::borrow::Cow;
use thiserror::Error;

use relayer_types::SwapIntent;

/// EIP-712 domain name fixed by the RouterHub verifier.
pub const DOMAIN_NAME: &str = "ZeroTollRouter";
/// EIP-712 domain version fixed by the RouterHub verifier.
pub const DOMAIN_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum IntentError {
	#[error("Signature must be 65 bytes, got {0}")]
	SignatureLength(usize),
	#[error("Signature recovery failed: {0}")]
	Recovery(String),
	#[error("Recovered {recovered}, expected {expected}")]
	SignerMismatch { recovered: Address, expected: Address },
}

/// Builds the EIP-712 domain binding signatures to one chain and one
/// RouterHub deployment.
pub fn build_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
	Eip712Domain {
		name: Some(Cow::Borrowed(DOMAIN_NAME)),
		version: Some(Cow::Borrowed(DOMAIN_VERSION)),
		chain_id: Some(U256::from(chain_id)),
		verifying_contract: Some(verifying_contract),
		salt: None,
	}
}

/// Builds the `{types, domain, primaryType, message}` payload for the
/// client's `eth_signTypedData_v4` call.
///
/// The payload hashes byte-for-byte identically to [`signing_hash`]; the
/// round trip is covered by tests so the two paths cannot drift.
pub fn build_typed_data(intent: &SwapIntent, chain_id: u64, verifying_contract: Address) -> TypedData {
	TypedData::from_struct(intent, Some(build_domain(chain_id, verifying_contract)))
}

/// The digest the user's wallet actually signs.
pub fn signing_hash(intent: &SwapIntent, chain_id: u64, verifying_contract: Address) -> B256 {
	intent.eip712_signing_hash(&build_domain(chain_id, verifying_contract))
}

/// Verifies that `signature` over the intent's typed-data hash recovers
/// to `intent.user`. Deterministic and offline.
pub fn verify(
	intent: &SwapIntent,
	chain_id: u64,
	verifying_contract: Address,
	signature: &[u8],
) -> Result<(), IntentError> {
	if signature.len() != 65 {
		return Err(IntentError::SignatureLength(signature.len()));
	}

	let sig = Signature::from_raw(signature).map_err(|e| IntentError::Recovery(e.to_string()))?;
	let digest = signing_hash(intent, chain_id, verifying_contract);
	let recovered = sig
		.recover_address_from_prehash(&digest)
		.map_err(|e| IntentError::Recovery(e.to_string()))?;

	if recovered != intent.user {
		return Err(IntentError::SignerMismatch {
			recovered,
			expected: intent.user,
		});
	}

	Ok(())
}
