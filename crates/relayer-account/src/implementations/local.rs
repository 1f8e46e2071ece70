//! Local private-key wallet backend.

use alloy::{
	primitives::{Address, B256},
	signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;

use crate::{AccountError, AccountInterface};

/// Key backend holding a hex-encoded private key in process memory.
///
/// Suitable for the relayer's deployment model where the key lives in an
/// environment variable injected at startup.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex private key, with or without 0x prefix.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let stripped = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

		if stripped.len() != 64 {
			return Err(AccountError::InvalidKey(
				"Private key must be 64 hex characters (32 bytes)".to_string(),
			));
		}
		if hex::decode(stripped).is_err() {
			return Err(AccountError::InvalidKey(
				"Private key must be valid hexadecimal".to_string(),
			));
		}

		let signer = stripped
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_digest(&self, digest: &B256) -> Result<Vec<u8>, AccountError> {
		let signature = self
			.signer
			.sign_hash(digest)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign digest: {}", e)))?;

		Ok(signature.as_bytes().to_vec())
	}

	fn signer(&self) -> PrivateKeySigner {
		self.signer.clone()
	}
}

/// Factory: builds the account backend from the `[account]` config table.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::Config("account.private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(private_key)?))
}
