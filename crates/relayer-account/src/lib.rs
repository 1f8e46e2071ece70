//! The relayer's signing-key resource.
//!
//! The key is a singleton credential: loaded once at startup from
//! configuration, held behind [`AccountService`], and handed only to the
//! chain submission client. It is never logged and has no other readers.

use alloy::{
	primitives::{Address, B256},
	signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

pub use implementations::local::{create_account, LocalWallet};

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Missing configuration: {0}")]
	Config(String),
}

/// Interface every key backend must provide.
///
/// `sign_digest` covers the relayer's off-chain signing needs (user
/// operation hashes); transaction signing goes through the provider
/// wallet built from [`AccountInterface::signer`].
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// The relayer's own address.
	fn address(&self) -> Address;

	/// Signs a raw 32-byte digest, returning the 65-byte signature.
	async fn sign_digest(&self, digest: &B256) -> Result<Vec<u8>, AccountError>;

	/// The underlying signer, for constructing a provider wallet.
	fn signer(&self) -> PrivateKeySigner;
}

/// High-level wrapper owning the configured key backend.
pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub fn address(&self) -> Address {
		self.provider.address()
	}

	pub async fn sign_digest(&self, digest: &B256) -> Result<Vec<u8>, AccountError> {
		self.provider.sign_digest(digest).await
	}

	pub fn signer(&self) -> PrivateKeySigner {
		self.provider.signer()
	}
}
