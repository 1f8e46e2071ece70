//! Chain submission client.
//!
//! Encapsulates every outbound network call the relayer makes: read-only
//! contract queries, self-funded transaction submission, receipt polling,
//! and the ERC-4337 bundler RPC (see [`bundler`]). Errors are mapped to a
//! small taxonomy here so raw provider errors never travel upward.

use alloy::{
	network::{EthereumWallet, TransactionBuilder},
	primitives::{Address, B256, U256},
	providers::{DynProvider, Provider, ProviderBuilder},
	rpc::types::TransactionRequest,
	signers::local::PrivateKeySigner,
	sol_types::{decode_revert_reason, SolCall},
	transports::TransportError,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use relayer_types::{IEntryPoint, IERC20, IRouterHub};

pub mod bundler;

pub use bundler::BundlerClient;

/// How often receipt polling re-queries the chain.
const RECEIPT_POLL_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(3);
/// Upper bound on waiting for a self-funded transaction to land.
const RECEIPT_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(120);
/// Attempts for transient read failures before giving up.
const READ_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ChainError {
	/// Transient transport/provider failure, after retries.
	#[error("RPC unavailable: {0}")]
	Rpc(String),
	/// The node reported a revert; reason decoded when possible.
	#[error("Reverted: {0}")]
	Reverted(String),
	/// Polling window exhausted; outcome unknown.
	#[error("Timeout: {0}")]
	Timeout(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Minimal receipt view surfaced to the engine.
#[derive(Debug, Clone)]
pub struct Receipt {
	pub tx_hash: B256,
	pub block_number: u64,
	pub success: bool,
}

/// Utility to shorten hashes in log lines.
fn truncate_hash(hash: &B256) -> String {
	let hash_str = hex::encode(hash.as_slice());
	format!("{}..", &hash_str[..8])
}

/// Maps a provider error into the taxonomy, decoding revert data
/// best-effort.
fn classify(e: TransportError) -> ChainError {
	if let Some(payload) = e.as_error_resp() {
		if let Some(data) = payload.as_revert_data() {
			let reason = decode_revert_reason(&data)
				.unwrap_or_else(|| format!("unrecognized revert data: 0x{}", hex::encode(&data)));
			return ChainError::Reverted(reason);
		}
		return ChainError::Reverted(payload.message.to_string());
	}
	ChainError::Rpc(e.to_string())
}

/// Interface the engine uses to talk to the chain.
///
/// One production implementation ([`EvmClient`]); the seam exists so the
/// engine and strategy selector can be exercised against a scripted
/// chain in tests.
#[async_trait]
pub trait ChainInterface: Send + Sync {
	fn chain_id(&self) -> u64;

	/// The RouterHub deployment this client submits to.
	fn router(&self) -> Address;

	/// The RouterHub's next expected intent nonce for `user`.
	async fn intent_nonce(&self, user: Address) -> Result<U256, ChainError>;

	/// Current ERC-20 allowance from `owner` to the RouterHub.
	async fn router_allowance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

	/// The entry point's next user-operation nonce for `sender` (key 0).
	async fn user_op_nonce(&self, entry_point: Address, sender: Address)
		-> Result<U256, ChainError>;

	/// Current EIP-1559 fee estimate, for pricing user operations.
	async fn fee_estimate(&self) -> Result<(u128, u128), ChainError>;

	/// Submits a self-funded transaction to the RouterHub and returns its
	/// hash once broadcast (not once mined).
	async fn send_router_transaction(&self, data: Vec<u8>) -> Result<B256, ChainError>;

	/// Polls for a receipt until found or the window closes.
	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError>;
}

/// Alloy-backed EVM client for one chain and one RouterHub deployment.
///
/// Holds the relayer's wallet for the self-funded path. Submissions from
/// the relayer's own account are serialized through an internal lock so
/// its nonce sequence never forks.
pub struct EvmClient {
	provider: DynProvider,
	chain_id: u64,
	router: Address,
	relayer: Address,
	nonce_lock: tokio::sync::Mutex<()>,
}

impl EvmClient {
	pub fn new(
		rpc_url: &str,
		chain_id: u64,
		router: Address,
		signer: PrivateKeySigner,
	) -> Result<Self, ChainError> {
		let url = rpc_url
			.parse()
			.map_err(|e| ChainError::Config(format!("Invalid RPC URL: {}", e)))?;

		let relayer = signer.address();
		let wallet = EthereumWallet::from(signer);
		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect_http(url)
			.erased();

		Ok(Self {
			provider,
			chain_id,
			router,
			relayer,
			nonce_lock: tokio::sync::Mutex::new(()),
		})
	}

	pub fn relayer_address(&self) -> Address {
		self.relayer
	}

	/// Read-only `eth_call` with bounded retries for transient failures.
	async fn read(&self, to: Address, data: Vec<u8>) -> Result<alloy::primitives::Bytes, ChainError> {
		let tx = TransactionRequest::default().with_to(to).with_input(data);

		let mut last = None;
		for attempt in 0..READ_RETRIES {
			match self.provider.call(tx.clone()).await {
				Ok(out) => return Ok(out),
				Err(e) => {
					let mapped = classify(e);
					// Reverts are deterministic; retrying cannot help.
					if matches!(mapped, ChainError::Reverted(_)) {
						return Err(mapped);
					}
					debug!(attempt, error = %mapped, "Read call failed, retrying");
					last = Some(mapped);
					tokio::time::sleep(tokio::time::Duration::from_millis(
						500 * (attempt as u64 + 1),
					))
					.await;
				}
			}
		}
		Err(last.unwrap_or_else(|| ChainError::Rpc("retries exhausted".to_string())))
	}
}

#[async_trait]
impl ChainInterface for EvmClient {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn router(&self) -> Address {
		self.router
	}

	async fn intent_nonce(&self, user: Address) -> Result<U256, ChainError> {
		let data = IRouterHub::noncesCall { user }.abi_encode();
		let out = self.read(self.router, data).await?;
		IRouterHub::noncesCall::abi_decode_returns(&out)
			.map_err(|e| ChainError::Rpc(format!("Malformed nonces() return: {}", e)))
	}

	/// Current ERC-20 allowance from `owner` to the RouterHub.
	async fn router_allowance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
		let data = IERC20::allowanceCall {
			owner,
			spender: self.router,
		}
		.abi_encode();
		let out = self.read(token, data).await?;
		IERC20::allowanceCall::abi_decode_returns(&out)
			.map_err(|e| ChainError::Rpc(format!("Malformed allowance() return: {}", e)))
	}

	/// The entry point's next user-operation nonce for `sender` (key 0).
	async fn user_op_nonce(
		&self,
		entry_point: Address,
		sender: Address,
	) -> Result<U256, ChainError> {
		let data = IEntryPoint::getNonceCall {
			sender,
			key: alloy::primitives::aliases::U192::ZERO,
		}
		.abi_encode();
		let out = self.read(entry_point, data).await?;
		IEntryPoint::getNonceCall::abi_decode_returns(&out)
			.map_err(|e| ChainError::Rpc(format!("Malformed getNonce() return: {}", e)))
	}

	/// Current EIP-1559 fee estimate, for pricing user operations.
	async fn fee_estimate(&self) -> Result<(u128, u128), ChainError> {
		let fees = self
			.provider
			.estimate_eip1559_fees()
			.await
			.map_err(classify)?;
		Ok((fees.max_fee_per_gas, fees.max_priority_fee_per_gas))
	}

	/// Submits a self-funded transaction to the RouterHub and returns
	/// its hash once broadcast (not once mined).
	///
	/// The nonce lock covers fetch-nonce through send, so two concurrent
	/// self-funded submissions cannot race on the relayer's own nonce.
	async fn send_router_transaction(&self, data: Vec<u8>) -> Result<B256, ChainError> {
		let _guard = self.nonce_lock.lock().await;

		let nonce = self
			.provider
			.get_transaction_count(self.relayer)
			.pending()
			.await
			.map_err(classify)?;

		let tx = TransactionRequest::default()
			.with_to(self.router)
			.with_input(data)
			.with_nonce(nonce)
			.with_chain_id(self.chain_id);

		let pending = self.provider.send_transaction(tx).await.map_err(classify)?;
		let tx_hash = *pending.tx_hash();
		info!(tx_hash = %truncate_hash(&tx_hash), nonce, "Broadcast self-funded transaction");

		Ok(tx_hash)
	}

	/// Polls for a receipt until found or the window closes.
	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
		let start = tokio::time::Instant::now();

		loop {
			if start.elapsed() > RECEIPT_TIMEOUT {
				return Err(ChainError::Timeout(format!(
					"no receipt for {} after {}s",
					truncate_hash(&tx_hash),
					RECEIPT_TIMEOUT.as_secs()
				)));
			}

			match self.provider.get_transaction_receipt(tx_hash).await {
				Ok(Some(receipt)) => {
					return Ok(Receipt {
						tx_hash,
						block_number: receipt.block_number.unwrap_or(0),
						success: receipt.status(),
					});
				}
				Ok(None) => {}
				Err(e) => {
					debug!(error = %classify(e), "Receipt query failed, will retry");
				}
			}

			tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
		}
	}
}
