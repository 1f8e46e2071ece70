//! Relayer engine: orchestrates the prepare/submit/execute flows.
//!
//! Validation order is cheapest-first: request shape and chain binding,
//! then store claim, then deadline, then local signature recovery, then
//! the on-chain nonce pre-check, and only then any transaction. Chain
//! interaction never happens for a request that can be rejected locally.

use alloy::primitives::{Bytes, U256};
use std::sync::Arc;
use tracing::{info, warn};

use relayer_account::AccountService;
use relayer_chain::{ChainError, ChainInterface};
use relayer_store::{Clock, OperationStore, PendingOperation, StoreError};
use relayer_types::{
	ExecuteRequest, ExecutionResult, PermitRequest, PrepareRequest, RelayerError, SwapIntent,
};

pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use strategy::{SponsoredPath, StrategySelector};

use strategy::map_chain;

/// Outcome of `prepare`: the stored operation id and the payload the
/// client must sign.
#[derive(Debug, Clone)]
pub struct PreparedIntent {
	pub op_id: String,
	pub typed_data: serde_json::Value,
}

/// The relayer engine. One instance per process, shared across requests.
pub struct RelayerEngine {
	chain: Arc<dyn ChainInterface>,
	store: Arc<OperationStore>,
	selector: StrategySelector,
	clock: Arc<dyn Clock>,
	/// Default signing window when the client supplies no deadline.
	default_deadline_secs: u64,
}

impl RelayerEngine {
	pub fn new(
		chain: Arc<dyn ChainInterface>,
		account: Arc<AccountService>,
		store: Arc<OperationStore>,
		sponsored: Option<SponsoredPath>,
		clock: Arc<dyn Clock>,
		default_deadline_secs: u64,
	) -> Self {
		Self {
			selector: StrategySelector::new(chain.clone(), account, sponsored),
			chain,
			store,
			clock,
			default_deadline_secs,
		}
	}

	pub fn store(&self) -> &Arc<OperationStore> {
		&self.store
	}

	/// Builds an unsigned intent plus its typed-data payload and parks
	/// it in the store under a fresh operation id.
	pub async fn prepare(&self, req: PrepareRequest) -> Result<PreparedIntent, RelayerError> {
		// Fail fast before building typed data for the wrong network.
		if req.chain_id != self.chain.chain_id() {
			return Err(RelayerError::MalformedRequest(format!(
				"chainId {} does not match the connected network {}",
				req.chain_id,
				self.chain.chain_id()
			)));
		}

		if req.amount_in.is_zero() {
			return Err(RelayerError::MalformedRequest(
				"amountIn must be positive".to_string(),
			));
		}

		let now = self.clock.now();
		let deadline = req.deadline.unwrap_or(now + self.default_deadline_secs);
		if deadline <= now {
			return Err(RelayerError::MalformedRequest(
				"deadline is already in the past".to_string(),
			));
		}

		let nonce = self
			.chain
			.intent_nonce(req.user)
			.await
			.map_err(map_chain)?;

		let intent = SwapIntent {
			user: req.user,
			tokenIn: req.token_in,
			tokenOut: req.token_out,
			amountIn: req.amount_in,
			minAmountOut: req.min_amount_out,
			deadline: U256::from(deadline),
			nonce,
		};

		let typed_data = serde_json::to_value(relayer_intent::build_typed_data(
			&intent,
			self.chain.chain_id(),
			self.chain.router(),
		))
		.map_err(|e| RelayerError::Internal(format!("typed data serialization: {}", e)))?;

		let op_id = self.store.create(intent, typed_data.clone());
		info!(%op_id, user = %req.user, "Prepared intent");

		Ok(PreparedIntent { op_id, typed_data })
	}

	/// Claims the prepared operation and executes it with the supplied
	/// signature. At most one submit per operation id ever reaches the
	/// chain; losers of the claim race get a definitive error.
	pub async fn submit(
		&self,
		op_id: &str,
		signature: &Bytes,
		permit: Option<&PermitRequest>,
	) -> Result<ExecutionResult, RelayerError> {
		let op = self.claim(op_id)?;

		match self.run_verified(&op.intent, signature, permit).await {
			Ok(result) => {
				self.store.mark_submitted(op_id, result.tx_hash);
				self.watch_confirmation(op_id.to_string(), result.tx_hash);
				Ok(result)
			}
			Err(e) => {
				// Pure RPC outages leave nothing on chain, so the claim
				// rolls back and the client may retry the same op id.
				// Everything else (including Timeout, where a broadcast
				// may have happened) is terminal for this operation.
				if matches!(e, RelayerError::RpcUnavailable(_)) {
					self.store.release(op_id);
				} else {
					// A mined-but-reverted transaction still has a hash
					// worth keeping on the operation record.
					if let RelayerError::ChainRevert {
						tx_hash: Some(hash), ..
					} = &e
					{
						self.store.mark_submitted(op_id, *hash);
					}
					self.store.mark_failed(op_id, e.code());
				}
				Err(e)
			}
		}
	}

	/// Single-call variant: the client already holds both intent and
	/// signature, so the store is bypassed entirely.
	pub async fn execute(&self, req: ExecuteRequest) -> Result<ExecutionResult, RelayerError> {
		if req.chain_id != self.chain.chain_id() {
			return Err(RelayerError::MalformedRequest(format!(
				"chainId {} does not match the connected network {}",
				req.chain_id,
				self.chain.chain_id()
			)));
		}

		let intent = SwapIntent {
			user: req.user,
			tokenIn: req.token_in,
			tokenOut: req.token_out,
			amountIn: req.amount_in,
			minAmountOut: req.min_amount_out,
			deadline: U256::from(req.deadline),
			nonce: req.nonce,
		};

		self.run_verified(&intent, &req.signature, req.permit.as_ref())
			.await
	}

	/// Looks up an operation for the status endpoint.
	pub fn operation(&self, op_id: &str) -> Result<PendingOperation, RelayerError> {
		self.store.get(op_id).map_err(|e| match e {
			StoreError::NotFound => RelayerError::OperationNotFound(op_id.to_string()),
			StoreError::Expired => RelayerError::OperationExpired(op_id.to_string()),
			StoreError::Consumed => RelayerError::OperationConsumed(op_id.to_string()),
		})
	}

	fn claim(&self, op_id: &str) -> Result<PendingOperation, RelayerError> {
		self.store.begin_submit(op_id).map_err(|e| match e {
			StoreError::NotFound => RelayerError::OperationNotFound(op_id.to_string()),
			StoreError::Expired => RelayerError::OperationExpired(op_id.to_string()),
			StoreError::Consumed => RelayerError::OperationConsumed(op_id.to_string()),
		})
	}

	/// Shared verification pipeline plus strategy dispatch.
	async fn run_verified(
		&self,
		intent: &SwapIntent,
		signature: &Bytes,
		permit: Option<&PermitRequest>,
	) -> Result<ExecutionResult, RelayerError> {
		let now = self.clock.now();
		if intent.is_expired(now) {
			return Err(RelayerError::Expired {
				deadline: u64::try_from(intent.deadline).unwrap_or(u64::MAX),
				now,
			});
		}

		relayer_intent::verify(intent, self.chain.chain_id(), self.chain.router(), signature)
			.map_err(|e| {
				// The detail (recovered address etc.) is useful in logs
				// but is not for the caller.
				warn!(user = %intent.user, reason = %e, "Rejected signature");
				RelayerError::InvalidSignature
			})?;

		// Pre-check the contract nonce to fail fast instead of burning
		// gas on a transaction the RouterHub must reject.
		let chain_nonce = self
			.chain
			.intent_nonce(intent.user)
			.await
			.map_err(map_chain)?;
		if chain_nonce != intent.nonce {
			return Err(RelayerError::NonceMismatch {
				intent: intent.nonce.to_string(),
				chain: chain_nonce.to_string(),
			});
		}

		self.selector.execute(intent, signature, permit).await
	}

	/// Tracks a broadcast transaction in the background and records its
	/// final status. A polling timeout leaves the operation `Submitted`;
	/// the client can keep polling the chain with the returned hash.
	fn watch_confirmation(&self, op_id: String, tx_hash: alloy::primitives::B256) {
		let chain = self.chain.clone();
		let store = self.store.clone();

		tokio::spawn(async move {
			match chain.wait_for_receipt(tx_hash).await {
				Ok(receipt) if receipt.success => {
					info!(%op_id, block = receipt.block_number, "Intent confirmed on chain");
					store.mark_confirmed(&op_id);
				}
				Ok(_) => {
					warn!(%op_id, "Intent transaction reverted on chain");
					store.mark_failed(&op_id, "CHAIN_REVERT");
				}
				Err(ChainError::Timeout(msg)) => {
					warn!(%op_id, %msg, "Gave up polling for receipt");
				}
				Err(e) => {
					warn!(%op_id, error = %e, "Receipt polling failed");
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{FakeChain, TEST_KEY};
	use alloy::primitives::Address;
	use alloy::signers::{local::PrivateKeySigner, SignerSync};
	use relayer_account::{AccountService, LocalWallet};
	use relayer_store::{OperationStatus, SystemClock};
	use relayer_types::SubmitRequest;
	use std::sync::atomic::Ordering;
	use std::time::Duration;

	const CHAIN_ID: u64 = 11155111;

	fn engine_with(chain: Arc<FakeChain>) -> RelayerEngine {
		let account = Arc::new(AccountService::new(Box::new(
			LocalWallet::new(TEST_KEY).unwrap(),
		)));
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let store = Arc::new(OperationStore::new(clock.clone(), Duration::from_secs(600)));

		RelayerEngine::new(chain, account, store, None, clock, 600)
	}

	fn prepare_request(chain_id: u64) -> PrepareRequest {
		PrepareRequest {
			user: Address::repeat_byte(0xaa),
			token_in: Address::repeat_byte(0x01),
			token_out: Address::repeat_byte(0x02),
			amount_in: U256::from(1_000_000u64),
			min_amount_out: U256::from(1u64),
			chain_id,
			deadline: None,
		}
	}

	/// An intent over the fake chain's domain, signed by its own user.
	fn signed_intent(chain: &FakeChain, nonce: U256) -> (SwapIntent, Bytes) {
		let signer = PrivateKeySigner::random();
		let intent = SwapIntent {
			user: signer.address(),
			tokenIn: Address::repeat_byte(0x01),
			tokenOut: Address::repeat_byte(0x02),
			amountIn: U256::from(1_000_000u64),
			minAmountOut: U256::from(1u64),
			deadline: U256::from(4_000_000_000u64),
			nonce,
		};

		let digest = relayer_intent::signing_hash(&intent, chain.chain_id, chain.router);
		let sig = signer.sign_hash_sync(&digest).unwrap();
		(intent, Bytes::from(sig.as_bytes().to_vec()))
	}

	fn execute_request(intent: &SwapIntent, signature: &Bytes, chain_id: u64) -> ExecuteRequest {
		ExecuteRequest {
			user: intent.user,
			token_in: intent.tokenIn,
			token_out: intent.tokenOut,
			amount_in: intent.amountIn,
			min_amount_out: intent.minAmountOut,
			deadline: u64::try_from(intent.deadline).unwrap(),
			nonce: intent.nonce,
			chain_id,
			signature: signature.clone(),
			permit: None,
		}
	}

	#[tokio::test]
	async fn test_prepare_rejects_wrong_chain_before_any_rpc() {
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.rpc_down = true;
		let engine = engine_with(Arc::new(fake));

		let err = engine.prepare(prepare_request(1)).await.unwrap_err();
		assert_eq!(err.code(), "MALFORMED_REQUEST");
	}

	#[tokio::test]
	async fn test_prepare_rejects_zero_amount() {
		let engine = engine_with(Arc::new(FakeChain::new(CHAIN_ID)));
		let mut req = prepare_request(CHAIN_ID);
		req.amount_in = U256::ZERO;
		let err = engine.prepare(req).await.unwrap_err();
		assert_eq!(err.code(), "MALFORMED_REQUEST");
	}

	#[tokio::test]
	async fn test_prepare_rejects_past_deadline() {
		let engine = engine_with(Arc::new(FakeChain::new(CHAIN_ID)));
		let mut req = prepare_request(CHAIN_ID);
		req.deadline = Some(1);
		let err = engine.prepare(req).await.unwrap_err();
		assert_eq!(err.code(), "MALFORMED_REQUEST");
	}

	#[tokio::test]
	async fn test_prepare_assigns_chain_nonce() {
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.nonce = U256::from(7u64);
		let engine = engine_with(Arc::new(fake));

		let prepared = engine.prepare(prepare_request(CHAIN_ID)).await.unwrap();
		let op = engine.operation(&prepared.op_id).unwrap();
		assert_eq!(op.intent.nonce, U256::from(7u64));
		assert!(prepared.typed_data["message"]["nonce"].is_string());
	}

	#[tokio::test]
	async fn test_submit_unknown_operation() {
		let engine = engine_with(Arc::new(FakeChain::new(CHAIN_ID)));
		let err = engine
			.submit("no-such-op", &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap_err();
		assert_eq!(err.code(), "OPERATION_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_execute_rejects_expired_intent_without_rpc() {
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.rpc_down = true;
		let chain = Arc::new(fake);
		let engine = engine_with(chain.clone());

		let (mut intent, sig) = signed_intent(&chain, U256::ZERO);
		intent.deadline = U256::from(1u64);
		let mut req = execute_request(&intent, &sig, CHAIN_ID);
		req.deadline = 1;

		let err = engine.execute(req).await.unwrap_err();
		assert_eq!(err.code(), "EXPIRED");
	}

	#[tokio::test]
	async fn test_execute_rejects_garbage_signature_without_rpc() {
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.rpc_down = true;
		let chain = Arc::new(fake);
		let engine = engine_with(chain.clone());

		let (intent, _) = signed_intent(&chain, U256::ZERO);
		let req = execute_request(&intent, &Bytes::from(vec![0u8; 65]), CHAIN_ID);

		let err = engine.execute(req).await.unwrap_err();
		assert_eq!(err.code(), "INVALID_SIGNATURE");
	}

	#[tokio::test]
	async fn test_execute_happy_path_broadcasts_once() {
		let chain = Arc::new(FakeChain::new(CHAIN_ID));
		let engine = engine_with(chain.clone());

		let (intent, sig) = signed_intent(&chain, U256::ZERO);
		let result = engine
			.execute(execute_request(&intent, &sig, CHAIN_ID))
			.await
			.unwrap();

		assert_eq!(result.strategy, relayer_types::StrategyKind::SelfFunded);
		assert_eq!(chain.sends.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_replayed_intent_fails_nonce_precheck() {
		// The contract nonce has advanced past the signed intent, so the
		// replay is rejected before anything reaches the chain.
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.nonce = U256::from(1u64);
		let chain = Arc::new(fake);
		let engine = engine_with(chain.clone());

		let (intent, sig) = signed_intent(&chain, U256::ZERO);
		let err = engine
			.execute(execute_request(&intent, &sig, CHAIN_ID))
			.await
			.unwrap_err();

		assert_eq!(err.code(), "NONCE_MISMATCH");
		assert_eq!(chain.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_concurrent_submits_broadcast_exactly_once() {
		let chain = Arc::new(FakeChain::new(CHAIN_ID));
		let engine = Arc::new(engine_with(chain.clone()));

		let (intent, sig) = signed_intent(&chain, U256::ZERO);
		let op_id = engine.store().create(intent, serde_json::json!({}));

		let mut handles = Vec::new();
		for _ in 0..4 {
			let engine = engine.clone();
			let op_id = op_id.clone();
			let sig = sig.clone();
			handles.push(tokio::spawn(
				async move { engine.submit(&op_id, &sig, None).await },
			));
		}

		let mut oks = 0;
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				oks += 1;
			}
		}

		assert_eq!(oks, 1);
		assert_eq!(chain.sends.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_submit_consumes_claim_even_on_failure() {
		// A failed submission marks the operation failed; the id can
		// never be replayed with a corrected signature.
		let chain = Arc::new(FakeChain::new(CHAIN_ID));
		let engine = engine_with(chain.clone());

		let (intent, _) = signed_intent(&chain, U256::ZERO);
		let op_id = engine.store().create(intent, serde_json::json!({}));

		let first = engine
			.submit(&op_id, &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap_err();
		assert_eq!(first.code(), "INVALID_SIGNATURE");

		let second = engine
			.submit(&op_id, &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap_err();
		assert_eq!(second.code(), "OPERATION_CONSUMED");
	}

	#[tokio::test]
	async fn test_rpc_outage_releases_claim_for_retry() {
		let mut fake = FakeChain::new(CHAIN_ID);
		fake.rpc_down = true;
		let chain = Arc::new(fake);
		let engine = engine_with(chain.clone());

		let (intent, sig) = signed_intent(&chain, U256::ZERO);
		let op_id = engine.store().create(intent, serde_json::json!({}));

		let first = engine.submit(&op_id, &sig, None).await.unwrap_err();
		assert_eq!(first.code(), "RPC_UNAVAILABLE");

		// Nothing was broadcast, so the claim rolled back: a retry hits
		// the outage again instead of OPERATION_CONSUMED.
		let second = engine.submit(&op_id, &sig, None).await.unwrap_err();
		assert_eq!(second.code(), "RPC_UNAVAILABLE");
		assert_eq!(
			engine.operation(&op_id).unwrap().status,
			OperationStatus::AwaitingSignature
		);
	}

	#[test]
	fn test_submit_request_shape() {
		let body = r#"{"opId":"abc","signature":"0x00"}"#;
		let req: SubmitRequest = serde_json::from_str(body).unwrap();
		assert_eq!(req.op_id, "abc");
		assert!(req.permit.is_none());
	}
}
