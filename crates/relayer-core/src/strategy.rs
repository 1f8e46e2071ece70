//! Execution strategy selection.
//!
//! Per submission: attempt the sponsored (paymaster-backed) path when a
//! bundler is configured, fall back to the self-funded path on
//! recoverable failures, and never retry terminal ones. The self-funded
//! path itself picks the cheapest-for-the-user approval mechanism:
//! a bundled permit when supplied, otherwise a pre-existing allowance.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;
use tracing::{info, warn};

use relayer_account::AccountService;
use relayer_chain::{BundlerClient, ChainError, ChainInterface};
use relayer_types::{
	user_op_hash, ExecutionResult, IRouterHub, ISmartAccount, PermitData, PermitRequest,
	RelayerError, StrategyKind, SwapIntent, UserOperation,
};

/// Maps chain-client errors into the relayer taxonomy for the
/// self-funded path.
pub(crate) fn map_chain(e: ChainError) -> RelayerError {
	match e {
		ChainError::Rpc(msg) => RelayerError::RpcUnavailable(msg),
		ChainError::Reverted(reason) => RelayerError::ChainRevert {
			reason,
			tx_hash: None,
		},
		ChainError::Timeout(msg) => RelayerError::Timeout(msg),
		ChainError::Config(msg) => RelayerError::Internal(msg),
	}
}

/// Encodes the RouterHub execute call, with or without a bundled permit.
pub(crate) fn router_calldata(
	intent: &SwapIntent,
	signature: &Bytes,
	permit: Option<&PermitRequest>,
) -> Vec<u8> {
	match permit {
		Some(p) => IRouterHub::executeIntentWithPermitCall {
			intent: intent.clone(),
			signature: signature.clone(),
			permit: PermitData::from(p),
		}
		.abi_encode(),
		None => IRouterHub::executeIntentCall {
			intent: intent.clone(),
			signature: signature.clone(),
		}
		.abi_encode(),
	}
}

/// Sponsored-path wiring: the bundler endpoint plus the smart account
/// that fronts the relayer inside user operations.
pub struct SponsoredPath {
	pub bundler: Arc<BundlerClient>,
	pub smart_account: Address,
}

/// Chooses and drives the execution path for a verified intent.
pub struct StrategySelector {
	chain: Arc<dyn ChainInterface>,
	account: Arc<AccountService>,
	sponsored: Option<SponsoredPath>,
}

impl StrategySelector {
	pub fn new(
		chain: Arc<dyn ChainInterface>,
		account: Arc<AccountService>,
		sponsored: Option<SponsoredPath>,
	) -> Self {
		Self {
			chain,
			account,
			sponsored,
		}
	}

	/// Runs the strategy state machine: Sponsored, then self-funded
	/// fallback on recoverable failure, then terminal.
	pub async fn execute(
		&self,
		intent: &SwapIntent,
		signature: &Bytes,
		permit: Option<&PermitRequest>,
	) -> Result<ExecutionResult, RelayerError> {
		if let Some(sponsored) = &self.sponsored {
			match self.try_sponsored(sponsored, intent, signature, permit).await {
				Ok(result) => return Ok(result),
				Err(e) if e.is_recoverable() => {
					warn!(error = %e, "Sponsored path failed, falling back to self-funded");
				}
				Err(e) => return Err(e),
			}
		}

		self.try_self_funded(intent, signature, permit).await
	}

	/// Sponsored path: wrap the router call in a user operation, get it
	/// sponsored, sign it, hand it to the bundler, and wait.
	///
	/// Failures before `eth_sendUserOperation` surface as
	/// `SponsorshipUnavailable` so the selector can fall back; once the
	/// operation is broadcast, a polling timeout stays a `Timeout`.
	async fn try_sponsored(
		&self,
		sponsored: &SponsoredPath,
		intent: &SwapIntent,
		signature: &Bytes,
		permit: Option<&PermitRequest>,
	) -> Result<ExecutionResult, RelayerError> {
		let bundler = &sponsored.bundler;
		let entry_point = bundler.entry_point();

		let unavailable = |e: ChainError| RelayerError::SponsorshipUnavailable(e.to_string());

		let call_data = ISmartAccount::executeCall {
			target: self.chain.router(),
			value: U256::ZERO,
			data: Bytes::from(router_calldata(intent, signature, permit)),
		}
		.abi_encode();

		let nonce = self
			.chain
			.user_op_nonce(entry_point, sponsored.smart_account)
			.await
			.map_err(unavailable)?;
		let (max_fee, max_priority) = self.chain.fee_estimate().await.map_err(unavailable)?;

		let mut op = UserOperation {
			sender: sponsored.smart_account,
			nonce,
			call_data: Bytes::from(call_data),
			max_fee_per_gas: U256::from(max_fee),
			max_priority_fee_per_gas: U256::from(max_priority),
			..Default::default()
		};

		let gas = bundler
			.estimate_user_operation_gas(&op)
			.await
			.map_err(unavailable)?;
		op.call_gas_limit = gas.call_gas_limit;
		op.verification_gas_limit = gas.verification_gas_limit;
		op.pre_verification_gas = gas.pre_verification_gas;

		let sponsorship = bundler
			.sponsor_user_operation(&op)
			.await
			.map_err(unavailable)?;
		op.paymaster_and_data = sponsorship.paymaster_and_data;

		let digest = user_op_hash(&op, entry_point, self.chain.chain_id());
		let op_signature = self
			.account
			.sign_digest(&digest)
			.await
			.map_err(|e| RelayerError::Internal(e.to_string()))?;
		op.signature = Bytes::from(op_signature);

		let op_hash = bundler.send_user_operation(&op).await.map_err(unavailable)?;

		// Broadcast happened; from here a timeout must not trigger a
		// second submission on the fallback path.
		let receipt = bundler
			.wait_for_user_operation_receipt(op_hash)
			.await
			.map_err(map_chain)?;

		if !receipt.success {
			// The op mined but reverted: surface the hash so the client
			// (and the operation record) can point at the transaction.
			return Err(RelayerError::ChainRevert {
				reason: "user operation executed but reverted".to_string(),
				tx_hash: Some(receipt.receipt.transaction_hash),
			});
		}

		info!(tx_hash = %receipt.receipt.transaction_hash, "Sponsored execution confirmed");
		Ok(ExecutionResult {
			tx_hash: receipt.receipt.transaction_hash,
			strategy: StrategyKind::Sponsored,
		})
	}

	/// Self-funded path: a direct transaction from the relayer's own
	/// account. Prefers a bundled permit (saves the user an approval
	/// transaction); without one, pre-checks the existing allowance to
	/// avoid broadcasting a transaction that must revert.
	async fn try_self_funded(
		&self,
		intent: &SwapIntent,
		signature: &Bytes,
		permit: Option<&PermitRequest>,
	) -> Result<ExecutionResult, RelayerError> {
		if permit.is_none() {
			let allowance = self
				.chain
				.router_allowance(intent.tokenIn, intent.user)
				.await
				.map_err(map_chain)?;

			if allowance < intent.amountIn {
				return Err(RelayerError::InsufficientAllowance {
					needed: intent.amountIn.to_string(),
					available: allowance.to_string(),
				});
			}
		}

		let tx_hash = self
			.chain
			.send_router_transaction(router_calldata(intent, signature, permit))
			.await
			.map_err(map_chain)?;

		Ok(ExecutionResult {
			tx_hash,
			strategy: StrategyKind::SelfFunded,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{scripted_endpoint, FakeChain, TEST_KEY};
	use relayer_account::{AccountService, LocalWallet};
	use relayer_types::PermitKind;
	use std::sync::atomic::Ordering;

	fn intent() -> SwapIntent {
		SwapIntent {
			user: Address::repeat_byte(0xaa),
			tokenIn: Address::repeat_byte(0x01),
			tokenOut: Address::repeat_byte(0x02),
			amountIn: U256::from(1_000_000u64),
			minAmountOut: U256::from(1u64),
			deadline: U256::from(2_000_000_000u64),
			nonce: U256::ZERO,
		}
	}

	fn account() -> Arc<AccountService> {
		Arc::new(AccountService::new(Box::new(LocalWallet::new(TEST_KEY).unwrap())))
	}

	fn sponsored_path(bundler_url: &str) -> SponsoredPath {
		SponsoredPath {
			bundler: Arc::new(BundlerClient::new(bundler_url, Address::repeat_byte(0x22))),
			smart_account: Address::repeat_byte(0x33),
		}
	}

	#[tokio::test]
	async fn test_unreachable_bundler_falls_back_to_self_funded() {
		// Sponsored path dies before anything is broadcast, so the
		// selector must complete the intent on the self-funded path.
		let chain = Arc::new(FakeChain::new(11155111));
		let selector = StrategySelector::new(
			chain.clone(),
			account(),
			Some(sponsored_path("http://127.0.0.1:1")),
		);

		let result = selector
			.execute(&intent(), &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap();

		assert_eq!(result.strategy, StrategyKind::SelfFunded);
		assert_eq!(chain.sends.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_mined_revert_is_terminal_and_keeps_tx_hash() {
		// The bundler accepts and mines the op, but it reverts on chain.
		// That failure must carry the mined hash and must NOT trigger a
		// self-funded second submission.
		let gas = r#"{"jsonrpc":"2.0","id":1,"result":{"callGasLimit":"0x186a0","verificationGasLimit":"0x30d40","preVerificationGas":"0x5208"}}"#;
		let sponsorship = r#"{"jsonrpc":"2.0","id":2,"result":{"paymasterAndData":"0x1234"}}"#;
		let sent = r#"{"jsonrpc":"2.0","id":3,"result":"0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}"#;
		let reverted = r#"{"jsonrpc":"2.0","id":4,"result":{"success":false,"receipt":{"transactionHash":"0x3333333333333333333333333333333333333333333333333333333333333333"}}}"#;
		let url = scripted_endpoint(vec![
			gas.to_string(),
			sponsorship.to_string(),
			sent.to_string(),
			reverted.to_string(),
		])
		.await;

		let chain = Arc::new(FakeChain::new(11155111));
		let selector =
			StrategySelector::new(chain.clone(), account(), Some(sponsored_path(&url)));

		let err = selector
			.execute(&intent(), &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap_err();

		match err {
			RelayerError::ChainRevert { tx_hash, .. } => {
				assert_eq!(tx_hash, Some(alloy::primitives::B256::repeat_byte(0x33)));
			}
			other => panic!("expected ChainRevert, got {:?}", other),
		}
		assert_eq!(chain.sends.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_missing_allowance_rejected_without_broadcast() {
		let mut fake = FakeChain::new(11155111);
		fake.allowance = U256::ZERO;
		let chain = Arc::new(fake);
		let selector = StrategySelector::new(chain.clone(), account(), None);

		let err = selector
			.execute(&intent(), &Bytes::from(vec![0u8; 65]), None)
			.await
			.unwrap_err();

		assert_eq!(err.code(), "INSUFFICIENT_ALLOWANCE");
		assert_eq!(chain.sends.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_calldata_selector_without_permit() {
		let data = router_calldata(&intent(), &Bytes::from(vec![0u8; 65]), None);
		assert_eq!(data[..4], IRouterHub::executeIntentCall::SELECTOR);
	}

	#[test]
	fn test_calldata_selector_with_permit() {
		let permit = PermitRequest {
			kind: PermitKind::Eip2612,
			value: U256::from(1_000_000u64),
			deadline: 2_000_000_000,
			signature: Bytes::from(vec![0u8; 65]),
		};
		let data = router_calldata(&intent(), &Bytes::from(vec![0u8; 65]), Some(&permit));
		assert_eq!(data[..4], IRouterHub::executeIntentWithPermitCall::SELECTOR);
	}

	#[test]
	fn test_chain_error_mapping() {
		assert!(matches!(
			map_chain(ChainError::Rpc("down".into())),
			RelayerError::RpcUnavailable(_)
		));
		assert!(matches!(
			map_chain(ChainError::Reverted("slippage".into())),
			RelayerError::ChainRevert { tx_hash: None, .. }
		));
		assert!(matches!(
			map_chain(ChainError::Timeout("window".into())),
			RelayerError::Timeout(_)
		));
	}
}
