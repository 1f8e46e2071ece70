//! RouterHub contract schema.
//!
//! The `sol!` definitions below are the single source of truth for the
//! intent structure. The EIP-712 typed-data builder, the signature
//! verifier, and the execute calldata encoding all consume the same
//! `SwapIntent` definition, so a field added or reordered here propagates
//! everywhere at once. Any drift from the deployed RouterHub verifier
//! invalidates every user signature, silently.

use alloy::{primitives::U256, sol};

sol! {
	/// A user's signed declaration of a desired token swap.
	///
	/// Field order and types must match the RouterHub's on-chain
	/// verifier exactly. The target chain binds the signature through
	/// the EIP-712 domain separator, not a struct field.
	#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
	struct SwapIntent {
		address user;
		address tokenIn;
		address tokenOut;
		uint256 amountIn;
		uint256 minAmountOut;
		uint256 deadline;
		uint256 nonce;
	}

	/// Bundled token-approval payload for the self-funded path.
	///
	/// `kind` selects the approval mechanism: 1 = EIP-2612 permit,
	/// 2 = Permit2 signature transfer.
	#[derive(Default, serde::Serialize, serde::Deserialize)]
	struct PermitData {
		uint8 kind;
		uint256 value;
		uint256 deadline;
		bytes signature;
	}

	interface IRouterHub {
		function nonces(address user) external view returns (uint256);
		function executeIntent(SwapIntent calldata intent, bytes calldata signature) external;
		function executeIntentWithPermit(
			SwapIntent calldata intent,
			bytes calldata signature,
			PermitData calldata permit
		) external;
	}

	interface IERC20 {
		function allowance(address owner, address spender) external view returns (uint256);
		function balanceOf(address account) external view returns (uint256);
	}

	/// Minimal execute entry point of the relayer's smart account,
	/// used to wrap RouterHub calls inside a user operation.
	interface ISmartAccount {
		function execute(address target, uint256 value, bytes calldata data) external;
	}

	interface IEntryPoint {
		function getNonce(address sender, uint192 key) external view returns (uint256);
	}
}

/// Permit mechanism discriminants carried in [`PermitData::kind`].
pub const PERMIT_KIND_EIP2612: u8 = 1;
pub const PERMIT_KIND_PERMIT2: u8 = 2;

impl SwapIntent {
	/// Whether the intent's deadline has passed at the given timestamp.
	pub fn is_expired(&self, now: u64) -> bool {
		self.deadline < U256::from(now)
	}
}
