//! Execution outcome types.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

/// How a verified intent was (or would be) paid for and submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
	/// ERC-4337 user operation with paymaster sponsorship.
	Sponsored,
	/// Direct transaction from the relayer's own funded account.
	SelfFunded,
}

impl std::fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			StrategyKind::Sponsored => write!(f, "sponsored"),
			StrategyKind::SelfFunded => write!(f, "self_funded"),
		}
	}
}

/// Outcome of attempting on-chain submission of a verified intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
	/// Hash of the broadcast transaction.
	pub tx_hash: B256,
	/// The strategy that produced the transaction.
	pub strategy: StrategyKind,
}
