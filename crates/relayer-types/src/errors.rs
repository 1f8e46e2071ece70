//! Error taxonomy for the relayer.
//!
//! Every failure surfaced to an API client maps to one of these variants,
//! each with a stable machine-readable code. Raw provider errors never
//! leak past this boundary. Variants are split into terminal failures
//! (the request itself is invalid, never retried on another strategy) and
//! recoverable ones (the path is unavailable, fallback is allowed).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayerError>;

#[derive(Debug, Clone, Error)]
pub enum RelayerError {
	/// Missing or invalid fields in a prepare/submit payload.
	#[error("Malformed request: {0}")]
	MalformedRequest(String),

	/// The signature does not recover to the claimed user.
	#[error("Signature does not recover to the intent user")]
	InvalidSignature,

	/// The intent deadline has passed.
	#[error("Intent expired at {deadline}, now {now}")]
	Expired { deadline: u64, now: u64 },

	/// On-chain nonce does not match the intent nonce. The caller must
	/// re-prepare; retrying the same intent would be a replay.
	#[error("Nonce mismatch: intent has {intent}, chain expects {chain}")]
	NonceMismatch { intent: String, chain: String },

	/// No permit supplied and the router's allowance does not cover the
	/// input amount. Submitting anyway would revert and waste gas.
	#[error("Insufficient allowance: need {needed}, have {available}")]
	InsufficientAllowance { needed: String, available: String },

	/// Paymaster or bundler rejected or timed out. Recoverable: triggers
	/// the self-funded fallback, only surfaced if that fails too.
	#[error("Sponsorship unavailable: {0}")]
	SponsorshipUnavailable(String),

	/// Destination contract reverted; reason decoded best-effort. Carries
	/// the mined transaction hash when the revert happened on chain (as
	/// opposed to being reported by the node at submission time).
	#[error("Chain revert: {reason}")]
	ChainRevert {
		reason: String,
		tx_hash: Option<alloy::primitives::B256>,
	},

	/// Transient network/provider failure, surfaced after retries.
	#[error("RPC unavailable: {0}")]
	RpcUnavailable(String),

	/// Receipt polling window exhausted. Ambiguous: the transaction may
	/// still land, the caller must re-query chain state.
	#[error("Timed out waiting for inclusion: {0}")]
	Timeout(String),

	/// No pending operation with the given id.
	#[error("Unknown operation id: {0}")]
	OperationNotFound(String),

	/// The operation outlived its signing window.
	#[error("Operation {0} expired before submission")]
	OperationExpired(String),

	/// The operation was already submitted or failed; ids are single-use.
	#[error("Operation {0} was already consumed")]
	OperationConsumed(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl RelayerError {
	/// Stable error code included in API responses.
	pub fn code(&self) -> &'static str {
		match self {
			RelayerError::MalformedRequest(_) => "MALFORMED_REQUEST",
			RelayerError::InvalidSignature => "INVALID_SIGNATURE",
			RelayerError::Expired { .. } => "EXPIRED",
			RelayerError::NonceMismatch { .. } => "NONCE_MISMATCH",
			RelayerError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
			RelayerError::SponsorshipUnavailable(_) => "SPONSORSHIP_UNAVAILABLE",
			RelayerError::ChainRevert { .. } => "CHAIN_REVERT",
			RelayerError::RpcUnavailable(_) => "RPC_UNAVAILABLE",
			RelayerError::Timeout(_) => "TIMEOUT",
			RelayerError::OperationNotFound(_) => "OPERATION_NOT_FOUND",
			RelayerError::OperationExpired(_) => "OPERATION_EXPIRED",
			RelayerError::OperationConsumed(_) => "OPERATION_CONSUMED",
			RelayerError::Internal(_) => "INTERNAL",
		}
	}

	/// Whether the sponsored path may fall back to self-funded execution
	/// after this error. Terminal errors indicate the request is invalid,
	/// not that the path is unavailable. `Timeout` is deliberately not
	/// recoverable: the in-flight submission may still land, and a second
	/// broadcast could double-execute the intent.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			RelayerError::SponsorshipUnavailable(_) | RelayerError::RpcUnavailable(_)
		)
	}
}
