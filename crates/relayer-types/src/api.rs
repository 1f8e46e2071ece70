//! HTTP API request/response types for the relayer.
//!
//! Field names follow the JSON conventions of the wallet/dApp clients
//! (camelCase), matching what `eth_signTypedData_v4` tooling expects.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
	errors::RelayerError,
	execution::{ExecutionResult, StrategyKind},
	router::{PermitData, PERMIT_KIND_EIP2612, PERMIT_KIND_PERMIT2},
};

/// Request body for `POST /prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
	pub user: Address,
	pub token_in: Address,
	pub token_out: Address,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub chain_id: u64,
	/// Unix timestamp; defaults to now + the configured signing window.
	pub deadline: Option<u64>,
}

/// Response body for `POST /prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
	pub success: bool,
	pub op_id: String,
	/// The exact EIP-712 payload the client must sign, in
	/// `{types, domain, primaryType, message}` form.
	pub typed_data: serde_json::Value,
}

/// Bundled approval supplied alongside a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRequest {
	pub kind: PermitKind,
	pub value: U256,
	pub deadline: u64,
	pub signature: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermitKind {
	Eip2612,
	Permit2,
}

impl From<&PermitRequest> for PermitData {
	fn from(req: &PermitRequest) -> Self {
		PermitData {
			kind: match req.kind {
				PermitKind::Eip2612 => PERMIT_KIND_EIP2612,
				PermitKind::Permit2 => PERMIT_KIND_PERMIT2,
			},
			value: req.value,
			deadline: U256::from(req.deadline),
			signature: req.signature.clone(),
		}
	}
}

/// Request body for `POST /submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
	pub op_id: String,
	pub signature: Bytes,
	pub permit: Option<PermitRequest>,
}

/// Request body for `POST /execute`: the single-call variant carrying the
/// full intent and signature, skipping the two-phase flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
	pub user: Address,
	pub token_in: Address,
	pub token_out: Address,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub deadline: u64,
	pub nonce: U256,
	pub chain_id: u64,
	pub signature: Bytes,
	pub permit: Option<PermitRequest>,
}

/// Response body for `POST /submit` and `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<B256>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strategy: Option<StrategyKind>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl ExecutionResponse {
	pub fn ok(result: &ExecutionResult) -> Self {
		Self {
			success: true,
			tx_hash: Some(result.tx_hash),
			strategy: Some(result.strategy),
			error: None,
			message: None,
		}
	}

	pub fn err(error: &RelayerError) -> Self {
		// An on-chain revert still broadcast something; the hash stays
		// visible so the client can inspect the failed transaction.
		let tx_hash = match error {
			RelayerError::ChainRevert { tx_hash, .. } => *tx_hash,
			_ => None,
		};

		Self {
			success: false,
			tx_hash,
			strategy: None,
			error: Some(error.code().to_string()),
			message: Some(error.to_string()),
		}
	}
}

/// Response body for `GET /operations/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
	pub success: bool,
	pub op_id: String,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<B256>,
	pub created_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prepare_request_parses_camel_case() {
		let body = r#"{
			"user": "0x00000000000000000000000000000000000000aa",
			"tokenIn": "0x00000000000000000000000000000000000000bb",
			"tokenOut": "0x00000000000000000000000000000000000000cc",
			"amountIn": "0xf4240",
			"minAmountOut": "0x1",
			"chainId": 11155111
		}"#;

		let req: PrepareRequest = serde_json::from_str(body).unwrap();
		assert_eq!(req.chain_id, 11155111);
		assert_eq!(req.amount_in, U256::from(1_000_000u64));
		assert!(req.deadline.is_none());
	}

	#[test]
	fn test_error_response_carries_stable_code() {
		let resp = ExecutionResponse::err(&RelayerError::InvalidSignature);
		assert!(!resp.success);
		assert_eq!(resp.error.as_deref(), Some("INVALID_SIGNATURE"));
		assert!(resp.tx_hash.is_none());
	}

	#[test]
	fn test_revert_response_keeps_mined_tx_hash() {
		let resp = ExecutionResponse::err(&RelayerError::ChainRevert {
			reason: "slippage exceeded".into(),
			tx_hash: Some(B256::repeat_byte(0x44)),
		});

		assert!(!resp.success);
		assert_eq!(resp.error.as_deref(), Some("CHAIN_REVERT"));
		assert_eq!(resp.tx_hash, Some(B256::repeat_byte(0x44)));
	}

	#[test]
	fn test_permit_request_maps_to_calldata_form() {
		let req = PermitRequest {
			kind: PermitKind::Eip2612,
			value: U256::from(5u64),
			deadline: 1_700_000_000,
			signature: Bytes::from(vec![1, 2, 3]),
		};

		let data = PermitData::from(&req);
		assert_eq!(data.kind, PERMIT_KIND_EIP2612);
		assert_eq!(data.deadline, U256::from(1_700_000_000u64));
	}
}
