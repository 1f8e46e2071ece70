//! ERC-4337 bundler RPC client.
//!
//! The sponsored execution path talks JSON-RPC to a bundler endpoint
//! (and, through the same endpoint, to a paymaster sponsorship method).
//! Bundler inclusion is asynchronous and not guaranteed within any fixed
//! number of blocks, so receipt polling is strictly bounded.

use alloy::primitives::{Address, Bytes, B256};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use relayer_types::{UserOperation, UserOperationGasEstimate};

use crate::ChainError;

/// Poll attempts for a user operation receipt.
const USEROP_POLL_ATTEMPTS: u32 = 20;
/// Delay between polls.
const USEROP_POLL_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(3);

#[derive(Serialize)]
struct RpcRequest<'a> {
	jsonrpc: &'static str,
	id: u64,
	method: &'a str,
	params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
	code: i64,
	message: String,
}

/// Result of `pm_sponsorUserOperation`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipData {
	pub paymaster_and_data: Bytes,
}

/// Result of `eth_getUserOperationReceipt` once the op is included.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
	pub success: bool,
	pub receipt: InnerReceipt,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerReceipt {
	pub transaction_hash: B256,
}

/// JSON-RPC client for one bundler endpoint and entry point.
pub struct BundlerClient {
	http: reqwest::Client,
	url: String,
	entry_point: Address,
	next_id: AtomicU64,
}

impl BundlerClient {
	pub fn new(url: &str, entry_point: Address) -> Self {
		Self {
			http: reqwest::Client::new(),
			url: url.to_string(),
			entry_point,
			next_id: AtomicU64::new(1),
		}
	}

	pub fn entry_point(&self) -> Address {
		self.entry_point
	}

	async fn rpc<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<Option<T>, ChainError> {
		let request = RpcRequest {
			jsonrpc: "2.0",
			id: self.next_id.fetch_add(1, Ordering::Relaxed),
			method,
			params,
		};

		let response = self
			.http
			.post(&self.url)
			.json(&request)
			.send()
			.await
			.map_err(|e| ChainError::Rpc(format!("Bundler unreachable: {}", e)))?;

		let body: RpcResponse<T> = response
			.json()
			.await
			.map_err(|e| ChainError::Rpc(format!("Malformed bundler response: {}", e)))?;

		if let Some(err) = body.error {
			return Err(ChainError::Reverted(format!(
				"{} rejected ({}): {}",
				method, err.code, err.message
			)));
		}

		Ok(body.result)
	}

	/// Asks the paymaster to sponsor the operation, returning the
	/// `paymasterAndData` blob to splice into it.
	pub async fn sponsor_user_operation(
		&self,
		op: &UserOperation,
	) -> Result<SponsorshipData, ChainError> {
		self.rpc(
			"pm_sponsorUserOperation",
			serde_json::json!([op, self.entry_point]),
		)
		.await?
		.ok_or_else(|| ChainError::Rpc("Empty sponsorship result".to_string()))
	}

	pub async fn estimate_user_operation_gas(
		&self,
		op: &UserOperation,
	) -> Result<UserOperationGasEstimate, ChainError> {
		self.rpc(
			"eth_estimateUserOperationGas",
			serde_json::json!([op, self.entry_point]),
		)
		.await?
		.ok_or_else(|| ChainError::Rpc("Empty gas estimate result".to_string()))
	}

	/// Submits the signed operation, returning its userOpHash.
	pub async fn send_user_operation(&self, op: &UserOperation) -> Result<B256, ChainError> {
		let hash: B256 = self
			.rpc(
				"eth_sendUserOperation",
				serde_json::json!([op, self.entry_point]),
			)
			.await?
			.ok_or_else(|| ChainError::Rpc("Empty send result".to_string()))?;

		info!(user_op_hash = %hash, "Submitted user operation to bundler");
		Ok(hash)
	}

	/// Polls for the operation's receipt, bounded to
	/// [`USEROP_POLL_ATTEMPTS`] attempts. A `null` result means the
	/// bundler has not included it yet.
	///
	/// The operation is already broadcast when this runs, so a transient
	/// transport failure mid-poll counts as an attempt and the loop keeps
	/// going; surfacing it as an `Rpc` error would read as recoverable
	/// upstream and invite a second submission. The only errors that
	/// escape are `Reverted` and `Timeout`.
	pub async fn wait_for_user_operation_receipt(
		&self,
		user_op_hash: B256,
	) -> Result<UserOperationReceipt, ChainError> {
		for attempt in 0..USEROP_POLL_ATTEMPTS {
			match self
				.rpc::<UserOperationReceipt>(
					"eth_getUserOperationReceipt",
					serde_json::json!([user_op_hash]),
				)
				.await
			{
				Ok(Some(receipt)) => return Ok(receipt),
				Ok(None) => {
					debug!(attempt, %user_op_hash, "User operation not yet included");
				}
				Err(e @ ChainError::Reverted(_)) => return Err(e),
				Err(e) => {
					debug!(attempt, error = %e, "Receipt poll failed, will retry");
				}
			}

			tokio::time::sleep(USEROP_POLL_INTERVAL).await;
		}

		Err(ChainError::Timeout(format!(
			"user operation {} not included after {} attempts",
			user_op_hash, USEROP_POLL_ATTEMPTS
		)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	/// Serves one canned HTTP response body per incoming connection, in
	/// order, then stops accepting.
	async fn scripted_endpoint(bodies: Vec<String>) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		tokio::spawn(async move {
			for body in bodies {
				let Ok((mut socket, _)) = listener.accept().await else {
					return;
				};
				let mut buf = [0u8; 4096];
				let _ = socket.read(&mut buf).await;
				let response = format!(
					"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
					body.len(),
					body
				);
				let _ = socket.write_all(response.as_bytes()).await;
			}
		});

		format!("http://{}", addr)
	}

	#[tokio::test]
	async fn test_receipt_polling_survives_transient_poll_failure() {
		// First poll gets a mangled response (transport-level failure at
		// the client); the second gets the real receipt. The poll loop
		// must absorb the first and succeed, not surface a recoverable
		// error for an operation that is already broadcast.
		let receipt = r#"{"jsonrpc":"2.0","id":2,"result":{"success":true,"receipt":{"transactionHash":"0x2222222222222222222222222222222222222222222222222222222222222222"}}}"#;
		let url = scripted_endpoint(vec![
			"this is not json".to_string(),
			receipt.to_string(),
		])
		.await;

		let client = BundlerClient::new(&url, Address::repeat_byte(0x22));
		let result = client
			.wait_for_user_operation_receipt(B256::repeat_byte(0xaa))
			.await
			.unwrap();

		assert!(result.success);
		assert_eq!(result.receipt.transaction_hash, B256::repeat_byte(0x22));
	}

	#[tokio::test]
	async fn test_receipt_polling_propagates_rpc_error_objects() {
		let rejection =
			r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"unknown op hash"}}"#;
		let url = scripted_endpoint(vec![rejection.to_string()]).await;

		let client = BundlerClient::new(&url, Address::repeat_byte(0x22));
		let err = client
			.wait_for_user_operation_receipt(B256::repeat_byte(0xaa))
			.await
			.unwrap_err();

		assert!(matches!(err, ChainError::Reverted(_)));
	}

	#[test]
	fn test_error_response_parsing() {
		let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32500,"message":"paymaster policy"}}"#;
		let parsed: RpcResponse<B256> = serde_json::from_str(body).unwrap();
		assert!(parsed.result.is_none());
		let err = parsed.error.unwrap();
		assert_eq!(err.code, -32500);
		assert_eq!(err.message, "paymaster policy");
	}

	#[test]
	fn test_null_result_means_pending() {
		let body = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
		let parsed: RpcResponse<UserOperationReceipt> = serde_json::from_str(body).unwrap();
		assert!(parsed.result.is_none());
		assert!(parsed.error.is_none());
	}

	#[test]
	fn test_receipt_parsing() {
		let body = r#"{
			"jsonrpc": "2.0",
			"id": 4,
			"result": {
				"success": true,
				"receipt": {
					"transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111"
				}
			}
		}"#;
		let parsed: RpcResponse<UserOperationReceipt> = serde_json::from_str(body).unwrap();
		let receipt = parsed.result.unwrap();
		assert!(receipt.success);
		assert_eq!(receipt.receipt.transaction_hash, B256::repeat_byte(0x11));
	}
}
