//! Scripted doubles shared by the engine and strategy tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use relayer_chain::{ChainError, ChainInterface, Receipt};

// Well-known anvil test key, never used with real funds.
pub(crate) const TEST_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Scripted chain backend. Configure the fields before wrapping in an
/// `Arc`; `sends` counts broadcasts so tests can assert at-most-once.
pub(crate) struct FakeChain {
	pub chain_id: u64,
	pub router: Address,
	pub nonce: U256,
	pub allowance: U256,
	/// Every async call fails with a transient RPC error when set.
	pub rpc_down: bool,
	pub sends: AtomicU64,
}

impl FakeChain {
	pub fn new(chain_id: u64) -> Self {
		Self {
			chain_id,
			router: Address::repeat_byte(0x42),
			nonce: U256::ZERO,
			allowance: U256::MAX,
			rpc_down: false,
			sends: AtomicU64::new(0),
		}
	}

	fn reachable(&self) -> Result<(), ChainError> {
		if self.rpc_down {
			Err(ChainError::Rpc("connection refused".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl ChainInterface for FakeChain {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	fn router(&self) -> Address {
		self.router
	}

	async fn intent_nonce(&self, _user: Address) -> Result<U256, ChainError> {
		self.reachable()?;
		Ok(self.nonce)
	}

	async fn router_allowance(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
		self.reachable()?;
		Ok(self.allowance)
	}

	async fn user_op_nonce(
		&self,
		_entry_point: Address,
		_sender: Address,
	) -> Result<U256, ChainError> {
		self.reachable()?;
		Ok(U256::ZERO)
	}

	async fn fee_estimate(&self) -> Result<(u128, u128), ChainError> {
		self.reachable()?;
		Ok((1_000_000_000, 1_000_000_000))
	}

	async fn send_router_transaction(&self, _data: Vec<u8>) -> Result<B256, ChainError> {
		self.reachable()?;
		self.sends.fetch_add(1, Ordering::SeqCst);
		Ok(B256::repeat_byte(0x77))
	}

	async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
		self.reachable()?;
		Ok(Receipt {
			tx_hash,
			block_number: 1,
			success: true,
		})
	}
}

/// Serves one canned HTTP response body per incoming connection, in
/// order, then stops accepting.
pub(crate) async fn scripted_endpoint(bodies: Vec<String>) -> String {
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
