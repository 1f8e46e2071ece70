//! ERC-4337 user operation types (entry point v0.6).
//!
//! Used by the sponsored execution path: the RouterHub call is wrapped in
//! a user operation from the relayer's smart account, sponsored by a
//! paymaster, and submitted through a bundler.

use alloy::{
	primitives::{keccak256, Address, Bytes, B256, U256},
	sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

/// A v0.6 user operation as accepted by `eth_sendUserOperation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
	pub sender: Address,
	pub nonce: U256,
	pub init_code: Bytes,
	pub call_data: Bytes,
	pub call_gas_limit: U256,
	pub verification_gas_limit: U256,
	pub pre_verification_gas: U256,
	pub max_fee_per_gas: U256,
	pub max_priority_fee_per_gas: U256,
	pub paymaster_and_data: Bytes,
	pub signature: Bytes,
}

/// Gas estimates returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
	pub call_gas_limit: U256,
	pub verification_gas_limit: U256,
	pub pre_verification_gas: U256,
}

/// Computes the v0.6 userOpHash that the account signature covers.
///
/// keccak256(abi.encode(keccak256(packed op), entryPoint, chainId)), with
/// byte fields hashed rather than inlined, per the entry point contract.
pub fn user_op_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> B256 {
	let packed = (
		op.sender,
		op.nonce,
		keccak256(&op.init_code),
		keccak256(&op.call_data),
		op.call_gas_limit,
		op.verification_gas_limit,
		op.pre_verification_gas,
		op.max_fee_per_gas,
		op.max_priority_fee_per_gas,
		keccak256(&op.paymaster_and_data),
	)
		.abi_encode();

	keccak256((keccak256(&packed), entry_point, U256::from(chain_id)).abi_encode())
}
