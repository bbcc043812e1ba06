// src/safe.rs
//! On-chain view of a Safe account driven through the Safe 4337 module.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::providers::Middleware;
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, Bytes, H160, H256, U256};
use serde_json::json;
use tracing::debug;

use crate::codec::pack_paymaster_fields;
use crate::contracts::AddOwnerWithThresholdCall;
use crate::manager::SafeDeployment;
use crate::types::{Factory, SubCall, UserOperation};

/// Safe4337Module v0.3.0 (`0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226`).
pub const SAFE_4337_MODULE_ADDRESS: Address = H160([
    0x75, 0xcf, 0x11, 0x46, 0x79, 0x37, 0xce, 0x3f, 0x2f, 0x35, 0x7c, 0xe2, 0x4f, 0xfc, 0x3d, 0xbf,
    0x8f, 0xd5, 0xc2, 0x26,
]);

/// EntryPoint v0.7 (`0x0000000071727De22E5E9d8BAf0edAc6f37da032`).
pub const ENTRY_POINT_ADDRESS: Address = H160([
    0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda, 0xc6,
    0xf3, 0x7d, 0xa0, 0x32,
]);

pub struct SafeAccount<M> {
    client: Arc<M>,
    address: Address,
    module: Address,
    entry_point: Address,
    factory: Option<Factory>,
}

impl<M: Middleware> SafeAccount<M> {
    pub fn new(client: Arc<M>, address: Address, entry_point: Address) -> Self {
        Self {
            client,
            address,
            module: SAFE_4337_MODULE_ADDRESS,
            entry_point,
            factory: None,
        }
    }

    pub fn with_module(mut self, module: Address) -> Self {
        self.module = module;
        self
    }

    /// Deployment call attached to operations while the Safe has no code.
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }
}

#[async_trait]
impl<M: Middleware + 'static> SafeDeployment for SafeAccount<M> {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_deployed(&self, chain_id: u64) -> Result<bool> {
        let code = self
            .client
            .get_code(self.address, None)
            .await
            .map_err(|e| anyhow!("failed to fetch code on chain {}: {}", chain_id, e))?;
        debug!("Safe {:?} has {} bytes of code", self.address, code.len());
        Ok(!code.is_empty())
    }

    fn add_owner_transaction(&self, owner: Address) -> SubCall {
        let data = AddOwnerWithThresholdCall {
            owner,
            threshold: U256::one(),
        }
        .encode();
        SubCall::call(self.address, U256::zero(), data.into())
    }

    fn factory(&self) -> Option<Factory> {
        self.factory.clone()
    }

    fn op_hash(&self, chain_id: u64, op: &UserOperation) -> Result<H256> {
        safe_op_hash(chain_id, self.module, self.entry_point, op)
    }
}

/// EIP-712 digest of the `SafeOp` struct the module checks owner signatures against.
pub fn safe_op_hash(
    chain_id: u64,
    module: Address,
    entry_point: Address,
    op: &UserOperation,
) -> Result<H256> {
    let init_code: Bytes = match &op.factory {
        Some(f) => [f.factory.as_bytes(), f.factory_data.as_ref()].concat().into(),
        None => Bytes::default(),
    };
    let paymaster_and_data = match &op.paymaster {
        Some(fields) => pack_paymaster_fields(fields)?,
        None => Bytes::default(),
    };

    let typed: TypedData = serde_json::from_value(json!({
        "types": {
            "EIP712Domain": [
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "SafeOp": [
                {"name": "safe", "type": "address"},
                {"name": "nonce", "type": "uint256"},
                {"name": "initCode", "type": "bytes"},
                {"name": "callData", "type": "bytes"},
                {"name": "verificationGasLimit", "type": "uint128"},
                {"name": "callGasLimit", "type": "uint128"},
                {"name": "preVerificationGas", "type": "uint256"},
                {"name": "maxPriorityFeePerGas", "type": "uint128"},
                {"name": "maxFeePerGas", "type": "uint128"},
                {"name": "paymasterAndData", "type": "bytes"},
                {"name": "validAfter", "type": "uint48"},
                {"name": "validUntil", "type": "uint48"},
                {"name": "entryPoint", "type": "address"}
            ]
        },
        "primaryType": "SafeOp",
        "domain": {
            "chainId": chain_id,
            "verifyingContract": module
        },
        "message": {
            "safe": op.sender,
            "nonce": op.nonce,
            "initCode": init_code,
            "callData": op.call_data,
            "verificationGasLimit": op.verification_gas_limit,
            "callGasLimit": op.call_gas_limit,
            "preVerificationGas": op.pre_verification_gas,
            "maxPriorityFeePerGas": op.max_priority_fee_per_gas,
            "maxFeePerGas": op.max_fee_per_gas,
            "paymasterAndData": paymaster_and_data,
            "validAfter": 0,
            "validUntil": 0,
            "entryPoint": entry_point
        }
    }))?;

    let digest = typed
        .encode_eip712()
        .map_err(|e| anyhow!("failed to hash SafeOp: {}", e))?;
    Ok(H256(digest))
}
