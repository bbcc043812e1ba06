// src/types.rs
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::guards;

/// One call extracted from a (possibly batched) payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCall {
    #[serde(serialize_with = "serialize_checksummed")]
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<u8>,
}

impl SubCall {
    pub fn call(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            operation: None,
        }
    }

    pub fn is_delegate_call(&self) -> bool {
        self.operation == Some(crate::contracts::DELEGATE_CALL)
    }
}

fn serialize_checksummed<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_checksum(address, None))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    TypedData(Box<TypedData>),
}

/// Canonical, human-auditable view of a signing request.
///
/// `message` is set only for signature-only flows, which carry no
/// `transactions`. A user operation with empty call data has neither: it
/// performs no calls but still costs gas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRequest {
    pub chain_id: u64,
    pub cost_estimate: String,
    pub transactions: Vec<SubCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Counterfactual deployment of the sender, present only before the account exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Factory {
    pub factory: Address,
    pub factory_data: Bytes,
}

/// Complete paymaster envelope. Either all of it is attached to an operation or none of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterFields {
    pub paymaster: Address,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub paymaster_data: Bytes,
}

/// ERC-4337 v0.7 UserOperation in its RPC shape.
///
/// Deserialization validates every field and rejects partial factory or
/// paymaster groups, see [`guards::user_operation_from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(flatten)]
    pub factory: Option<Factory>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(flatten)]
    pub paymaster: Option<PaymasterFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Bytes>,
}

impl<'de> Deserialize<'de> for UserOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        guards::user_operation_from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl UserOperation {
    /// Worst-case gas units the entry point may charge for this operation.
    pub fn total_gas_limit(&self) -> Option<U256> {
        let mut total = self
            .call_gas_limit
            .checked_add(self.verification_gas_limit)?
            .checked_add(self.pre_verification_gas)?;
        if let Some(pm) = &self.paymaster {
            total = total
                .checked_add(pm.paymaster_verification_gas_limit)?
                .checked_add(pm.paymaster_post_op_gas_limit)?;
        }
        Some(total)
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// An operation before gas limits and paymaster data are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(flatten)]
    pub factory: Option<Factory>,
    pub call_data: Bytes,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl UnsignedUserOperation {
    pub fn with_paymaster_data(self, data: &PaymasterData) -> UserOperation {
        UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            factory: self.factory,
            call_data: self.call_data,
            call_gas_limit: data.call_gas_limit,
            verification_gas_limit: data.verification_gas_limit,
            pre_verification_gas: data.pre_verification_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            paymaster: data.sponsorship(),
            signature: None,
        }
    }
}

/// Gas and sponsorship envelope as returned by `pm_sponsorUserOperation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterData {
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl PaymasterData {
    /// Collapses the optional paymaster fields into a complete envelope, if a paymaster is set.
    pub fn sponsorship(&self) -> Option<PaymasterFields> {
        self.paymaster.map(|paymaster| PaymasterFields {
            paymaster,
            paymaster_verification_gas_limit: self.paymaster_verification_gas_limit.unwrap_or_default(),
            paymaster_post_op_gas_limit: self.paymaster_post_op_gas_limit.unwrap_or_default(),
            paymaster_data: self.paymaster_data.clone().unwrap_or_default(),
        })
    }
}

/// Result of `eth_getUserOperationReceipt`.
///
/// `success == false` means the operation was included and reverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub entry_point: Option<Address>,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub receipt: serde_json::Value,
}

/// Wire shape of a request handed over by a wallet connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedSignRequest {
    pub chain_id: u64,
    pub hash_to_sign: H256,
    pub evm_message: serde_json::Value,
}

/// The payload shapes the decoder understands.
#[derive(Debug, Clone)]
pub enum SignPayload {
    Message(String),
    RawTransaction(Bytes),
    Transaction(TypedTransaction),
    TypedData(Box<TypedData>),
    UserOperation(Box<UserOperation>),
}
