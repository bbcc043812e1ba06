// src/decode.rs
//! Turns every supported signing payload into a [`DecodedRequest`].
//!
//! Cost estimates are worst-case: value moved plus the full gas limit at the
//! maximum fee the sender agreed to pay. All arithmetic stays in `U256` until
//! the final decimal rendering.
use ethers::abi::AbiDecode;
use ethers::contract::EthCall;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, NameOrAddress, Transaction, TransactionRequest, U256,
};
use ethers::utils::format_units;
use ethers::utils::rlp::{self, Rlp};
use serde_json::Value;
use tracing::debug;

use crate::codec::unpack_multisend;
use crate::contracts::{MultiSendCall, Safe4337ModuleCalls};
use crate::error::DecodeError;
use crate::guards;
use crate::types::{DecodedRequest, EncodedSignRequest, Message, SignPayload, SubCall, UserOperation};

/// Transaction fields relevant to decoding, independent of how they were encoded.
#[derive(Debug)]
struct TxFields {
    chain_id: Option<U256>,
    to: Option<Address>,
    value: U256,
    data: Bytes,
    gas: Option<U256>,
    max_fee: Option<U256>,
}

impl From<&Transaction> for TxFields {
    fn from(tx: &Transaction) -> Self {
        Self {
            chain_id: tx.chain_id,
            to: tx.to,
            value: tx.value,
            data: tx.input.clone(),
            gas: Some(tx.gas),
            max_fee: tx.max_fee_per_gas.or(tx.gas_price),
        }
    }
}

impl TryFrom<&TypedTransaction> for TxFields {
    type Error = DecodeError;

    fn try_from(tx: &TypedTransaction) -> Result<Self, Self::Error> {
        let to = match tx.to() {
            Some(NameOrAddress::Address(to)) => Some(*to),
            Some(NameOrAddress::Name(name)) => {
                return Err(DecodeError::UnsupportedPayload(format!(
                    "unresolved ENS recipient {name}"
                )))
            }
            None => None,
        };
        // legacy gas price, or the EIP-1559 cap: never the expected base fee
        let max_fee = match tx {
            TypedTransaction::Legacy(inner) => inner.gas_price,
            TypedTransaction::Eip2930(inner) => inner.tx.gas_price,
            TypedTransaction::Eip1559(inner) => inner.max_fee_per_gas,
        };
        Ok(Self {
            chain_id: tx.chain_id().map(|id| U256::from(id.as_u64())),
            to,
            value: tx.value().copied().unwrap_or_default(),
            data: tx.data().cloned().unwrap_or_default(),
            gas: tx.gas().copied(),
            max_fee,
        })
    }
}

/// Decodes a payload whose shape is already known.
pub fn decode_request(chain_id: u64, payload: &SignPayload) -> Result<DecodedRequest, DecodeError> {
    match payload {
        SignPayload::Message(text) => Ok(decode_message(chain_id, text)),
        SignPayload::RawTransaction(raw) => decode_rlp(chain_id, raw),
        SignPayload::Transaction(tx) => decode_transaction(chain_id, tx),
        SignPayload::TypedData(data) => decode_typed_data(chain_id, data),
        SignPayload::UserOperation(op) => decode_user_operation(chain_id, op),
    }
}

/// Sniffs the shape of an untyped `evmMessage` and decodes it.
///
/// Hex strings that are not a valid transaction, and any other text, are
/// treated as a plain message.
pub fn decode_tx_data(request: &EncodedSignRequest) -> Result<DecodedRequest, DecodeError> {
    let chain_id = request.chain_id;
    let data = &request.evm_message;

    if let Some(raw) = data.as_str().and_then(hex_bytes) {
        match parse_raw_transaction(&raw) {
            Ok(fields) => return decode_fields(chain_id, fields),
            Err(e) => debug!("evmMessage is hex but not a transaction: {}", e),
        }
    }
    if let Some(typed) = guards::parse_typed_data(data) {
        return decode_typed_data(chain_id, &typed);
    }
    if let Some(op) = guards::parse_user_operation(data) {
        return decode_user_operation(chain_id, &op);
    }
    if let Some(tx) = parse_structured_transaction(data) {
        return decode_transaction(chain_id, &tx);
    }
    match data.as_str() {
        Some(text) => Ok(decode_message(chain_id, text)),
        None => Err(DecodeError::UnsupportedPayload(
            "evmMessage is neither text nor a known structure".to_string(),
        )),
    }
}

pub fn decode_message(chain_id: u64, text: &str) -> DecodedRequest {
    DecodedRequest {
        chain_id,
        cost_estimate: "0".to_string(),
        transactions: Vec::new(),
        message: Some(Message::Text(text.to_string())),
    }
}

pub fn decode_rlp_hex(chain_id: u64, raw: &str) -> Result<DecodedRequest, DecodeError> {
    let bytes = hex_bytes(raw).ok_or_else(|| DecodeError::InvalidRlp(format!("not hex: {raw}")))?;
    decode_rlp(chain_id, &bytes)
}

/// Decodes a signed or unsigned legacy, EIP-2930 or EIP-1559 transaction.
pub fn decode_rlp(chain_id: u64, raw: &[u8]) -> Result<DecodedRequest, DecodeError> {
    decode_fields(chain_id, parse_raw_transaction(raw)?)
}

pub fn decode_transaction(chain_id: u64, tx: &TypedTransaction) -> Result<DecodedRequest, DecodeError> {
    decode_fields(chain_id, TxFields::try_from(tx)?)
}

/// Typed data only asks for a signature, so it moves no value and costs nothing.
/// This includes a `SafeTx`: signing it executes nothing until someone submits it.
pub fn decode_typed_data(chain_id: u64, data: &TypedData) -> Result<DecodedRequest, DecodeError> {
    Ok(DecodedRequest {
        chain_id,
        cost_estimate: "0".to_string(),
        transactions: Vec::new(),
        message: Some(Message::TypedData(Box::new(data.clone()))),
    })
}

pub fn decode_user_operation(chain_id: u64, op: &UserOperation) -> Result<DecodedRequest, DecodeError> {
    let transactions = decode_call_data(&op.call_data)?;
    let gas = op.total_gas_limit().ok_or(DecodeError::Overflow)?;
    let cost = total_value(&transactions)?
        .checked_add(gas.checked_mul(op.max_fee_per_gas).ok_or(DecodeError::Overflow)?)
        .ok_or(DecodeError::Overflow)?;
    Ok(DecodedRequest {
        chain_id,
        cost_estimate: format_cost(cost)?,
        transactions,
        message: None,
    })
}

/// Extracts the calls a Safe 4337 module will perform for `call_data`.
pub fn decode_call_data(call_data: &[u8]) -> Result<Vec<SubCall>, DecodeError> {
    if call_data.is_empty() {
        return Ok(Vec::new());
    }
    let decoded = Safe4337ModuleCalls::decode(call_data)
        .map_err(|e| DecodeError::InvalidCallData(e.to_string()))?;
    let call = match decoded {
        Safe4337ModuleCalls::ExecuteUserOp(c) => SubCall {
            to: c.to,
            value: c.value,
            data: c.data,
            operation: Some(c.operation),
        },
        Safe4337ModuleCalls::ExecuteUserOpWithErrorString(c) => SubCall {
            to: c.to,
            value: c.value,
            data: c.data,
            operation: Some(c.operation),
        },
    };
    expand_multisend(call)
}

/// A delegate call into `multiSend(bytes)` is replaced by the batch it carries.
fn expand_multisend(call: SubCall) -> Result<Vec<SubCall>, DecodeError> {
    if !call.is_delegate_call() || !call.data.starts_with(&MultiSendCall::selector()) {
        return Ok(vec![call]);
    }
    let batch =
        MultiSendCall::decode(&call.data).map_err(|e| DecodeError::InvalidCallData(e.to_string()))?;
    Ok(unpack_multisend(&batch.transactions)?)
}

/// Renders wei as ether with every significant digit and no trailing zeros.
pub fn format_cost(wei: U256) -> Result<String, DecodeError> {
    let formatted = format_units(wei, "ether").map_err(|_| DecodeError::Overflow)?;
    if !formatted.contains('.') {
        return Ok(formatted);
    }
    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}

fn decode_fields(chain_id: u64, fields: TxFields) -> Result<DecodedRequest, DecodeError> {
    if let Some(actual) = fields.chain_id {
        if actual != U256::from(chain_id) {
            return Err(DecodeError::ChainIdMismatch {
                expected: chain_id,
                actual,
            });
        }
    }
    let to = fields.to.ok_or(DecodeError::MissingField("to"))?;
    let gas = fields.gas.ok_or(DecodeError::MissingField("gas"))?;
    let max_fee = fields.max_fee.ok_or(DecodeError::MissingField("maxFeePerGas"))?;
    let cost = gas
        .checked_mul(max_fee)
        .and_then(|fee| fee.checked_add(fields.value))
        .ok_or(DecodeError::Overflow)?;

    Ok(DecodedRequest {
        chain_id,
        cost_estimate: format_cost(cost)?,
        transactions: vec![SubCall::call(to, fields.value, fields.data)],
        message: None,
    })
}

fn parse_raw_transaction(raw: &[u8]) -> Result<TxFields, DecodeError> {
    let invalid = |e: rlp::DecoderError| DecodeError::InvalidRlp(e.to_string());
    if is_signed(raw).map_err(invalid)? {
        let tx: Transaction = rlp::decode(raw).map_err(invalid)?;
        Ok(TxFields::from(&tx))
    } else {
        let tx: TypedTransaction = rlp::decode(raw).map_err(invalid)?;
        TxFields::try_from(&tx)
    }
}

/// Signed envelopes carry three trailing signature items; EIP-155 unsigned
/// legacy payloads carry `chainId, 0, 0` in the same slots.
fn is_signed(raw: &[u8]) -> Result<bool, rlp::DecoderError> {
    match raw.first() {
        None => Err(rlp::DecoderError::RlpIsTooShort),
        Some(0x01) => Ok(Rlp::new(&raw[1..]).item_count()? > 8),
        Some(0x02) => Ok(Rlp::new(&raw[1..]).item_count()? > 9),
        Some(_) => {
            let list = Rlp::new(raw);
            Ok(list.item_count()? == 9 && !list.at(7)?.is_empty())
        }
    }
}

fn total_value(calls: &[SubCall]) -> Result<U256, DecodeError> {
    calls.iter().try_fold(U256::zero(), |sum, call| {
        sum.checked_add(call.value).ok_or(DecodeError::Overflow)
    })
}

/// Transaction objects as wallets hand them over: tagged with a `type`, or
/// untagged with EIP-1559 or legacy fee fields and possibly numeric quantities.
fn parse_structured_transaction(data: &Value) -> Option<TypedTransaction> {
    let fields = data.as_object()?;
    if fields.contains_key("type") {
        return serde_json::from_value(data.clone()).ok();
    }
    let normalized: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(key, value)| {
            let value = match value.as_u64() {
                Some(n) => Value::String(format!("{n:#x}")),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    let normalized = Value::Object(normalized);

    if fields.contains_key("maxFeePerGas") {
        serde_json::from_value::<Eip1559TransactionRequest>(normalized)
            .ok()
            .map(Into::into)
    } else if fields.contains_key("gasPrice") || fields.contains_key("to") {
        serde_json::from_value::<TransactionRequest>(normalized)
            .ok()
            .map(Into::into)
    } else {
        None
    }
}

fn hex_bytes(raw: &str) -> Option<Bytes> {
    let digits = raw.strip_prefix("0x")?;
    hex::decode(digits).ok().map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHAIN_ID: u64 = 11155111;

    const SAFE_EXEC_RLP: &str = "0x02f9027083aa36a72a830f4d5b844f32d7b98301ad80947fa8e8264985c7525fc50f98ac1a9b376540548980b902446a7612020000000000000000000000007fa8e8264985c7525fc50f98ac1a9b37654054890000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000014000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000001c000000000000000000000000000000000000000000000000000000000000000440d582f130000000000000000000000007f01d9b227593e033bf8d6fc86e634d27aa855680000000000000000000000000000000000000000000000000000000000000001000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000041000000000000000000000000102543f7e6b5786a444cc89ff73012825d13000d00000000000000000000000000000000000000000000000000000000000000000100000000000000000000000000000000000000000000000000000000000000c0";
    const TRANSFER_RLP: &str = "0x02ef83aa36a780830f4d5b84350f1b6a82520894d8b91431c9fa6dcf3a8cdc2dda68904524a65726865af3107a400080c0";
    const LEGACY_RLP: &str = "0xef078504a817c80082520894d8b91431c9fa6dcf3a8cdc2dda68904524a65726880de0b6b3a76400008083aa36a78080";
    const CALL_RLP: &str = "0x02f183aa36a703843b9aca00851cbe991a1482c35094d8b91431c9fa6dcf3a8cdc2dda68904524a6572684075bcd1582beefc0";

    fn address(raw: &str) -> Address {
        raw.parse().unwrap()
    }

    #[test]
    fn plain_message_is_free_and_verbatim() {
        let text = "Welcome to OpenSea!\n\nThis request will not trigger a blockchain transaction.";
        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!(text),
        };
        let decoded = decode_tx_data(&request).unwrap();
        assert_eq!(
            decoded,
            DecodedRequest {
                chain_id: CHAIN_ID,
                cost_estimate: "0".to_string(),
                transactions: vec![],
                message: Some(Message::Text(text.to_string())),
            }
        );
    }

    #[test]
    fn hex_message_that_is_not_a_transaction() {
        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!("0xdeadbeef"),
        };
        let decoded = decode_tx_data(&request).unwrap();
        assert_eq!(decoded.message, Some(Message::Text("0xdeadbeef".to_string())));
    }

    #[test]
    fn eip1559_contract_call() {
        let decoded = decode_rlp_hex(CHAIN_ID, SAFE_EXEC_RLP).unwrap();
        assert_eq!(decoded.chain_id, CHAIN_ID);
        // 0x1ad80 gas * 0x4f32d7b9 max fee, zero value
        assert_eq!(decoded.cost_estimate, "0.000146096750649728");
        assert!(decoded.message.is_none());
        let call = &decoded.transactions[0];
        assert_eq!(decoded.transactions.len(), 1);
        assert_eq!(call.to, address("0x7fa8e8264985c7525fc50f98ac1a9b3765405489"));
        assert_eq!(call.value, U256::zero());
        assert_eq!(call.data.len(), 0x244);
        assert!(hex::encode(&call.data).starts_with("6a761202"));
        assert_eq!(call.operation, None);
    }

    #[test]
    fn eip1559_transfer_includes_value() {
        let decoded = decode_rlp_hex(CHAIN_ID, TRANSFER_RLP).unwrap();
        assert_eq!(decoded.cost_estimate, "0.000118693832626");
        assert_eq!(
            decoded.transactions,
            vec![SubCall::call(
                address("0xd8b91431c9fa6dcf3a8cdc2dda68904524a65726"),
                U256::exp10(14),
                Bytes::default(),
            )]
        );
    }

    #[test]
    fn cost_keeps_every_significant_digit() {
        // 123456789 wei + 50000 * 123456789012 wei
        let decoded = decode_rlp_hex(CHAIN_ID, CALL_RLP).unwrap();
        assert_eq!(decoded.cost_estimate, "0.006172839574056789");
        assert_eq!(decoded.transactions[0].data, Bytes::from(vec![0xbe, 0xef]));
    }

    #[test]
    fn legacy_eip155_uses_gas_price() {
        // 1 ether + 21000 * 20 gwei
        let decoded = decode_rlp_hex(CHAIN_ID, LEGACY_RLP).unwrap();
        assert_eq!(decoded.cost_estimate, "1.00042");
        assert_eq!(decoded.transactions[0].value, U256::exp10(18));
    }

    #[test]
    fn raw_and_structured_agree() {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .chain_id(CHAIN_ID)
            .nonce(0u64)
            .max_priority_fee_per_gas(0x0f4d5b_u64)
            .max_fee_per_gas(0x350f1b6a_u64)
            .gas(21000u64)
            .to(address("0xd8b91431c9fa6dcf3a8cdc2dda68904524a65726"))
            .value(U256::exp10(14))
            .data(Bytes::default())
            .into();
        assert_eq!(
            decode_transaction(CHAIN_ID, &tx).unwrap(),
            decode_rlp_hex(CHAIN_ID, TRANSFER_RLP).unwrap()
        );
    }

    #[test]
    fn sniffs_raw_transaction_from_request() {
        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!(TRANSFER_RLP),
        };
        assert_eq!(
            decode_tx_data(&request).unwrap(),
            decode_rlp_hex(CHAIN_ID, TRANSFER_RLP).unwrap()
        );
    }

    #[test]
    fn sniffs_untagged_transaction_object() {
        // same transfer as TRANSFER_RLP, shaped like a wallet transaction request
        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!({
                "chainId": CHAIN_ID,
                "nonce": 0,
                "maxPriorityFeePerGas": "0xf4d5b",
                "maxFeePerGas": "0x350f1b6a",
                "gas": 21000,
                "to": "0xd8b91431c9fa6dcf3a8cdc2dda68904524a65726",
                "value": "0x5af3107a4000",
                "data": "0x"
            }),
        };
        assert_eq!(
            decode_tx_data(&request).unwrap(),
            decode_rlp_hex(CHAIN_ID, TRANSFER_RLP).unwrap()
        );

        let legacy = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!({
                "chainId": CHAIN_ID,
                "gasPrice": "0x4a817c800",
                "gas": "0x5208",
                "to": "0xd8b91431c9fa6dcf3a8cdc2dda68904524a65726",
                "value": "0xde0b6b3a7640000"
            }),
        };
        assert_eq!(
            decode_tx_data(&legacy).unwrap(),
            decode_rlp_hex(CHAIN_ID, LEGACY_RLP).unwrap()
        );

        let unknown = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!({"foo": 1}),
        };
        assert!(matches!(
            decode_tx_data(&unknown),
            Err(DecodeError::UnsupportedPayload(_))
        ));
    }

    #[test]
    fn rejects_wrong_chain_and_garbage() {
        assert!(matches!(
            decode_rlp_hex(1, TRANSFER_RLP),
            Err(DecodeError::ChainIdMismatch { expected: 1, .. })
        ));
        assert!(matches!(
            decode_rlp_hex(CHAIN_ID, "0x02ff"),
            Err(DecodeError::InvalidRlp(_))
        ));
        assert!(matches!(
            decode_rlp_hex(CHAIN_ID, "not hex"),
            Err(DecodeError::InvalidRlp(_))
        ));
    }

    #[test]
    fn contract_creation_is_rejected() {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .chain_id(CHAIN_ID)
            .max_fee_per_gas(1u64)
            .gas(21000u64)
            .into();
        assert!(matches!(
            decode_transaction(CHAIN_ID, &tx),
            Err(DecodeError::MissingField("to"))
        ));
    }

    fn typed_data(primary_type: &str, message: Value) -> TypedData {
        serde_json::from_value(json!({
            "types": {
                "SafeTx": [
                    {"name": "to", "type": "address"},
                    {"name": "value", "type": "uint256"},
                    {"name": "data", "type": "bytes"},
                    {"name": "operation", "type": "uint8"},
                    {"name": "safeTxGas", "type": "uint256"},
                    {"name": "baseGas", "type": "uint256"},
                    {"name": "gasPrice", "type": "uint256"},
                    {"name": "gasToken", "type": "address"},
                    {"name": "refundReceiver", "type": "address"},
                    {"name": "nonce", "type": "uint256"}
                ],
                "Permit": [{"name": "owner", "type": "address"}],
                "EIP712Domain": [
                    {"name": "chainId", "type": "uint256"},
                    {"name": "verifyingContract", "type": "address"}
                ]
            },
            "domain": {
                "chainId": "0xaa36a7",
                "verifyingContract": "0x7fa8e8264985c7525fc50f98ac1a9b3765405489"
            },
            "primaryType": primary_type,
            "message": message
        }))
        .unwrap()
    }

    #[test]
    fn unrecognized_typed_data_is_signature_only() {
        let typed = typed_data(
            "Permit",
            json!({"owner": "0x7fa8e8264985c7525fc50f98ac1a9b3765405489"}),
        );
        let decoded = decode_typed_data(CHAIN_ID, &typed).unwrap();
        assert_eq!(decoded.cost_estimate, "0");
        assert!(decoded.transactions.is_empty());
        assert_eq!(decoded.message, Some(Message::TypedData(Box::new(typed))));
    }

    #[test]
    fn safe_tx_typed_data_is_signature_only() {
        // removeOwner(0x1, 0x7f01d9b227593e033bf8d6fc86e634d27aa85568, 1)
        let typed = typed_data(
            "SafeTx",
            json!({
                "to": "0x7fa8e8264985c7525fc50f98ac1a9b3765405489",
                "value": "0",
                "data": "0xf8dc5dd900000000000000000000000000000000000000000000000000000000000000010000000000000000000000007f01d9b227593e033bf8d6fc86e634d27aa855680000000000000000000000000000000000000000000000000000000000000001",
                "operation": "0",
                "safeTxGas": "0",
                "baseGas": "0",
                "gasPrice": "0",
                "gasToken": "0x0000000000000000000000000000000000000000",
                "refundReceiver": "0x0000000000000000000000000000000000000000",
                "nonce": "0"
            }),
        );
        let expected = DecodedRequest {
            chain_id: CHAIN_ID,
            cost_estimate: "0".to_string(),
            transactions: vec![],
            message: Some(Message::TypedData(Box::new(typed.clone()))),
        };
        assert_eq!(decode_typed_data(CHAIN_ID, &typed).unwrap(), expected);

        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: serde_json::to_value(&typed).unwrap(),
        };
        assert_eq!(decode_tx_data(&request).unwrap(), expected);
    }

    fn user_op(call_data: &str) -> UserOperation {
        serde_json::from_value(json!({
            "nonce": "0x12",
            "sender": "0x7fa8e8264985C7525Fc50F98aC1A9b3765405489",
            "callData": call_data,
            "callGasLimit": "0x26a93",
            "maxFeePerGas": "0x1c9c49e8",
            "preVerificationGas": "0xd925",
            "maxPriorityFeePerGas": "0xc11d3c",
            "verificationGasLimit": "0x13393"
        }))
        .unwrap()
    }

    #[test]
    fn user_operation_single_call() {
        let op = user_op("0x7bb374280000000000000000000000009008d19f58aabd9ed0d60971565aa8510560ab4100000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000080000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000a4ec6cb13f0000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000000100000000000000000000000000000000000000000000000000000000000000385ed999b6170188091d3b619aaad8b79ab6d42d4517e26a33b0246ba31cce5bee7fa8e8264985c7525fc50f98ac1a9b3765405489671bdb4400000000000000000000000000000000000000000000000000000000000000000000000062697474652f6e6561722d7361666500");
        let decoded = decode_user_operation(CHAIN_ID, &op).unwrap();
        // (0x26a93 + 0x13393 + 0xd925) gas * 0x1c9c49e8 max fee
        assert_eq!(decoded.cost_estimate, "0.000140489181658872");
        assert_eq!(
            decoded.transactions,
            vec![SubCall {
                to: address("0x9008d19f58aabd9ed0d60971565aa8510560ab41"),
                value: U256::zero(),
                data: hex_bytes("0xec6cb13f0000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000000100000000000000000000000000000000000000000000000000000000000000385ed999b6170188091d3b619aaad8b79ab6d42d4517e26a33b0246ba31cce5bee7fa8e8264985c7525fc50f98ac1a9b3765405489671bdb440000000000000000").unwrap(),
                operation: Some(0),
            }]
        );
        let rendered = serde_json::to_value(&decoded.transactions[0]).unwrap();
        assert_eq!(rendered["to"], json!("0x9008D19f58AAbD9eD0D60971565AA8510560ab41"));
    }

    #[test]
    fn user_operation_batch_expands_in_order() {
        use crate::codec::pack_multisend;
        use crate::contracts::{ExecuteUserOpCall, DELEGATE_CALL, MULTI_SEND_ADDRESS};
        use ethers::abi::AbiEncode;

        let calls = vec![
            SubCall {
                to: Address::repeat_byte(0xbe),
                value: U256::from(5),
                data: vec![0xbe, 0xef].into(),
                operation: Some(0),
            },
            SubCall {
                to: Address::repeat_byte(0xca),
                value: U256::from(7),
                data: Bytes::default(),
                operation: Some(0),
            },
        ];
        let call_data = ExecuteUserOpCall {
            to: MULTI_SEND_ADDRESS,
            value: U256::zero(),
            data: MultiSendCall {
                transactions: pack_multisend(&calls),
            }
            .encode()
            .into(),
            operation: DELEGATE_CALL,
        }
        .encode();
        let op = user_op(&format!("0x{}", hex::encode(call_data)));
        let decoded = decode_user_operation(CHAIN_ID, &op).unwrap();
        assert_eq!(decoded.transactions, calls);
        // 12 wei + 292683 * 480004584 wei
        assert_eq!(decoded.cost_estimate, "0.000140489181658884");
    }

    #[test]
    fn user_operation_without_call_data_has_no_calls() {
        let decoded = decode_user_operation(CHAIN_ID, &user_op("0x")).unwrap();
        assert!(decoded.transactions.is_empty());
        assert!(decoded.message.is_none());
        assert_eq!(decoded.cost_estimate, "0.000140489181658872");
        assert!(matches!(
            decode_user_operation(CHAIN_ID, &user_op("0xdeadbeef")),
            Err(DecodeError::InvalidCallData(_))
        ));
    }

    #[test]
    fn sniffs_stringified_user_operation() {
        let op = user_op("0x");
        let request = EncodedSignRequest {
            chain_id: CHAIN_ID,
            hash_to_sign: Default::default(),
            evm_message: json!(serde_json::to_string(&op).unwrap()),
        };
        assert_eq!(
            decode_tx_data(&request).unwrap(),
            decode_user_operation(CHAIN_ID, &op).unwrap()
        );
    }

    #[test]
    fn tagged_payloads_match_their_decoders() {
        let raw = hex_bytes(TRANSFER_RLP).unwrap();
        assert_eq!(
            decode_request(CHAIN_ID, &SignPayload::RawTransaction(raw)).unwrap(),
            decode_rlp_hex(CHAIN_ID, TRANSFER_RLP).unwrap()
        );
        assert_eq!(
            decode_request(CHAIN_ID, &SignPayload::Message("hi".to_string())).unwrap(),
            decode_message(CHAIN_ID, "hi")
        );
        let op = user_op("0x");
        assert_eq!(
            decode_request(CHAIN_ID, &SignPayload::UserOperation(Box::new(op.clone()))).unwrap(),
            decode_user_operation(CHAIN_ID, &op).unwrap()
        );
    }

    #[test]
    fn formats_exact_decimals() {
        assert_eq!(format_cost(U256::zero()).unwrap(), "0");
        assert_eq!(format_cost(U256::exp10(18)).unwrap(), "1");
        assert_eq!(format_cost(U256::exp10(19)).unwrap(), "10");
        assert_eq!(format_cost(U256::one()).unwrap(), "0.000000000000000001");
        assert_eq!(
            format_cost(U256::from_dec_str("1395633240123456000").unwrap()).unwrap(),
            "1.395633240123456"
        );
    }
}
