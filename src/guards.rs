// src/guards.rs
//! Structural validation of untyped JSON into the typed request shapes.
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, U256};
use ethers::utils::to_checksum;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::types::{Factory, PaymasterFields, UserOperation};

const REQUIRED_FIELDS: [&str; 8] = [
    "sender",
    "nonce",
    "callData",
    "maxPriorityFeePerGas",
    "maxFeePerGas",
    "verificationGasLimit",
    "callGasLimit",
    "preVerificationGas",
];

/// Builds a [`UserOperation`] from an untyped value, failing on the first field
/// that violates its shape.
pub fn user_operation_from_value(value: &Value) -> Result<UserOperation, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

    if let Some(missing) = REQUIRED_FIELDS
        .into_iter()
        .find(|field| !obj.contains_key(*field))
    {
        return Err(ValidationError::MissingField(missing));
    }

    let sender = address(obj, "sender")?;
    let nonce = quantity(obj, "nonce")?;
    let call_data = bytes(obj, "callData")?;
    let max_priority_fee_per_gas = quantity(obj, "maxPriorityFeePerGas")?;
    let max_fee_per_gas = quantity(obj, "maxFeePerGas")?;
    let verification_gas_limit = quantity(obj, "verificationGasLimit")?;
    let call_gas_limit = quantity(obj, "callGasLimit")?;
    let pre_verification_gas = quantity(obj, "preVerificationGas")?;

    let factory = match (
        optional(obj, "factory", address)?,
        optional(obj, "factoryData", bytes)?,
    ) {
        (Some(factory), Some(factory_data)) => Some(Factory {
            factory,
            factory_data,
        }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(ValidationError::OrphanedField {
                field: "factory",
                requires: "factoryData",
            })
        }
        (None, Some(_)) => {
            return Err(ValidationError::OrphanedField {
                field: "factoryData",
                requires: "factory",
            })
        }
    };

    let signature = optional(obj, "signature", bytes)?;

    let paymaster = optional(obj, "paymaster", address)?;
    let paymaster_data = optional(obj, "paymasterData", bytes)?;
    let paymaster_verification_gas_limit =
        optional(obj, "paymasterVerificationGasLimit", quantity)?;
    let paymaster_post_op_gas_limit = optional(obj, "paymasterPostOpGasLimit", quantity)?;

    let paymaster = match paymaster {
        Some(paymaster) => Some(PaymasterFields {
            paymaster,
            paymaster_verification_gas_limit: paymaster_verification_gas_limit.unwrap_or_default(),
            paymaster_post_op_gas_limit: paymaster_post_op_gas_limit.unwrap_or_default(),
            paymaster_data: paymaster_data.unwrap_or_default(),
        }),
        None => {
            let orphan = [
                ("paymasterData", paymaster_data.is_some()),
                (
                    "paymasterVerificationGasLimit",
                    paymaster_verification_gas_limit.is_some(),
                ),
                ("paymasterPostOpGasLimit", paymaster_post_op_gas_limit.is_some()),
            ]
            .into_iter()
            .find(|(_, present)| *present);
            if let Some((field, _)) = orphan {
                return Err(ValidationError::OrphanedField {
                    field,
                    requires: "paymaster",
                });
            }
            None
        }
    };

    Ok(UserOperation {
        sender,
        nonce,
        factory,
        call_data,
        call_gas_limit,
        verification_gas_limit,
        pre_verification_gas,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        paymaster,
        signature,
    })
}

pub fn is_user_operation(value: &Value) -> bool {
    user_operation_from_value(value).is_ok()
}

pub fn typed_data_from_value(value: &Value) -> Result<TypedData, serde_json::Error> {
    serde_json::from_value(value.clone())
}

/// Accepts either an already-structured value or its stringified JSON form.
///
/// Returns `None` when neither form passes `guard`; never errors.
pub fn parse_with_type_guard<T, E>(data: &Value, guard: impl Fn(&Value) -> Result<T, E>) -> Option<T> {
    if let Ok(parsed) = guard(data) {
        return Some(parsed);
    }
    let text = data.as_str()?;
    let value: Value = serde_json::from_str(text).ok()?;
    guard(&value).ok()
}

pub fn parse_user_operation(data: &Value) -> Option<UserOperation> {
    parse_with_type_guard(data, user_operation_from_value)
}

pub fn parse_typed_data(data: &Value) -> Option<TypedData> {
    parse_with_type_guard(data, typed_data_from_value)
}

/// `0x`-prefixed hex digits, or `None`.
fn hex_digits(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .filter(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn optional<T>(
    obj: &Map<String, Value>,
    field: &'static str,
    parse: fn(&Map<String, Value>, &'static str) -> Result<T, ValidationError>,
) -> Result<Option<T>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => parse(obj, field).map(Some),
    }
}

fn address(obj: &Map<String, Value>, field: &'static str) -> Result<Address, ValidationError> {
    let raw = obj.get(field).and_then(Value::as_str).unwrap_or_default();
    parse_address(raw).ok_or_else(|| ValidationError::InvalidAddress {
        field,
        value: raw.to_string(),
    })
}

/// Parses a 20-byte address; mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Option<Address> {
    let digits = hex_digits(raw).filter(|d| d.len() == 40)?;
    let address = Address::from_slice(&hex::decode(digits).ok()?);
    let mixed_case = digits.chars().any(|c| c.is_ascii_lowercase())
        && digits.chars().any(|c| c.is_ascii_uppercase());
    if mixed_case && to_checksum(&address, None) != raw {
        return None;
    }
    Some(address)
}

fn bytes(obj: &Map<String, Value>, field: &'static str) -> Result<Bytes, ValidationError> {
    obj.get(field)
        .and_then(Value::as_str)
        .and_then(hex_digits)
        .and_then(|digits| hex::decode(digits).ok())
        .map(Bytes::from)
        .ok_or(ValidationError::InvalidHex(field))
}

fn quantity(obj: &Map<String, Value>, field: &'static str) -> Result<U256, ValidationError> {
    obj.get(field)
        .and_then(Value::as_str)
        .and_then(parse_quantity)
        .ok_or(ValidationError::InvalidQuantity(field))
}

/// Parses a `0x`-prefixed hex quantity; a bare `0x` is zero.
pub fn parse_quantity(raw: &str) -> Option<U256> {
    let digits = hex_digits(raw)?.trim_start_matches('0');
    if digits.is_empty() {
        return Some(U256::zero());
    }
    if digits.len() > 64 {
        return None;
    }
    U256::from_str_radix(digits, 16).ok()
}
