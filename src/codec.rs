// src/codec.rs
//! Fixed-width binary records used by the Safe 4337 module and the entry point.
use ethers::types::{Address, Bytes, U256};

use crate::error::CodecError;
use crate::types::{PaymasterData, PaymasterFields, SubCall};

const VALIDITY_BYTES: usize = 6;
const GAS_BYTES: usize = 16;
const ADDRESS_BYTES: usize = 20;
const WORD_BYTES: usize = 32;
const PAYMASTER_HEADER_BYTES: usize = ADDRESS_BYTES + 2 * GAS_BYTES;
const MULTISEND_HEADER_BYTES: usize = 1 + ADDRESS_BYTES + 2 * WORD_BYTES;

/// Signature with no signer data, sent wherever the bundler wants a signature shape before signing.
pub const PLACEHOLDER_SIG: [u8; 2 * VALIDITY_BYTES] = [0; 2 * VALIDITY_BYTES];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSignature {
    pub valid_from: u64,
    pub valid_to: u64,
    pub signature: Bytes,
}

/// Big-endian `value` in exactly `width` bytes.
fn uint_be(value: U256, width: usize, field: &'static str) -> Result<Vec<u8>, CodecError> {
    if value.bits() > width * 8 {
        return Err(CodecError::ValueOverflow {
            field,
            bits: width * 8,
        });
    }
    let mut word = [0u8; WORD_BYTES];
    value.to_big_endian(&mut word);
    Ok(word[WORD_BYTES - width..].to_vec())
}

fn take<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], CodecError> {
    let end = offset.checked_add(len).filter(|end| *end <= data.len());
    match end {
        Some(end) => Ok(&data[offset..end]),
        None => Err(CodecError::Truncated {
            needed: offset.saturating_add(len),
            available: data.len(),
        }),
    }
}

/// `uint48 validFrom ‖ uint48 validTo ‖ signature`.
pub fn pack_signature(signature: &[u8], valid_from: u64, valid_to: u64) -> Result<Bytes, CodecError> {
    let mut packed = Vec::with_capacity(2 * VALIDITY_BYTES + signature.len());
    packed.extend(uint_be(valid_from.into(), VALIDITY_BYTES, "validFrom")?);
    packed.extend(uint_be(valid_to.into(), VALIDITY_BYTES, "validTo")?);
    packed.extend_from_slice(signature);
    Ok(packed.into())
}

pub fn unpack_signature(packed: &[u8]) -> Result<PackedSignature, CodecError> {
    let valid_from = U256::from_big_endian(take(packed, 0, VALIDITY_BYTES)?).as_u64();
    let valid_to = U256::from_big_endian(take(packed, VALIDITY_BYTES, VALIDITY_BYTES)?).as_u64();
    Ok(PackedSignature {
        valid_from,
        valid_to,
        signature: packed[2 * VALIDITY_BYTES..].to_vec().into(),
    })
}

/// `uint128 hi ‖ uint128 lo`, e.g. verification and call gas limits in one word.
pub fn pack_gas(hi: U256, lo: U256) -> Result<[u8; 32], CodecError> {
    let mut packed = [0u8; 32];
    packed[..GAS_BYTES].copy_from_slice(&uint_be(hi, GAS_BYTES, "hi")?);
    packed[GAS_BYTES..].copy_from_slice(&uint_be(lo, GAS_BYTES, "lo")?);
    Ok(packed)
}

/// `paymaster ‖ uint128 verificationGas ‖ uint128 postOpGas ‖ paymasterData`, or empty without a paymaster.
pub fn pack_paymaster_data(data: &PaymasterData) -> Result<Bytes, CodecError> {
    match data.sponsorship() {
        Some(fields) => pack_paymaster_fields(&fields),
        None => Ok(Bytes::default()),
    }
}

pub fn pack_paymaster_fields(fields: &PaymasterFields) -> Result<Bytes, CodecError> {
    let mut packed = Vec::with_capacity(PAYMASTER_HEADER_BYTES + fields.paymaster_data.len());
    packed.extend_from_slice(fields.paymaster.as_bytes());
    packed.extend(uint_be(
        fields.paymaster_verification_gas_limit,
        GAS_BYTES,
        "paymasterVerificationGasLimit",
    )?);
    packed.extend(uint_be(
        fields.paymaster_post_op_gas_limit,
        GAS_BYTES,
        "paymasterPostOpGasLimit",
    )?);
    packed.extend_from_slice(&fields.paymaster_data);
    Ok(packed.into())
}

/// Inverse of [`pack_paymaster_data`]: an empty record means no paymaster.
pub fn unpack_paymaster_data(packed: &[u8]) -> Result<Option<PaymasterFields>, CodecError> {
    if packed.is_empty() {
        return Ok(None);
    }
    let paymaster = Address::from_slice(take(packed, 0, ADDRESS_BYTES)?);
    let verification = take(packed, ADDRESS_BYTES, GAS_BYTES)?;
    let post_op = take(packed, ADDRESS_BYTES + GAS_BYTES, GAS_BYTES)?;
    Ok(Some(PaymasterFields {
        paymaster,
        paymaster_verification_gas_limit: U256::from_big_endian(verification),
        paymaster_post_op_gas_limit: U256::from_big_endian(post_op),
        paymaster_data: packed[PAYMASTER_HEADER_BYTES..].to_vec().into(),
    }))
}

/// MultiSend batch: per call `uint8 operation ‖ to ‖ uint256 value ‖ uint256 len ‖ data`.
pub fn pack_multisend(calls: &[SubCall]) -> Bytes {
    let mut packed = Vec::new();
    for call in calls {
        let mut value = [0u8; WORD_BYTES];
        call.value.to_big_endian(&mut value);
        let mut len = [0u8; WORD_BYTES];
        U256::from(call.data.len()).to_big_endian(&mut len);

        packed.push(call.operation.unwrap_or(0));
        packed.extend_from_slice(call.to.as_bytes());
        packed.extend_from_slice(&value);
        packed.extend_from_slice(&len);
        packed.extend_from_slice(&call.data);
    }
    packed.into()
}

/// Parses a MultiSend batch. Any record that overruns the input fails the whole batch.
pub fn unpack_multisend(packed: &[u8]) -> Result<Vec<SubCall>, CodecError> {
    let mut calls = Vec::new();
    let mut offset = 0;
    while offset < packed.len() {
        let header = take(packed, offset, MULTISEND_HEADER_BYTES)?;
        let operation = header[0];
        let to = Address::from_slice(&header[1..1 + ADDRESS_BYTES]);
        let value = U256::from_big_endian(&header[1 + ADDRESS_BYTES..1 + ADDRESS_BYTES + WORD_BYTES]);
        let len = U256::from_big_endian(&header[1 + ADDRESS_BYTES + WORD_BYTES..]);
        offset += MULTISEND_HEADER_BYTES;

        let available = packed.len() - offset;
        if len > U256::from(available) {
            let needed = if len.bits() > 64 {
                usize::MAX
            } else {
                offset.saturating_add(len.low_u64() as usize)
            };
            return Err(CodecError::Truncated {
                needed,
                available: packed.len(),
            });
        }
        let len = len.as_usize();
        let data = take(packed, offset, len)?;
        offset += len;

        calls.push(SubCall {
            to,
            value,
            data: data.to_vec().into(),
            operation: Some(operation),
        });
    }
    Ok(calls)
}
