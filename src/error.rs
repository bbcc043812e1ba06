// src/error.rs
use std::time::Duration;

use ethers::types::{H256, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{field} does not fit in {bits} bits")]
    ValueOverflow { field: &'static str, bits: usize },

    #[error("Packed record truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Structural rejection of an untyped value, naming the first field that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Expected a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid address in {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid hex bytes in {0}")]
    InvalidHex(&'static str),

    #[error("Invalid hex quantity in {0}")]
    InvalidQuantity(&'static str),

    #[error("{field} is set but {requires} is not")]
    OrphanedField {
        field: &'static str,
        requires: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid RLP transaction: {0}")]
    InvalidRlp(String),

    #[error("Transaction missing {0}")]
    MissingField(&'static str),

    #[error("Chain id mismatch: request is for {expected}, payload is for {actual}")]
    ChainIdMismatch { expected: u64, actual: U256 },

    #[error("Invalid call data: {0}")]
    InvalidCallData(String),

    #[error("Amount overflow while estimating cost")]
    Overflow,

    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Failed to send user op with: {0}")]
    SendFailed(String),

    #[error("Bundler RPC error: {0}")]
    Rpc(String),

    #[error("No receipt for user op {hash:?} within {waited:?}")]
    ReceiptTimeout { hash: H256, waited: Duration },

    #[error("Invalid bundler url: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Safe {safe:?} insufficiently funded: balance {balance}, required {required}")]
    InsufficientFunds {
        safe: ethers::types::Address,
        balance: U256,
        required: U256,
    },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Deployment lookup failed: {0}")]
    Deployment(String),

    #[error("No transactions to execute")]
    EmptyBatch,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
