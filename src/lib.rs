// src/lib.rs
//! Builds, decodes and submits ERC-4337 user operations for Safe accounts.
pub mod bundler;
pub mod codec;
pub mod contracts;
pub mod decode;
pub mod error;
pub mod guards;
pub mod manager;
pub mod safe;
pub mod types;

pub use bundler::{BundlerConfig, Erc4337Bundler};
pub use decode::{decode_request, decode_tx_data};
pub use error::{BundlerError, CodecError, DecodeError, OperationError, ValidationError};
pub use manager::{BuildRequest, OpSigner, SafeDeployment, TransactionManager};
pub use safe::SafeAccount;
pub use types::{
    DecodedRequest, EncodedSignRequest, PaymasterData, SignPayload, SubCall, UnsignedUserOperation,
    UserOperation, UserOperationReceipt,
};
