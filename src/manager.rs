// src/manager.rs
use async_trait::async_trait;
use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, H256, U256};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClient;
use tracing::{debug, info, warn};

use crate::bundler::Erc4337Bundler;
use crate::codec::{pack_multisend, pack_signature};
use crate::contracts::{ExecuteUserOpCall, MultiSendCall, DELEGATE_CALL, MULTI_SEND_ADDRESS};
use crate::decode::decode_call_data;
use crate::error::{DecodeError, OperationError};
use crate::types::{Factory, SubCall, UnsignedUserOperation, UserOperation, UserOperationReceipt};

/// Produces an owner signature over a Safe operation hash.
#[async_trait]
pub trait OpSigner: Send + Sync {
    async fn sign(&self, hash: H256) -> anyhow::Result<Bytes>;
}

/// The Safe account an operation is sent from.
#[async_trait]
pub trait SafeDeployment: Send + Sync {
    fn address(&self) -> Address;

    async fn is_deployed(&self, chain_id: u64) -> anyhow::Result<bool>;

    /// Call that adds `owner` to the Safe, keeping the threshold at one.
    fn add_owner_transaction(&self, owner: Address) -> SubCall;

    /// Deployment data for a Safe that does not exist yet.
    fn factory(&self) -> Option<Factory>;

    fn op_hash(&self, chain_id: u64, op: &UserOperation) -> anyhow::Result<H256>;
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub chain_id: u64,
    pub nonce: U256,
    pub transactions: Vec<SubCall>,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub use_paymaster: bool,
    /// Deployment status the caller already checked; looked up when `None`.
    pub deployed: Option<bool>,
}

pub struct TransactionManager<S, D, C = HttpClient> {
    signer: S,
    safe: D,
    bundler: Erc4337Bundler<C>,
}

impl<S, D, C> TransactionManager<S, D, C>
where
    S: OpSigner,
    D: SafeDeployment,
    C: ClientT + Send + Sync,
{
    pub fn new(signer: S, safe: D, bundler: Erc4337Bundler<C>) -> Self {
        Self {
            signer,
            safe,
            bundler,
        }
    }

    pub fn safe_address(&self) -> Address {
        self.safe.address()
    }

    pub async fn safe_deployed(&self, chain_id: u64) -> Result<bool, OperationError> {
        self.safe
            .is_deployed(chain_id)
            .await
            .map_err(|e| OperationError::Deployment(e.to_string()))
    }

    pub fn add_owner_transaction(&self, owner: Address) -> SubCall {
        self.safe.add_owner_transaction(owner)
    }

    /// Assembles an operation for `request.transactions`, attaching deployment
    /// data when the Safe is not deployed and gas limits from the bundler.
    ///
    /// An undeployed Safe without a factory is rejected before the bundler is
    /// asked for anything.
    pub async fn build_transaction(&self, request: BuildRequest) -> Result<UserOperation, OperationError> {
        let deployed = match request.deployed {
            Some(deployed) => deployed,
            None => self.safe_deployed(request.chain_id).await?,
        };
        let factory = if deployed {
            None
        } else {
            let factory = self.safe.factory().ok_or_else(|| {
                OperationError::Deployment(format!(
                    "Safe {:?} is not deployed and no factory is configured",
                    self.safe.address()
                ))
            })?;
            Some(factory)
        };
        let call_data = encode_call_data(&request.transactions)?;

        let unsigned = UnsignedUserOperation {
            sender: self.safe.address(),
            nonce: request.nonce,
            factory,
            call_data,
            max_fee_per_gas: request.max_fee_per_gas,
            max_priority_fee_per_gas: request.max_priority_fee_per_gas,
        };
        debug!("Unsigned user operation: {:?}", unsigned);

        let paymaster_data = self
            .bundler
            .get_paymaster_data(&unsigned, request.use_paymaster, !deployed)
            .await?;

        Ok(unsigned.with_paymaster_data(&paymaster_data))
    }

    pub fn op_hash(&self, chain_id: u64, op: &UserOperation) -> Result<H256, OperationError> {
        self.safe
            .op_hash(chain_id, op)
            .map_err(|e| OperationError::Signing(e.to_string()))
    }

    /// Whether `balance` covers the value `op` transfers plus, when no
    /// paymaster sponsors it, the worst-case gas.
    pub fn sufficiently_funded(&self, op: &UserOperation, balance: U256) -> Result<bool, OperationError> {
        Ok(balance >= required_funds(op)?)
    }

    pub fn assert_funded(&self, op: &UserOperation, balance: U256) -> Result<(), OperationError> {
        let required = required_funds(op)?;
        if balance < required {
            warn!(
                "Safe {:?} insufficiently funded: balance {}, required {}",
                self.safe.address(),
                balance,
                required
            );
            return Err(OperationError::InsufficientFunds {
                safe: self.safe.address(),
                balance,
                required,
            });
        }
        Ok(())
    }

    /// Owner signature over the Safe operation hash, packed as always valid.
    pub async fn sign_transaction(&self, chain_id: u64, op: &UserOperation) -> Result<Bytes, OperationError> {
        let hash = self.op_hash(chain_id, op)?;
        info!("Signing Safe operation {:?}", hash);
        let signature = self
            .signer
            .sign(hash)
            .await
            .map_err(|e| OperationError::Signing(e.to_string()))?;
        Ok(pack_signature(&signature, 0, 0)?)
    }

    pub async fn execute_transaction(&self, op: &UserOperation) -> Result<H256, OperationError> {
        if op.signature.is_none() {
            return Err(OperationError::Signing("user operation is unsigned".to_string()));
        }
        Ok(self.bundler.send_user_operation(op).await?)
    }

    pub async fn get_op_receipt(&self, hash: H256) -> Result<UserOperationReceipt, OperationError> {
        Ok(self.bundler.get_user_op_receipt(hash).await?)
    }
}

/// Module call data for `transactions`: a direct call for one, a MultiSend
/// delegate call for several.
pub fn encode_call_data(transactions: &[SubCall]) -> Result<Bytes, OperationError> {
    let call = match transactions {
        [] => return Err(OperationError::EmptyBatch),
        [single] => ExecuteUserOpCall {
            to: single.to,
            value: single.value,
            data: single.data.clone(),
            operation: single.operation.unwrap_or(0),
        },
        batch => ExecuteUserOpCall {
            to: MULTI_SEND_ADDRESS,
            value: U256::zero(),
            data: MultiSendCall {
                transactions: pack_multisend(batch),
            }
            .encode()
            .into(),
            operation: DELEGATE_CALL,
        },
    };
    Ok(call.encode().into())
}

/// Value moved by `op` plus its gas ceiling unless a paymaster pays for gas.
pub fn required_funds(op: &UserOperation) -> Result<U256, OperationError> {
    let value = decode_call_data(&op.call_data)?
        .iter()
        .try_fold(U256::zero(), |acc, call| acc.checked_add(call.value))
        .ok_or(DecodeError::Overflow)?;
    if op.paymaster.is_some() {
        return Ok(value);
    }
    let gas = op
        .total_gas_limit()
        .and_then(|gas| gas.checked_mul(op.max_fee_per_gas))
        .ok_or(DecodeError::Overflow)?;
    Ok(value.checked_add(gas).ok_or(DecodeError::Overflow)?)
}
