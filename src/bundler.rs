// src/bundler.rs
use std::time::Duration;

use ethers::types::{Address, Bytes, H256, U256};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::codec::PLACEHOLDER_SIG;
use crate::error::BundlerError;
use crate::types::{PaymasterData, UnsignedUserOperation, UserOperation, UserOperationReceipt};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

// Gas defaults when no paymaster estimates them. An undeployed Safe also pays for its deployment.
const UNDEPLOYED_VERIFICATION_GAS: u64 = 500_000;
const DEPLOYED_VERIFICATION_GAS: u64 = 100_000;
const DEFAULT_CALL_GAS: u64 = 100_000;
const DEFAULT_PRE_VERIFICATION_GAS: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct BundlerConfig {
    pub url: String,
    pub entry_point: Address,
    pub poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl BundlerConfig {
    pub fn new(url: impl Into<String>, entry_point: Address) -> Self {
        Self {
            url: url.into(),
            entry_point,
            poll_interval: DEFAULT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct SponsorRequest<'a> {
    #[serde(flatten)]
    op: &'a UnsignedUserOperation,
    signature: Bytes,
}

/// Client for an ERC-4337 bundler. Holds no state besides its configuration,
/// so one instance can serve concurrent callers.
pub struct Erc4337Bundler<C = HttpClient> {
    client: C,
    entry_point: Address,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl Erc4337Bundler<HttpClient> {
    pub fn new(config: BundlerConfig) -> Result<Self, BundlerError> {
        let client = HttpClientBuilder::default()
            .build(&config.url)
            .map_err(|e| BundlerError::InvalidUrl(e.to_string()))?;

        info!("Initialized bundler client for entry point: {:?}", config.entry_point);

        Ok(Self::with_client(client, &config))
    }
}

impl<C: ClientT + Send + Sync> Erc4337Bundler<C> {
    pub fn with_client(client: C, config: &BundlerConfig) -> Self {
        Self {
            client,
            entry_point: config.entry_point,
            poll_interval: config.poll_interval,
            receipt_timeout: config.receipt_timeout,
        }
    }

    /// Asks the bundler to sponsor `raw_op`, or synthesizes conservative gas
    /// limits locally when no sponsorship is wanted.
    pub async fn get_paymaster_data(
        &self,
        raw_op: &UnsignedUserOperation,
        use_paymaster: bool,
        safe_not_deployed: bool,
    ) -> Result<PaymasterData, BundlerError> {
        if !use_paymaster {
            return Ok(default_paymaster_data(safe_not_deployed));
        }

        info!("Requesting paymaster data for sender: {:?}", raw_op.sender);
        let request = SponsorRequest {
            op: raw_op,
            signature: Bytes::from(PLACEHOLDER_SIG.to_vec()),
        };
        let data: PaymasterData = self
            .client
            .request("pm_sponsorUserOperation", rpc_params![request, self.entry_point])
            .await
            .map_err(|e| {
                let message = rpc_message(e);
                error!("Failed to get paymaster data: {}", message);
                BundlerError::Rpc(message)
            })?;
        debug!("Paymaster data: {:?}", data);

        Ok(data)
    }

    /// Submits a signed operation and returns its user operation hash.
    pub async fn send_user_operation(&self, op: &UserOperation) -> Result<H256, BundlerError> {
        debug!("Sending user operation for sender: {:?}", op.sender);

        match self
            .client
            .request::<H256, _>("eth_sendUserOperation", rpc_params![op, self.entry_point])
            .await
        {
            Ok(hash) => {
                info!("Submitted user operation: {:?}", hash);
                Ok(hash)
            }
            Err(e) => {
                let message = rpc_message(e);
                error!("Failed to send user op: {}", message);
                Err(BundlerError::SendFailed(message))
            }
        }
    }

    /// One receipt lookup; `None` means the operation is not included yet.
    pub async fn try_get_user_op_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.client
            .request("eth_getUserOperationReceipt", rpc_params![hash])
            .await
            .map_err(|e| BundlerError::Rpc(rpc_message(e)))
    }

    /// Polls for the receipt every `poll_interval` until it appears or
    /// `receipt_timeout` elapses. An RPC error ends the wait immediately.
    ///
    /// Dropping the returned future cancels the wait.
    pub async fn get_user_op_receipt(&self, hash: H256) -> Result<UserOperationReceipt, BundlerError> {
        tokio::time::timeout(self.receipt_timeout, self.poll_receipt(hash))
            .await
            .map_err(|_| BundlerError::ReceiptTimeout {
                hash,
                waited: self.receipt_timeout,
            })?
    }

    async fn poll_receipt(&self, hash: H256) -> Result<UserOperationReceipt, BundlerError> {
        let mut interval = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match self.try_get_user_op_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!("No receipt yet for user op {:?}", hash),
                Err(e) => {
                    error!("Receipt lookup for {:?} failed: {}", hash, e);
                    return Err(e);
                }
            }
        }
    }
}

pub fn default_paymaster_data(safe_not_deployed: bool) -> PaymasterData {
    let verification_gas = if safe_not_deployed {
        UNDEPLOYED_VERIFICATION_GAS
    } else {
        DEPLOYED_VERIFICATION_GAS
    };
    PaymasterData {
        verification_gas_limit: U256::from(verification_gas),
        call_gas_limit: U256::from(DEFAULT_CALL_GAS),
        pre_verification_gas: U256::from(DEFAULT_PRE_VERIFICATION_GAS),
        ..Default::default()
    }
}

/// The remote JSON-RPC message when there is one, otherwise the transport error.
fn rpc_message(err: jsonrpsee::core::Error) -> String {
    match err {
        jsonrpsee::core::Error::Call(obj) => obj.message().to_string(),
        other => other.to_string(),
    }
}
