// src/main.rs
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dotenv::dotenv;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use safe_userop::contracts::EntryPoint;
use safe_userop::decode::decode_user_operation;
use safe_userop::types::Factory;
use safe_userop::{
    BuildRequest, BundlerConfig, Erc4337Bundler, OpSigner, OperationError, SafeAccount, SubCall,
    TransactionManager,
};

// zero-value call with non-trivial data
const DEMO_RECIPIENT: &str = "0xbeef4dad00000000000000000000000000000000";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, env = "BUNDLER_URL")]
    bundler_url: String,

    #[clap(long, env = "ETH_RPC_URL")]
    eth_rpc_url: String,

    #[clap(long, env = "ENTRY_POINT", default_value = "0x0000000071727De22E5E9d8BAf0edAc6f37da032")]
    entry_point: Address,

    #[clap(long, env = "PRIVATE_KEY")]
    private_key: String,

    #[clap(long, env = "SAFE_ADDRESS")]
    safe_address: Address,

    #[clap(short, long, env = "CHAIN_ID", default_value_t = 11155111)]
    chain_id: u64,

    #[clap(long, env = "USE_PAYMASTER")]
    use_paymaster: bool,

    /// Added as a second owner when the Safe is deployed by this operation.
    #[clap(long, env = "RECOVERY_ADDRESS")]
    recovery_address: Option<Address>,

    #[clap(long, env = "SAFE_FACTORY", requires = "factory_data")]
    factory: Option<Address>,

    #[clap(long, env = "SAFE_FACTORY_DATA", requires = "factory")]
    factory_data: Option<Bytes>,
}

struct LocalOwner(LocalWallet);

#[async_trait]
impl OpSigner for LocalOwner {
    async fn sign(&self, hash: H256) -> anyhow::Result<Bytes> {
        Ok(self.0.sign_hash(hash)?.to_vec().into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let chain_id = args.chain_id;

    let provider = Arc::new(Provider::<Http>::try_from(args.eth_rpc_url.as_str())?);
    let wallet = args.private_key.parse::<LocalWallet>()?.with_chain_id(chain_id);
    info!("Signing with owner: {:?}", wallet.address());

    let mut safe = SafeAccount::new(provider.clone(), args.safe_address, args.entry_point);
    if let (Some(factory), Some(factory_data)) = (args.factory, args.factory_data) {
        safe = safe.with_factory(Factory {
            factory,
            factory_data,
        });
    }
    let bundler = Erc4337Bundler::new(BundlerConfig::new(args.bundler_url, args.entry_point))?;
    let manager = TransactionManager::new(LocalOwner(wallet), safe, bundler);

    let (balance, deployed) = tokio::try_join!(
        async { Ok::<_, anyhow::Error>(provider.get_balance(args.safe_address, None).await?) },
        async { Ok::<_, anyhow::Error>(manager.safe_deployed(chain_id).await?) },
    )?;
    info!(
        "Safe {:?} deployed (on chain {}): {}",
        manager.safe_address(),
        chain_id,
        deployed
    );
    if !deployed && args.factory.is_none() {
        anyhow::bail!(
            "Safe {:?} is not deployed; set SAFE_FACTORY and SAFE_FACTORY_DATA to deploy it",
            args.safe_address
        );
    }

    let mut transactions = vec![SubCall::call(
        DEMO_RECIPIENT.parse()?,
        U256::zero(),
        Bytes::from_static(&[0xbe, 0xef]),
    )];
    // runs after the user call, in the same operation
    if let Some(recovery) = args.recovery_address.filter(|_| !deployed) {
        info!("Adding recovery owner {:?}", recovery);
        transactions.push(manager.add_owner_transaction(recovery));
    }

    let (max_fee_per_gas, max_priority_fee_per_gas) = provider.estimate_eip1559_fees(None).await?;
    let nonce = EntryPoint::new(args.entry_point, provider.clone())
        .get_nonce(args.safe_address, U256::zero())
        .call()
        .await?;

    let op = manager
        .build_transaction(BuildRequest {
            chain_id,
            nonce,
            transactions,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            use_paymaster: args.use_paymaster,
            deployed: Some(deployed),
        })
        .await?;
    let decoded = decode_user_operation(chain_id, &op)?;
    info!("Unsigned user operation: {}", serde_json::to_string_pretty(&op)?);
    info!("Decoded: {}", serde_json::to_string(&decoded)?);

    match manager.assert_funded(&op, balance) {
        Err(OperationError::InsufficientFunds { safe, .. }) => {
            warn!("Safe {:?} insufficiently funded to perform this transaction. Exiting...", safe);
            return Ok(());
        }
        other => other?,
    }

    info!("Safe operation hash: {:?}", manager.op_hash(chain_id, &op)?);
    let signature = manager.sign_transaction(chain_id, &op).await?;
    let op = op.with_signature(signature);

    info!("Executing user operation...");
    let user_op_hash = manager.execute_transaction(&op).await?;
    info!("User operation hash: {:?}", user_op_hash);

    let receipt = manager.get_op_receipt(user_op_hash).await?;
    if receipt.success {
        info!("User operation included: {}", serde_json::to_string_pretty(&receipt)?);
    } else {
        warn!(
            "User operation reverted: {}",
            receipt.reason.as_deref().unwrap_or("no reason given")
        );
    }

    Ok(())
}
