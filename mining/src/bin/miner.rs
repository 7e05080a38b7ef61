use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;
use primitive_types::{H160, U256};
use rpc_core::{ChainRpc, HttpRpcClient, TransactionSigner};
use wallet::{Keys, LocalSigner};

use mining::events::log_observer;
use mining::prelude::*;

/// Proof-of-work miner for an on-chain incentive contract
#[derive(Parser, Debug)]
#[command(name = "pow-miner")]
#[command(about = "Keeps a compute engine supplied with proof-of-work jobs", long_about = None)]
struct Args {
    /// JSON-RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    endpoint: String,

    /// Incentive contract address
    #[arg(short, long)]
    contract: String,

    /// Reward recipient address
    #[arg(short, long)]
    miner: String,

    /// Hex-encoded private key of the submitting account
    #[arg(short, long, env = "MINER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Tip candidate addresses (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    tip_candidates: Vec<String>,

    /// Tip share in basis points
    #[arg(long, default_value = "500")]
    tip_split_bps: u64,

    /// Target average seconds between proofs
    #[arg(long, default_value = "86400")]
    proof_period: u64,

    /// Chain sync interval (seconds)
    #[arg(long, default_value = "60")]
    sync_interval: u64,

    /// Blocks behind head used as the mining anchor
    #[arg(long, default_value = "6")]
    confirmation_lag: u64,

    /// Path to the compute-engine binary
    #[arg(long, default_value = "bin/pow_engine")]
    engine_path: PathBuf,

    /// Engine worker threads
    #[arg(long)]
    cores: Option<usize>,

    /// Initial hashrate estimate (H/s)
    #[arg(long, default_value = "1000000")]
    initial_hashrate: f64,

    /// Gas price ceiling (gwei); proofs are withheld above it
    #[arg(long, default_value = "1000")]
    gas_ceiling_gwei: u64,

    /// Gas price floor (gwei)
    #[arg(long, default_value = "1")]
    gas_floor_gwei: u64,

    /// Gas limit for proof transactions
    #[arg(long, default_value = "500000")]
    gas_limit: u64,

    /// Chain id (queried from the endpoint when omitted)
    #[arg(long)]
    chain_id: Option<u64>,

    /// Speed-tier fee estimate URL
    #[arg(long)]
    fee_oracle_url: Option<String>,

    /// Tier field to read from the fee estimate
    #[arg(long, default_value = "fast")]
    fee_oracle_tier: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_address(s: &str) -> Result<H160, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| format!("{s:?} is not a hex address: {e}"))?;
    if bytes.len() != 20 {
        return Err(format!("{s:?} is not a 20-byte address"));
    }
    Ok(H160::from_slice(&bytes))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.parse()?)
        .init();

    info!("PoW miner starting...");
    info!("RPC endpoint: {}", args.endpoint);

    let keys = Keys::from_hex(&args.private_key)?;
    let submitter = keys.address();
    let signer: Arc<dyn TransactionSigner> = Arc::new(LocalSigner::new(keys));
    info!("Submitting account: {submitter:?}");

    let rpc = HttpRpcClient::new(&args.endpoint)?;
    let chain_id = match args.chain_id {
        Some(id) => id,
        None => rpc.chain_id()?,
    };
    info!("Chain id: {chain_id}");

    let tip_candidates = args
        .tip_candidates
        .iter()
        .map(|s| parse_address(s))
        .collect::<Result<Vec<_>, _>>()?;

    let config = MinerConfig {
        miner: parse_address(&args.miner)?,
        submitter,
        contract: parse_address(&args.contract)?,
        tip_candidates,
        tip_split_bps: args.tip_split_bps,
        proof_period_secs: args.proof_period,
        sync_interval: Duration::from_secs(args.sync_interval),
        confirmation_lag: args.confirmation_lag,
        engine_path: args.engine_path,
        cores: args.cores.unwrap_or_else(num_cpus::get),
        initial_hashrate: args.initial_hashrate,
        gas: GasConfig {
            floor_gwei: args.gas_floor_gwei,
            ceiling_gwei: args.gas_ceiling_gwei,
            cap_wei: U256::from(args.gas_ceiling_gwei) * U256::from(1_000_000_000u64),
            ..GasConfig::default()
        },
        gas_limit: args.gas_limit,
        chain_id,
        fee_oracle_url: args.fee_oracle_url,
        fee_oracle_tier: args.fee_oracle_tier,
    };
    info!(
        "Miner config: {} cores, engine {}, {} tip candidates",
        config.cores,
        config.engine_path.display(),
        config.tip_candidates.len()
    );

    let rpc: Arc<dyn ChainRpc> = Arc::new(rpc);
    let mut miner = MiningOrchestrator::new(config, rpc, signer, log_observer());
    miner.start()?;

    info!("Mining. Press ENTER to stop.");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    match miner.stop() {
        // the session may already have ended on its own
        Ok(()) | Err(MinerError::NotRunning) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
