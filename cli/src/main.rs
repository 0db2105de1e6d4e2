//! keyshard-cli: command-line front end for the transfer engine
//!
//! Indexer settings come from the environment (`INDEXER_*`, optionally via a
//! `.env` file). The signing key is read from `SOURCE_KEY` and never accepted
//! as an argument, so it stays out of shell history and process listings.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use keyshard_transfer::{
    coins_to_base_units, estimate_fee, format_coins, BalanceAggregator, BalancePoller, FeeRate,
    FeeSpeed, IndexerClient, IndexerConfig, KeyManager, Network, Secp256k1KeyManager, SourceKey,
    TransferMode, TransferOrchestrator, TransferRequest, DEFAULT_POLL_INTERVAL,
    FEE_MODEL_OUTPUT_COUNT,
};

const SOURCE_KEY_VAR: &str = "SOURCE_KEY";

/// Threshold-key transfer client for P2PKH addresses.
#[derive(Parser)]
#[command(name = "keyshard-cli")]
#[command(version, about = "Build, sign and broadcast transfers through a public indexer")]
struct Cli {
    /// Network (main or test). Defaults to INDEXER_NETWORK.
    #[arg(short, long, global = true)]
    network: Option<Network>,

    /// Indexer API root. Defaults to INDEXER_URL.
    #[arg(long, global = true)]
    indexer_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the address and public key for SOURCE_KEY.
    Address,
    /// Query an address balance.
    Balance(AddressArgs),
    /// Poll an address balance until interrupted.
    Watch(WatchArgs),
    /// List fee presets and what they cost.
    Fees(FeesArgs),
    /// Predict fee and send amount without signing.
    Quote(QuoteArgs),
    /// Sign with SOURCE_KEY and broadcast a transfer.
    Transfer(TransferArgs),
}

#[derive(Args)]
struct AddressArgs {
    /// Address to query (default: the SOURCE_KEY address).
    #[arg(short, long)]
    address: Option<String>,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    target: AddressArgs,

    /// Seconds between refreshes.
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    interval: u64,
}

#[derive(Args)]
struct FeesArgs {
    /// Number of inputs to price.
    #[arg(short, long, default_value_t = 1)]
    inputs: usize,
}

#[derive(Args)]
struct AmountArgs {
    /// Amount to send in coins (e.g., 0.0003).
    #[arg(long, conflicts_with = "sweep")]
    amount: Option<f64>,

    /// Send the whole balance minus the fee.
    #[arg(long)]
    sweep: bool,

    /// Fee preset (slow, normal, fast).
    #[arg(short, long, conflicts_with = "fee_rate")]
    speed: Option<FeeSpeed>,

    /// Custom fee rate in base units per byte.
    #[arg(long)]
    fee_rate: Option<f64>,
}

impl AmountArgs {
    fn mode(&self) -> Result<TransferMode> {
        let amount = self.amount.map(coins_to_base_units);
        Ok(TransferMode::from_parts(amount, self.sweep)?)
    }

    fn fee_rate(&self) -> Result<FeeRate> {
        match (self.speed, self.fee_rate) {
            (_, Some(rate)) => Ok(FeeRate::new(rate)?),
            (Some(speed), None) => Ok(speed.rate()),
            (None, None) => Ok(FeeRate::DEFAULT),
        }
    }
}

#[derive(Args)]
struct QuoteArgs {
    #[command(flatten)]
    target: AddressArgs,

    #[command(flatten)]
    amount: AmountArgs,
}

#[derive(Args)]
struct TransferArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    #[command(flatten)]
    amount: AmountArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = IndexerConfig::from_env();
    if let Some(network) = cli.network {
        config = config.with_network(network);
    }
    if let Some(url) = &cli.indexer_url {
        config = config.with_base_url(url.clone());
    }

    match cli.command {
        Commands::Address => show_address(&config),
        Commands::Balance(args) => show_balance(&config, args).await,
        Commands::Watch(args) => watch_balance(&config, args).await,
        Commands::Fees(args) => show_fees(args),
        Commands::Quote(args) => show_quote(&config, args).await,
        Commands::Transfer(args) => run_transfer(&config, args).await,
    }
}

fn key_manager() -> Secp256k1KeyManager {
    Secp256k1KeyManager::with_rng(&mut bitcoin::secp256k1::rand::thread_rng())
}

fn load_source_key(network: Network) -> Result<SourceKey> {
    let secret = env::var(SOURCE_KEY_VAR)
        .with_context(|| format!("{} environment variable not set", SOURCE_KEY_VAR))?;
    Ok(SourceKey::parse(&secret, network)?)
}

/// Explicit address, or the one derived from SOURCE_KEY
fn resolve_address(config: &IndexerConfig, args: &AddressArgs) -> Result<String> {
    match &args.address {
        Some(address) => Ok(address.trim().to_string()),
        None => {
            let key = load_source_key(config.network)?;
            Ok(key_manager().derive_address(&key, config.network)?)
        }
    }
}

fn show_address(config: &IndexerConfig) -> Result<()> {
    let key = load_source_key(config.network)?;
    let keys = key_manager();
    let address = keys.derive_address(&key, config.network)?;

    println!("Address:    {}", address);
    println!("Public key: {}", keys.derive_public_key(&key)?);
    println!("Explorer:   {}", config.network.address_explorer_url(&address));
    Ok(())
}

async fn show_balance(config: &IndexerConfig, args: AddressArgs) -> Result<()> {
    let address = resolve_address(config, &args)?;
    let balances = BalanceAggregator::new(IndexerClient::new(config)?);
    let snapshot = balances.fetch_balance(config.network, &address).await?;

    println!("Address:     {}", snapshot.address);
    println!("Confirmed:   {}", format_coins(snapshot.confirmed_base_units));
    println!("Unconfirmed: {} base units", snapshot.unconfirmed_base_units);
    println!("Total:       {}", format_coins(snapshot.total_base_units));
    Ok(())
}

async fn watch_balance(config: &IndexerConfig, args: WatchArgs) -> Result<()> {
    if args.interval == 0 {
        bail!("Interval must be at least one second");
    }
    let address = resolve_address(config, &args.target)?;
    let balances = BalanceAggregator::new(IndexerClient::new(config)?);

    println!("Watching {} every {}s (Ctrl-C to stop)", address, args.interval);
    let handle = BalancePoller::start(
        balances,
        config.network,
        address,
        Duration::from_secs(args.interval),
        |refreshed| match refreshed {
            Ok(snapshot) => println!(
                "[{}] total {} (unconfirmed {})",
                snapshot.fetched_at.format("%H:%M:%S"),
                format_coins(snapshot.total_base_units),
                snapshot.unconfirmed_base_units
            ),
            Err(e) => eprintln!("refresh failed: {}", e),
        },
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}

fn show_fees(args: FeesArgs) -> Result<()> {
    if args.inputs == 0 {
        bail!("At least one input is required");
    }
    for speed in FeeSpeed::ALL {
        let fee = estimate_fee(args.inputs, FEE_MODEL_OUTPUT_COUNT, speed.rate());
        println!(
            "{:<7} {:>4} base units/byte  fee {} base units",
            speed.name(),
            speed.rate().per_byte(),
            fee
        );
    }
    Ok(())
}

async fn show_quote(config: &IndexerConfig, args: QuoteArgs) -> Result<()> {
    let address = resolve_address(config, &args.target)?;
    let orchestrator = TransferOrchestrator::new(config, key_manager())?;
    let quote = orchestrator
        .quote(
            config.network,
            &address,
            args.amount.mode()?,
            args.amount.fee_rate()?,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}

async fn run_transfer(config: &IndexerConfig, args: TransferArgs) -> Result<()> {
    let mode = args.amount.mode()?;
    let fee_rate = args.amount.fee_rate()?;
    let orchestrator = TransferOrchestrator::new(config, key_manager())?;

    let result = orchestrator
        .transfer(TransferRequest {
            source_key: load_source_key(config.network)?,
            destination: args.to,
            mode,
            network: config.network,
            fee_rate,
        })
        .await
        .context("Transfer failed")?;

    println!("Transaction ID: {}", result.txid);
    println!("Sent:           {}", format_coins(result.total_sent));
    println!("Fee:            {} base units", result.fee);
    println!("Explorer:       {}", config.network.tx_explorer_url(&result.txid));
    Ok(())
}
