//! Command line for a token contract deployed behind a JSON-RPC endpoint.
//!
//! Every command maps to a single client operation: `supply` and `balance`
//! are read-only calls, `mint` and `transfer` broadcast a transaction and wait
//! for its confirmation, `logs` queries past events and `events` follows new
//! events until interrupted.

mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use contract_rpc::prelude::*;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

/// Token contract command line
#[derive(Parser, Debug)]
#[command(name = "contract-rpc")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// JSON-RPC endpoint, optionally with the default sender as user name
    /// (http://<account>:<password>@host:port)
    #[arg(long, env = "ETH_RPC")]
    rpc: String,

    /// Contract artifact: a solar repository or, with --network, a truffle
    /// build file
    #[arg(long, env = "CONTRACT_ARTIFACT", default_value = "solar.development.json")]
    artifact: PathBuf,

    /// Contract key in the solar repository
    #[arg(long, env = "CONTRACT_NAME", default_value = "contracts/MyToken.sol")]
    contract: String,

    /// Network id of the deployment in a truffle build file
    #[arg(long)]
    network: Option<String>,

    /// Gas price of calls and transactions
    #[arg(long, default_value = "100")]
    gas_price: u64,

    /// Blocks to wait for on top of the block a transaction was mined in,
    /// 0 returns as soon as it is mined
    #[arg(long, default_value = "0")]
    confirmations: usize,

    /// Blocks an event needs on top of its block before `logs` and `events`
    /// report it, counted like --confirmations
    #[arg(long, default_value = "0")]
    min_confirmations: u64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the total token supply
    #[command(alias = "totalSupply")]
    Supply,

    /// Print the token balance of an account
    Balance {
        /// Account address
        owner: String,
    },

    /// Mint tokens to an account
    Mint {
        /// Receiving account address
        to: String,
        /// Amount of tokens
        amount: String,
    },

    /// Transfer tokens between accounts
    Transfer {
        /// Sending account address
        from: String,
        /// Receiving account address
        to: String,
        /// Amount of tokens
        amount: String,
    },

    /// Print contract events in a block range
    Logs {
        /// First block, defaults to genesis
        from_block: Option<u64>,
        /// Last block, a number or "latest"
        #[arg(default_value = "latest")]
        to_block: BlockTag,
    },

    /// Follow new contract events until interrupted
    Events,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let descriptor = load_descriptor(&cli)?;
    let endpoint = Endpoint::parse(&cli.rpc).context("invalid --rpc endpoint")?;
    let config = ClientConfig::default().defaults(MethodDefaults {
        gas_price: Some(cli.gas_price.into()),
        ..Default::default()
    });
    let client = Client::connect(endpoint, descriptor, config)
        .context("failed to create HTTP transport")?;

    match &cli.command {
        Commands::Supply => {
            let supply = call(&client, "totalSupply", &[]).await?;
            println!("supply {}", supply);
        }
        Commands::Balance { owner } => {
            let balance = call(&client, "balanceOf", &[owner]).await?;
            println!("balance: {}", balance);
        }
        Commands::Mint { to, amount } => {
            let tx = send(&client, "mint", &[to, amount], CallOptions::default()).await?;
            println!("mint tx: {:?}", tx.hash);
            confirm(&client, &tx, cli.confirmations).await?;
        }
        Commands::Transfer { from, to, amount } => {
            let from = contract_rpc::common::str::parse_address(from)?;
            let options = CallOptions::new().from(from);
            let tx = send(&client, "transfer", &[to, amount], options).await?;
            println!("transfer tx: {:?}", tx.hash);
            confirm(&client, &tx, cli.confirmations).await?;
        }
        Commands::Logs {
            from_block,
            to_block,
        } => {
            let query = LogQuery::new()
                .from_block(from_block.unwrap_or_default())
                .to_block(*to_block)
                .min_confirmations(cli.min_confirmations);
            let logs = client.logs(&query).await?;
            let logs = logs.iter().map(output::log_entry).collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
        Commands::Events => follow_events(&client, cli.min_confirmations).await?,
    }

    Ok(())
}

fn load_descriptor(cli: &Cli) -> Result<ContractDescriptor> {
    let descriptor = match &cli.network {
        Some(network) => TruffleArtifact::load(&cli.artifact)?.descriptor(network)?,
        None => SolarRepository::load(&cli.artifact)?.descriptor(&cli.contract)?,
    };
    info!(
        "using contract {} at {:?}",
        descriptor.name, descriptor.address
    );

    Ok(descriptor)
}

/// Calls a single-output read-only function with string arguments.
async fn call(client: &Client<Http>, name: &str, args: &[&String]) -> Result<String> {
    let (_, tokens) = client.descriptor().resolve_function_str(name, args)?;
    let result = client.call(name, &tokens, CallOptions::default()).await?;
    let value = result
        .first()
        .with_context(|| format!("{} returned no outputs", name))?;

    Ok(match output::token(value) {
        serde_json::Value::String(value) => value,
        value => value.to_string(),
    })
}

async fn send(
    client: &Client<Http>,
    name: &str,
    args: &[&String],
    options: CallOptions,
) -> Result<Transaction> {
    let (_, tokens) = client.descriptor().resolve_function_str(name, args)?;
    let tx = client.send(name, &tokens, options).await.map_err(|err| {
        match err.revert_reason() {
            Some(reason) => anyhow::Error::new(err).context(format!("reverted: {}", reason)),
            None => err.into(),
        }
    })?;
    println!("{}", serde_json::to_string_pretty(&output::transaction(&tx))?);

    Ok(tx)
}

async fn confirm(client: &Client<Http>, tx: &Transaction, confirmations: usize) -> Result<()> {
    info!("waiting for {:?} with {} confirmations", tx.hash, confirmations);
    let receipt = client.confirm(tx, confirmations).await?;
    println!(
        "tx receipt: {}",
        serde_json::to_string_pretty(&output::receipt(&receipt))?
    );

    Ok(())
}

async fn follow_events(client: &Client<Http>, min_confirmations: u64) -> Result<()> {
    println!("Subscribed to contract events");
    println!("Ctrl-C to terminate events subscription");

    let (handle, signal) = cancellation();
    let subscription = client.subscribe_logs_with(
        SubscribeParams::default().min_confirmations(min_confirmations),
        signal,
        |entry| match serde_json::to_string_pretty(&output::log_entry(&entry)) {
            Ok(json) => println!("{}", json),
            Err(err) => log::warn!("cannot render event: {}", err),
        },
    );

    let finished = subscription.join();
    tokio::pin!(finished);
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            handle.cancel();
            (&mut finished).await?;
        }
        result = &mut finished => result?,
    }

    Ok(())
}
