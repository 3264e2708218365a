use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use rean_blockchain::{Store, SystemClock};
use rean_crypto::{DigestSigner, DigestVerifier, Signer};
use rean_state_transition::generate_genesis;
use rean_storage::MemoryStore;
use tracing::info;

mod clock;
mod config;
mod duties;
mod handler;
mod node;
mod rpc;

const ASCII_ART: &str = r#"
 _ __ ___  __ _ _ __
| '__/ _ \/ _` | '_ \
| | |  __/ (_| | | | |
|_|  \___|\__,_|_| |_|
"#;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, clap::Parser)]
#[command(name = "rean", version, about = "Lean Ethereum consensus node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the consensus node.
    Run(RunOptions),
    /// Generate a genesis validator set for local devnets.
    Keygen(KeygenOptions),
}

#[derive(Debug, clap::Args)]
struct RunOptions {
    /// Path to the genesis config YAML (GENESIS_TIME, GENESIS_VALIDATORS).
    #[arg(long)]
    config: String,
    /// Path to the validator assignment YAML.
    #[arg(long)]
    validators: String,
    /// This node's name in the assignment file.
    #[arg(long)]
    node: String,
    /// Devnet identifier used in gossip topic names.
    #[arg(long, default_value = "devnet0")]
    devnet_id: String,
    /// Port for the metrics/health HTTP endpoint.
    #[arg(long, default_value_t = 9600)]
    metrics_port: u16,
    /// Log filter (e.g. "info", "debug", "rean_blockchain=debug").
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, clap::Args)]
struct KeygenOptions {
    /// Number of validators to generate.
    #[arg(long, default_value_t = 5)]
    count: u64,
    /// Genesis time to embed in the emitted config.
    #[arg(long, default_value_t = 0)]
    genesis_time: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(options) => run(options).await,
        Command::Keygen(options) => keygen(options),
    }
}

async fn run(options: RunOptions) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&options.log_level)
                .expect("invalid log filter"),
        )
        .init();

    println!("{ASCII_ART}");

    let genesis = config::load_genesis_config(&options.config).expect("failed to load genesis config");
    let registry = config::load_validators(&options.validators).expect("failed to load validators");
    registry
        .validate(genesis.validators.len() as u64)
        .expect("invalid validator assignments");
    let indices = registry.indices_for(&options.node);
    assert!(
        !indices.is_empty(),
        "node {} has no validator assignments",
        options.node
    );

    // Devnet keys are derived from the validator index; the genesis
    // config must have been produced by `rean keygen` for signatures to
    // verify across nodes.
    let signers: HashMap<u64, DigestSigner> = indices
        .iter()
        .map(|index| (*index, DigestSigner::from_seed(*index)))
        .collect();
    for (index, signer) in &signers {
        let registered = &genesis.validators[*index as usize].pubkey;
        assert_eq!(
            registered,
            &signer.public_key(),
            "key for validator {index} does not match the genesis registry"
        );
    }

    let genesis_state = generate_genesis(genesis.genesis_time, genesis.validators);
    let storage = Arc::new(MemoryStore::new());
    let store = Arc::new(
        Store::from_genesis(genesis_state, storage, DigestVerifier)
            .with_clock(Arc::new(SystemClock)),
    );

    rpc::set_node_info(&options.node, VERSION);
    rpc::update_validators_count(indices.len() as u64);
    rpc::serve_metrics(options.metrics_port);

    info!(
        node = %options.node,
        version = VERSION,
        validators = ?indices,
        genesis_time = genesis.genesis_time,
        "rean node starting"
    );

    let clock = clock::NodeClock::new(genesis.genesis_time);
    let gossip_handler = Arc::new(handler::Handler::new(Arc::clone(&store)));
    let duties = duties::Duties::new(
        indices,
        signers,
        Arc::clone(&store),
        duties::Publisher::new(options.devnet_id, gossip_handler),
    );

    node::Node::new(store, clock, duties).run().await;
}

fn keygen(options: KeygenOptions) {
    println!("GENESIS_TIME: {}", options.genesis_time);
    println!("GENESIS_VALIDATORS:");
    for index in 0..options.count {
        let pubkey = DigestSigner::from_seed(index).public_key();
        println!("  - \"0x{}\"", hex::encode(&pubkey[..]));
    }
}
