//! chronx-node — the ChronX full-node binary (SPEC_FULL.md §6.G).
//!
//! `node` runs the full stack: a tokio-resident libp2p swarm and JSON-RPC
//! server, plus a plain OS-thread core (block/vote/pool managers, the PBFT
//! driver, the packet dispatcher, the verifier pools, and the periodic task
//! thread) that never touches async code. `config` validates and prints the
//! effective configuration. `account`/`vrf` load or generate this node's
//! wallet file and print its public identity.

mod config;
mod packets;
mod producer;
mod proposer;
mod tasks;
mod wallet;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use chronx_consensus::{PbftDriver, PbftStateMachine, VoteManager};
use chronx_core::chain_config::ChainConfig;
use chronx_dag::{BlockManager, ProposalPeriodLevelsMap};
use chronx_executor::Executor;
use chronx_genesis::{apply_genesis, genesis_dag_block, is_fresh, GenesisParams};
use chronx_p2p::{P2pConfig, P2pNetwork};
use chronx_rpc::server::RpcServerState;
use chronx_rpc::RpcServer;
use chronx_state::StateDb;
use chronx_txpool::TxPool;

use config::{CliOverrides, NodeConfig};
use wallet::NodeWallet;

#[derive(Parser, Debug)]
#[command(name = "chronx-node", version, about = "ChronX full node")]
struct Cli {
    /// Path to the node's JSON configuration file.
    #[arg(long, global = true, default_value = "chronx-node.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node: open the store, join the network, serve RPC.
    Node {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        p2p_listen: Option<String>,
        #[arg(long, value_delimiter = ',')]
        bootstrap: Vec<String>,
        #[arg(long)]
        rpc_http_port: Option<u16>,
        #[arg(long)]
        chain_id: Option<u64>,
        #[arg(long)]
        genesis_file: Option<PathBuf>,
        #[arg(long)]
        wallet_file: Option<PathBuf>,
    },
    /// Load, validate, and print the effective configuration.
    Config,
    /// Print (or generate, with `--generate`) this node's account address.
    Account {
        #[arg(long)]
        wallet_file: Option<PathBuf>,
        #[arg(long)]
        generate: bool,
    },
    /// Print (or generate, with `--generate`) this node's VRF public key.
    Vrf {
        #[arg(long)]
        wallet_file: Option<PathBuf>,
        #[arg(long)]
        generate: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "chronx-node exiting with error");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing();

    match cli.command {
        Command::Node { data_dir, p2p_listen, bootstrap, rpc_http_port, chain_id, genesis_file, wallet_file } => {
            let overrides = CliOverrides { data_dir, p2p_listen, bootstrap, rpc_http_port, chain_id, genesis_file, wallet_file };
            run_node(&cli.config, overrides)
        }
        Command::Config => print_config(&cli.config),
        Command::Account { wallet_file, generate } => print_account(&cli.config, wallet_file, generate),
        Command::Vrf { wallet_file, generate } => print_vrf(&cli.config, wallet_file, generate),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

fn load_config(path: &Path, overrides: CliOverrides) -> anyhow::Result<NodeConfig> {
    let mut config = NodeConfig::load(path).with_context(|| format!("loading config from {}", path.display()))?;
    config.apply_overrides(&overrides);
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn print_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path, CliOverrides::default())?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn resolve_wallet_path(config_path: &Path, override_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path;
    }
    NodeConfig::load(config_path).map(|c| c.wallet_file).unwrap_or_else(|_| PathBuf::from("wallet.json"))
}

fn load_or_generate_wallet(path: &Path, generate: bool) -> anyhow::Result<NodeWallet> {
    if generate {
        return NodeWallet::generate_to_file(path).context("generating wallet file");
    }
    NodeWallet::load(path).with_context(|| format!("loading wallet file {}", path.display()))
}

fn print_account(config_path: &Path, wallet_file: Option<PathBuf>, generate: bool) -> anyhow::Result<()> {
    let path = resolve_wallet_path(config_path, wallet_file);
    let wallet = load_or_generate_wallet(&path, generate)?;
    println!("{}", wallet.keypair.address.to_hex());
    Ok(())
}

fn print_vrf(config_path: &Path, wallet_file: Option<PathBuf>, generate: bool) -> anyhow::Result<()> {
    let path = resolve_wallet_path(config_path, wallet_file);
    let wallet = load_or_generate_wallet(&path, generate)?;
    println!("{}", hex::encode(wallet.vrf_keypair.public_key));
    Ok(())
}

fn load_genesis_params(config: &NodeConfig) -> anyhow::Result<GenesisParams> {
    let path = config.chain.genesis_file.as_ref().ok_or_else(|| {
        anyhow::anyhow!("chain.genesis_file must be set for chain id {} with no genesis on disk", config.chain.chain_id)
    })?;
    let text = std::fs::read_to_string(path).with_context(|| format!("reading genesis file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing genesis file {}", path.display()))
}

fn run_node(config_path: &Path, overrides: CliOverrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides)?;
    info!(chain_id = config.chain.chain_id, "chronx-node starting");

    std::fs::create_dir_all(&config.db.path).with_context(|| format!("creating data dir {}", config.db.path.display()))?;
    let state = Arc::new(StateDb::open(&config.db.path).context("opening state database")?);

    let chain_config = if is_fresh(&state) {
        info!("fresh database — applying genesis");
        let params = load_genesis_params(&config)?;
        let cfg = apply_genesis(&state, &params).context("applying genesis")?;
        config
            .validate_against_delegation_delay(params.dpos.delegation_delay)
            .context("validating vote_accepting_periods against genesis dpos parameters")?;
        cfg
    } else {
        info!("existing database found — skipping genesis");
        ChainConfig::predefined(config.chain.chain_id).context("resolving chain configuration")?
    };

    // `BlockManager`'s in-memory frontier never persists, so every boot —
    // fresh or not — needs the genesis block re-registered before any other
    // block can resolve its pivot by level.
    let genesis = genesis_dag_block();
    let genesis_hash = chronx_dag::block_hash(&genesis);
    let block_manager = BlockManager::new(genesis_hash);
    block_manager.mark_verified(genesis);

    let wallet = Arc::new(NodeWallet::load(&config.wallet_file).with_context(|| {
        format!("loading wallet file {} (run `chronx-node account --generate` first)", config.wallet_file.display())
    })?);

    let txpool = TxPool::new(Arc::clone(&state), chronx_core::constants::POOL_WARN_SIZE, config.transactions_pool_size);
    let vote_manager = Arc::new(VoteManager::new(Arc::clone(&state)));
    let executor = Arc::new(Executor::new(Arc::clone(&state), Arc::clone(&txpool)));
    let levels = Arc::new(Mutex::new(ProposalPeriodLevelsMap::new()));
    let validators = Arc::new(config.chain.validators.clone());
    let connected_peers = Arc::new(AtomicUsize::new(0));

    let p2p_config = P2pConfig {
        listen_addr: config.network.listen_addr.clone(),
        bootstrap_peers: config.network.bootstrap_peers.clone(),
        protocol_version: config.network.protocol_version.clone(),
        packet_topic: config.network.packet_topic.clone(),
        deep_threshold: config.network.deep_sync_threshold,
        peer_blacklist_timeout_secs: config.network.peer_blacklist_timeout_secs,
    };
    let (p2p_network, p2p_handle) =
        P2pNetwork::new(&p2p_config).map_err(|e| anyhow::anyhow!("building p2p network: {e}"))?;
    let local_peer_id = p2p_handle.local_peer_id;
    info!(peer_id = %local_peer_id, "p2p identity");
    let peer_multiaddr = format!("{}/p2p/{}", p2p_config.listen_addr, local_peer_id);

    let packet_ctx = packets::PacketContext {
        state: Arc::clone(&state),
        block_manager: Arc::clone(&block_manager),
        txpool: Arc::clone(&txpool),
        vote_manager: Arc::clone(&vote_manager),
        executor: Arc::clone(&executor),
        validators: Arc::clone(&validators),
        committee_size: chain_config.pbft.committee_size,
        direct_tx: p2p_handle.direct_tx.clone(),
        genesis_hash,
        net_id: config.network.network_id,
        peers: Arc::new(Mutex::new(chronx_p2p::PeerRegistry::new())),
        sync: Arc::new(Mutex::new(chronx_p2p::SyncState::new(config.network.deep_sync_threshold))),
        connected_peers: Arc::clone(&connected_peers),
    };

    let queue = packets::PacketQueue::new();
    let _packet_workers = packets::spawn_workers(queue.clone(), packet_ctx, config.chain.packets_processing_threads);

    let _dag_verifiers = producer::spawn_dag_verifiers(
        Arc::clone(&block_manager),
        Arc::clone(&state),
        chain_config,
        Arc::clone(&levels),
        config.chain.packets_processing_threads,
    );

    let state_machine = Arc::new(PbftStateMachine::new(chain_config.pbft.lambda_ms_min, chain_config.vdf.lambda_bound as u32));
    let pbft_driver = PbftDriver::spawn(
        Arc::clone(&state_machine),
        Arc::clone(&vote_manager),
        Arc::clone(&block_manager),
        Arc::clone(&state),
        Arc::clone(&executor),
        validators.len() as u64,
    );

    let proposer = Arc::new(proposer::Proposer::new(
        Arc::clone(&wallet),
        Arc::clone(&state_machine),
        Arc::clone(&vote_manager),
        Arc::clone(&block_manager),
        Arc::clone(&state),
        chain_config,
        Arc::clone(&validators),
        p2p_handle.broadcast_tx.clone(),
    ));

    let task_handle = tasks::spawn(
        Arc::clone(&proposer),
        Arc::clone(&state),
        Arc::clone(&block_manager),
        Arc::clone(&vote_manager),
        Arc::clone(&txpool),
        chain_config,
        Arc::clone(&levels),
        Arc::clone(&wallet),
        p2p_handle.broadcast_tx.clone(),
        config.network.network_id,
        genesis_hash,
    );

    let rpc_state = Arc::new(RpcServerState {
        db: Arc::clone(&state),
        pool: Arc::clone(&txpool),
        block_manager: Arc::clone(&block_manager),
        chain_config,
        local_peer_id: local_peer_id.to_string(),
        peer_multiaddr: Some(peer_multiaddr),
        connected_peers,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let dispatcher = tokio::spawn(packets::run_dispatcher(p2p_handle.inbound_rx, queue));
        let network = tokio::spawn(p2p_network.run());

        let rpc_addr = std::net::SocketAddr::from((
            [0, 0, 0, 0],
            config.rpc.http_port.unwrap_or(8545),
        ));
        let rpc_handle = RpcServer::new(rpc_state).start(rpc_addr).await.context("starting rpc server")?;

        info!("node ready");
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown requested");

        rpc_handle.stop().ok();
        dispatcher.abort();
        network.abort();
        anyhow::Ok(())
    })?;

    drop(task_handle);
    drop(pbft_driver);
    txpool.stop();
    block_manager.stop();
    Ok(())
}
