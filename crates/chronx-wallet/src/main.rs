//! chronx-wallet
//!
//! CLI wallet for ChronX. Manages secp256k1 keypairs, builds and signs
//! value-transfer transactions, and submits them to a running node via
//! JSON-RPC.
//!
//! Usage:
//!   chronx-wallet keygen   [--keyfile <path>]
//!   chronx-wallet address  [--keyfile <path>]
//!   chronx-wallet balance  [--address <hex>] [--rpc <url>] [--keyfile <path>]
//!   chronx-wallet transfer --to <hex> --amount <u128> [--data <hex>] [--gas-price <u128>] [--gas-limit <u64>] [--rpc <url>] [--keyfile <path>]
//!   chronx-wallet tx       --hash <hex> [--rpc <url>]
//!   chronx-wallet info     [--rpc <url>]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use chronx_core::codec::Encodable;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Address, Balance};
use chronx_crypto::KeyPair;

mod rpc_client;
use rpc_client::WalletRpcClient;

const DEFAULT_GAS_PRICE: Balance = 1;
const DEFAULT_GAS_LIMIT: u64 = 21_000;

// ── CLI definition ────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "chronx-wallet", version, about = "ChronX wallet — sign and submit transactions")]
struct Args {
    /// Path to the keyfile (JSON).
    #[arg(long, global = true, default_value = "~/.chronx/wallet.json")]
    keyfile: PathBuf,

    /// Node RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8545")]
    rpc: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new secp256k1 keypair and save it to the keyfile.
    Keygen,

    /// Print the address derived from the local keyfile.
    Address,

    /// Print the balance and nonce of an account.
    Balance {
        /// Address to query (hex). Defaults to the local keypair's address.
        #[arg(long)]
        address: Option<String>,
    },

    /// Sign and submit a value transfer.
    Transfer {
        /// Recipient address (hex). Omit for a contract-creation transaction.
        #[arg(long)]
        to: Option<String>,
        /// Amount to send, in the chain's base unit.
        #[arg(long, default_value_t = 0)]
        amount: u128,
        /// Payload data, hex-encoded.
        #[arg(long)]
        data: Option<String>,
        /// Gas price, in the chain's base unit.
        #[arg(long, default_value_t = DEFAULT_GAS_PRICE)]
        gas_price: u128,
        /// Gas limit.
        #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
        gas_limit: u64,
    },

    /// Look up a transaction by hash.
    Tx {
        /// Transaction hash (hex).
        #[arg(long)]
        hash: String,
    },

    /// Print chain/genesis info from the node.
    Info,
}

// ── Main ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn,chronx_wallet=info").init();

    let args = Args::parse();
    let keyfile = expand_tilde(&args.keyfile);
    let client = WalletRpcClient::new(&args.rpc);

    match args.command {
        Command::Keygen => cmd_keygen(&keyfile),

        Command::Address => {
            let kp = load_keypair(&keyfile)?;
            println!("{}", kp.address.to_hex());
            Ok(())
        }

        Command::Balance { address } => {
            let addr = match address {
                Some(a) => a,
                None => load_keypair(&keyfile)?.address.to_hex(),
            };
            let balance = client.get_balance(&addr).await?;
            let nonce = client.get_nonce(&addr).await?;
            println!("Address: {addr}");
            println!("Balance: {balance}");
            println!("Nonce:   {nonce}");
            Ok(())
        }

        Command::Transfer { to, amount, data, gas_price, gas_limit } => {
            let kp = load_keypair(&keyfile)?;
            let to_addr = to
                .map(|s| Address::from_hex(&s).map_err(|e| anyhow::anyhow!("invalid recipient address: {e}")))
                .transpose()?;
            let payload = data
                .map(|s| hex::decode(s.trim_start_matches("0x")).context("decoding data hex"))
                .transpose()?
                .unwrap_or_default();

            let chain_id = chain_id_of(&client).await?;
            let nonce = client.get_nonce(&kp.address.to_hex()).await?;

            let tx = build_and_sign(&kp, nonce, to_addr, amount, payload, gas_price, gas_limit, chain_id);
            let tx_hex = hex::encode(tx.to_canonical_bytes());
            let hash = client.send_transaction(&tx_hex).await?;
            println!("Submitted: {hash}");
            Ok(())
        }

        Command::Tx { hash } => {
            let result = client.get_transaction(&hash).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Command::Info => {
            let genesis = client.get_genesis_info().await?;
            let chain = client.get_chain_info().await?;
            println!("Genesis: {}", serde_json::to_string_pretty(&genesis)?);
            println!("Chain:   {}", serde_json::to_string_pretty(&chain)?);
            Ok(())
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────

fn cmd_keygen(keyfile: &PathBuf) -> anyhow::Result<()> {
    if keyfile.exists() {
        bail!("Keyfile {} already exists. Delete it first to generate a new key.", keyfile.display());
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, &json).with_context(|| format!("writing keyfile to {}", keyfile.display()))?;

    println!("Generated new keypair.");
    println!("Address:    {}", kp.address.to_hex());
    println!("Public key: {}", hex::encode(kp.public_key_bytes()));
    println!("Keyfile:    {}", keyfile.display());
    println!("\nBACK UP YOUR KEYFILE. Loss = permanent loss of funds.");
    Ok(())
}

// ── Transaction builder ─────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn build_and_sign(
    kp: &KeyPair,
    nonce: u64,
    to: Option<Address>,
    value: u128,
    data: Vec<u8>,
    gas_price: u128,
    gas_limit: u64,
    chain_id: u64,
) -> Transaction {
    let mut tx = Transaction {
        nonce,
        gas_price,
        gas_limit,
        to,
        value,
        data,
        chain_id,
        signature: chronx_core::types::Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
    };
    let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
    info!(nonce, %value, "signing transaction");
    tx.signature = kp.sign_prehash(digest.as_bytes());
    tx
}

// ── Helpers ──────────────────────────────────────────────────────────────

async fn chain_id_of(client: &WalletRpcClient) -> anyhow::Result<u64> {
    let chain = client.get_chain_info().await?;
    chain["chain_id"].as_u64().context("missing chain_id in chain info response")
}

fn load_keypair(keyfile: &PathBuf) -> anyhow::Result<KeyPair> {
    let json = std::fs::read_to_string(keyfile)
        .with_context(|| format!("reading keyfile {}", keyfile.display()))?;
    let kp: KeyPair = serde_json::from_str(&json).context("parsing keyfile — is it a valid ChronX keyfile?")?;
    Ok(kp)
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
