//! End-to-end smoke test for chronx-node.
//!
//! Drives the compiled binary as a real subprocess: generates a node
//! identity through the `account`/`vrf` subcommands, writes a genesis file
//! naming that identity as the sole validator, starts `node`, and exercises
//! the JSON-RPC query surface plus transaction submission.
//!
//! Run with:
//!   cargo test -p chronx-node --test smoke

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chronx_core::chain_config::PbftConfig;
use chronx_core::codec::Encodable;
use chronx_core::constants::CHAIN_ID_DEVNET;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Address, Signature};
use chronx_crypto::KeyPair;
use chronx_genesis::{DposConfig, GenesisAccount, GenesisParams, Hardforks};

// ── Node lifecycle ───────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn node_bin() -> &'static str {
    env!("CARGO_BIN_EXE_chronx-node")
}

// ── Identity setup via the real CLI ──────────────────────────────────────

fn run_cli(args: &[&str]) -> String {
    let output = Command::new(node_bin())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run chronx-node {args:?}: {e}"));
    assert!(
        output.status.success(),
        "chronx-node {args:?} exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 stdout").trim().to_string()
}

struct Identity {
    wallet_path: PathBuf,
    address: Address,
    vrf_public_key: [u8; 32],
}

fn generate_identity(dir: &Path) -> Identity {
    let wallet_path = dir.join("wallet.json");
    let address_hex = run_cli(&["account", "--wallet-file", wallet_path.to_str().unwrap(), "--generate"]);
    let vrf_hex = run_cli(&["vrf", "--wallet-file", wallet_path.to_str().unwrap()]);

    let address = Address::from_hex(&address_hex).expect("valid address hex");
    let vrf_bytes = hex::decode(&vrf_hex).expect("valid vrf hex");
    let mut vrf_public_key = [0u8; 32];
    vrf_public_key.copy_from_slice(&vrf_bytes);

    Identity { wallet_path, address, vrf_public_key }
}

fn node_secret(wallet_path: &Path) -> KeyPair {
    let text = std::fs::read_to_string(wallet_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let secret_hex = value["node_secret"].as_str().expect("node_secret field");
    let secret_bytes = hex::decode(secret_hex).expect("valid node_secret hex");
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&secret_bytes);
    KeyPair::from_raw_secret(secret).expect("valid secp256k1 scalar")
}

// ── Genesis/config file construction ─────────────────────────────────────

fn write_genesis_file(dir: &Path, funded: Address) -> PathBuf {
    let params = GenesisParams {
        chain_id: CHAIN_ID_DEVNET,
        accounts: vec![GenesisAccount { address: funded, balance: 1_000_000_000 }],
        dpos: DposConfig { delegation_delay: 5, blocks_per_year: 63_072_000 },
        chain_config: None,
        hardforks: Hardforks::default(),
    };
    let path = dir.join("genesis.json");
    std::fs::write(&path, serde_json::to_string_pretty(&params).unwrap()).unwrap();
    path
}

fn write_config_file(dir: &Path, wallet_path: &Path, identity: &Identity) -> PathBuf {
    let config = serde_json::json!({
        "network": {
            "listen_addr": "/ip4/127.0.0.1/tcp/0",
            "network_id": CHAIN_ID_DEVNET,
        },
        "db": {
            "path": dir.join("state"),
        },
        "chain": {
            "chain_id": CHAIN_ID_DEVNET,
            "validators": [
                {
                    "address": serde_json::to_value(identity.address).unwrap(),
                    "vrf_public_key": serde_json::to_value(identity.vrf_public_key).unwrap(),
                }
            ],
        },
        "wallet_file": wallet_path,
    });
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

// ── RPC helpers ───────────────────────────────────────────────────────────

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
    let resp = client.post(url).json(&body).send().await.unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({ "jsonrpc": "2.0", "method": "chronx_getGenesisInfo", "params": [], "id": 1 });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

// ── Smoke test ────────────────────────────────────────────────────────────

#[tokio::test]
async fn node_boots_applies_genesis_and_accepts_transactions() {
    let data_dir = std::env::temp_dir().join(format!("chronx_node_smoke_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let identity = generate_identity(&data_dir);
    let genesis_path = write_genesis_file(&data_dir, identity.address);
    let config_path = write_config_file(&data_dir, &identity.wallet_path, &identity);

    let rpc_port = free_port();
    let p2p_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let child = Command::new(node_bin())
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "node",
            "--data-dir",
            data_dir.join("state").to_str().unwrap(),
            "--p2p-listen",
            &format!("/ip4/127.0.0.1/tcp/{p2p_port}"),
            "--rpc-http-port",
            &rpc_port.to_string(),
            "--chain-id",
            &CHAIN_ID_DEVNET.to_string(),
            "--genesis-file",
            genesis_path.to_str().unwrap(),
            "--wallet-file",
            identity.wallet_path.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn chronx-node");
    let _guard = NodeGuard { child, data_dir: data_dir.clone() };

    let http = reqwest::Client::new();
    assert!(wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await, "chronx-node did not become ready");

    // Genesis applied: one funded account, a real genesis hash, matching chain id.
    let genesis_info = rpc_call(&http, &rpc_url, "chronx_getGenesisInfo", serde_json::json!([])).await;
    assert_eq!(genesis_info["chain_id"], CHAIN_ID_DEVNET);
    assert_eq!(genesis_info["account_count"], 1);
    assert!(genesis_info["genesis_hash"].as_str().is_some());

    // The funded account shows the genesis balance and a fresh nonce.
    let account = rpc_call(&http, &rpc_url, "chronx_getAccount", serde_json::json!([identity.address.to_hex()])).await;
    assert_eq!(account["balance"], "1000000000");
    assert_eq!(account["nonce"], 0);

    // Chain info resolves to the devnet's predefined PBFT/VDF parameters.
    let chain_info = rpc_call(&http, &rpc_url, "chronx_getChainInfo", serde_json::json!([])).await;
    let pbft: PbftConfig = serde_json::from_value(chain_info["pbft"].clone()).unwrap();
    assert_eq!(pbft.committee_size, 3);

    // Network identity is reported and carries a dialable multiaddr.
    let network_info = rpc_call(&http, &rpc_url, "chronx_getNetworkInfo", serde_json::json!([])).await;
    assert!(network_info["peer_multiaddr"].as_str().unwrap().contains("/p2p/"));

    // Submitting a signed transfer is accepted into the pool and returns its
    // canonical hash — no claim about finality, since that needs real
    // consensus timing this test does not drive.
    let keypair = node_secret(&identity.wallet_path);
    let recipient = KeyPair::generate().address;
    let mut tx = Transaction {
        nonce: 0,
        gas_price: 1,
        gas_limit: 21_000,
        to: Some(recipient),
        value: 500,
        data: Vec::new(),
        chain_id: CHAIN_ID_DEVNET,
        signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
    };
    let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
    tx.signature = keypair.sign_prehash(digest.as_bytes());
    let expected_hash = chronx_crypto::keccak256(&tx.to_canonical_bytes());

    let tx_hex = hex::encode(tx.to_canonical_bytes());
    let result = rpc_call(&http, &rpc_url, "chronx_sendTransaction", serde_json::json!([tx_hex])).await;
    assert_eq!(result.as_str().unwrap(), expected_hash.to_hex());
}
