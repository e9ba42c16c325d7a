//! P2P connectivity test for chronx-node.
//!
//! Starts two node processes sharing a genesis (node A as bootstrap, node B
//! dialing A's advertised multiaddr) and waits for each side's periodic
//! `Status` gossip to register the other as a connected peer.
//!
//! Run with:
//!   cargo test -p chronx-node --test p2p

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chronx_core::constants::CHAIN_ID_DEVNET;
use chronx_core::types::Address;
use chronx_genesis::{DposConfig, GenesisAccount, GenesisParams, Hardforks};

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

fn run_cli(args: &[&str]) -> String {
    let output = Command::new(node_bin()).args(args).output().expect("run chronx-node");
    assert!(output.status.success(), "chronx-node {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap().trim().to_string()
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
    let address = Address::from_hex(&address_hex).unwrap();
    let vrf_bytes = hex::decode(&vrf_hex).unwrap();
    let mut vrf_public_key = [0u8; 32];
    vrf_public_key.copy_from_slice(&vrf_bytes);
    Identity { wallet_path, address, vrf_public_key }
}

fn write_genesis_file(dir: &Path, validators: &[&Identity]) -> PathBuf {
    let accounts =
        validators.iter().map(|id| GenesisAccount { address: id.address, balance: 1_000_000_000 }).collect();
    let params = GenesisParams {
        chain_id: CHAIN_ID_DEVNET,
        accounts,
        dpos: DposConfig { delegation_delay: 5, blocks_per_year: 63_072_000 },
        chain_config: None,
        hardforks: Hardforks::default(),
    };
    let path = dir.join("genesis.json");
    std::fs::write(&path, serde_json::to_string_pretty(&params).unwrap()).unwrap();
    path
}

fn write_config_file(dir: &Path, identity: &Identity, all_validators: &[&Identity]) -> PathBuf {
    let validators: Vec<serde_json::Value> = all_validators
        .iter()
        .map(|id| {
            serde_json::json!({
                "address": serde_json::to_value(id.address).unwrap(),
                "vrf_public_key": serde_json::to_value(id.vrf_public_key).unwrap(),
            })
        })
        .collect();
    let config = serde_json::json!({
        "network": {
            "listen_addr": "/ip4/127.0.0.1/tcp/0",
            "network_id": CHAIN_ID_DEVNET,
        },
        "db": { "path": dir.join("state") },
        "chain": { "chain_id": CHAIN_ID_DEVNET, "validators": validators },
        "wallet_file": identity.wallet_path,
    });
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

#[allow(clippy::too_many_arguments)]
fn spawn_node(
    config_path: &Path,
    data_dir: &Path,
    p2p_port: u16,
    rpc_port: u16,
    genesis_path: &Path,
    wallet_path: &Path,
    bootstrap: Option<&str>,
) -> Child {
    let mut cmd = Command::new(node_bin());
    cmd.args([
        "--config",
        config_path.to_str().unwrap(),
        "node",
        "--data-dir",
        data_dir.to_str().unwrap(),
        "--p2p-listen",
        &format!("/ip4/127.0.0.1/tcp/{p2p_port}"),
        "--rpc-http-port",
        &rpc_port.to_string(),
        "--chain-id",
        &CHAIN_ID_DEVNET.to_string(),
        "--genesis-file",
        genesis_path.to_str().unwrap(),
        "--wallet-file",
        wallet_path.to_str().unwrap(),
    ]);
    if let Some(addr) = bootstrap {
        cmd.args(["--bootstrap", addr]);
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn().expect("failed to spawn chronx-node")
}

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str) -> serde_json::Value {
    let body = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": [], "id": 1 });
    let resp = client.post(url).json(&body).send().await.unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let body = serde_json::json!({ "jsonrpc": "2.0", "method": "chronx_getGenesisInfo", "params": [], "id": 1 });
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

async fn wait_for_connected_peer(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let info = rpc_call(client, url, "chronx_getNetworkInfo").await;
        if info["connected_peers"].as_u64().unwrap_or(0) >= 1 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    false
}

#[tokio::test]
async fn two_nodes_discover_each_other_over_status_gossip() {
    let base_dir = std::env::temp_dir().join(format!("chronx_node_p2p_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&base_dir);
    let dir_a = base_dir.join("node_a");
    let dir_b = base_dir.join("node_b");
    std::fs::create_dir_all(&dir_a).unwrap();
    std::fs::create_dir_all(&dir_b).unwrap();

    let identity_a = generate_identity(&dir_a);
    let identity_b = generate_identity(&dir_b);

    // Both nodes share one genesis naming both as validators, so they agree
    // on chain state and neither rejects the other's gossip as foreign.
    let genesis_a = write_genesis_file(&dir_a, &[&identity_a, &identity_b]);
    let genesis_b = dir_b.join("genesis.json");
    std::fs::copy(&genesis_a, &genesis_b).unwrap();

    let config_a = write_config_file(&dir_a, &identity_a, &[&identity_a, &identity_b]);
    let config_b = write_config_file(&dir_b, &identity_b, &[&identity_a, &identity_b]);

    let http = reqwest::Client::new();

    let rpc_a = free_port();
    let p2p_a = free_port();
    let url_a = format!("http://127.0.0.1:{rpc_a}");
    let child_a =
        spawn_node(&config_a, &dir_a.join("state"), p2p_a, rpc_a, &genesis_a, &identity_a.wallet_path, None);
    let _guard_a = NodeGuard { child: child_a, data_dir: dir_a.clone() };
    assert!(wait_for_rpc(&http, &url_a, Duration::from_secs(20)).await, "node A did not become ready");

    let network_info_a = rpc_call(&http, &url_a, "chronx_getNetworkInfo").await;
    let multiaddr_a = network_info_a["peer_multiaddr"].as_str().expect("peer_multiaddr").to_string();
    assert!(multiaddr_a.contains("/p2p/"), "expected /p2p/ in multiaddr, got: {multiaddr_a}");

    let rpc_b = free_port();
    let p2p_b = free_port();
    let url_b = format!("http://127.0.0.1:{rpc_b}");
    let child_b = spawn_node(
        &config_b,
        &dir_b.join("state"),
        p2p_b,
        rpc_b,
        &genesis_b,
        &identity_b.wallet_path,
        Some(&multiaddr_a),
    );
    let _guard_b = NodeGuard { child: child_b, data_dir: base_dir.clone() };
    assert!(wait_for_rpc(&http, &url_b, Duration::from_secs(20)).await, "node B did not become ready");

    assert!(
        wait_for_connected_peer(&http, &url_a, Duration::from_secs(20)).await,
        "node A never saw node B as a connected peer"
    );
    assert!(
        wait_for_connected_peer(&http, &url_b, Duration::from_secs(20)).await,
        "node B never saw node A as a connected peer"
    );
}
