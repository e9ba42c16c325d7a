use chronx_core::constants::PEER_BLACKLIST_TIMEOUT_SECS;
use chronx_core::types::Period;

use crate::sync::default_deep_threshold;

/// Configuration for the ChronX P2P network.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7777").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers.
    pub protocol_version: String,
    /// GossipSub topic name for broadcasting push packets.
    pub packet_topic: String,
    /// Periods behind the best peer before a node switches from light to
    /// deep sync (§4.I).
    pub deep_threshold: Period,
    /// Seconds of peer inactivity before a repeat-offending peer is
    /// blacklisted.
    pub peer_blacklist_timeout_secs: u64,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/chronx/1.0.0".into(),
            packet_topic: "chronx-packets".into(),
            deep_threshold: default_deep_threshold(),
            peer_blacklist_timeout_secs: PEER_BLACKLIST_TIMEOUT_SECS,
        }
    }
}
