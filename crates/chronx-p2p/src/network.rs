use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise, ping, request_response, tcp, yamux,
    swarm::SwarmEvent,
    Multiaddr, PeerId, StreamProtocol, Swarm,
};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::message::Packet;
use crate::peer::PeerRegistry;

/// Request-response behaviour for pull packets (`GetNewBlock`, `DagSync*`,
/// `GetPbftSync`, `PbftSync`, `GetNextVotes`, `NextVotes`). Carries `Packet`
/// directly through libp2p's cbor codec — both the request and its reply
/// share the same packet vocabulary as the gossip side.
pub type PullBehaviour = request_response::cbor::Behaviour<Packet, Packet>;

const PULL_PROTOCOL: &str = "/chronx/pull/1.0.0";

/// Combined libp2p network behaviour for ChronX.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `ChronxBehaviourEvent` enum with one variant per field. Push packets
/// (`NewBlock`, `NewBlockHash`, `Transaction`, `Vote`, `NextVotes`) are
/// broadcast over `gossipsub`; pull packets go through `pull`.
#[derive(NetworkBehaviour)]
pub struct ChronxBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub pull: PullBehaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

type PullChannel = request_response::ResponseChannel<Packet>;

/// Instructs the network task to either fire a new pull request at `peer`
/// or answer the oldest request still pending from `peer`.
pub enum Outbound {
    Request { peer: PeerId, packet: Packet },
    Reply { peer: PeerId, packet: Packet },
}

/// Application-facing handle returned from `P2pNetwork::new()`.
pub struct P2pHandle {
    /// Send here to broadcast a push packet to all gossip peers.
    pub broadcast_tx: mpsc::Sender<Packet>,
    /// Send here to issue a pull request or answer a pending one.
    pub direct_tx: mpsc::Sender<Outbound>,
    /// Receive here to consume packets arriving from peers.
    pub inbound_rx: mpsc::Receiver<(PeerId, Packet)>,
    /// Local libp2p peer identity.
    pub local_peer_id: PeerId,
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`. This is the
/// sole tokio-resident piece of the node (§5): every decoded packet crosses
/// `inbound_tx` to the OS-thread core, and every packet the core produces
/// crosses back in over `broadcast_rx`/`direct_rx`.
pub struct P2pNetwork {
    swarm: Swarm<ChronxBehaviour>,
    topic: gossipsub::IdentTopic,
    peers: PeerRegistry,
    pending_replies: HashMap<PeerId, VecDeque<PullChannel>>,
    broadcast_rx: mpsc::Receiver<Packet>,
    direct_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<(PeerId, Packet)>,
}

impl P2pNetwork {
    /// Build the network and return `(P2pNetwork, P2pHandle)`.
    pub fn new(
        config: &P2pConfig,
    ) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let topic = gossipsub::IdentTopic::new(&config.packet_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let pull = request_response::cbor::Behaviour::new(
                    [(StreamProtocol::new(PULL_PROTOCOL), request_response::ProtocolSupport::Full)],
                    request_response::Config::default(),
                );

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                Ok(ChronxBehaviour { gossipsub, pull, kademlia, identify, ping })
            })?
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(256);
        let (direct_tx, direct_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let network = P2pNetwork {
            swarm,
            topic,
            peers: PeerRegistry::new(),
            pending_replies: HashMap::new(),
            broadcast_rx,
            direct_rx,
            inbound_tx,
        };
        let handle = P2pHandle { broadcast_tx, direct_tx, inbound_rx, local_peer_id };

        Ok((network, handle))
    }

    /// Drive the P2P event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(packet) = self.broadcast_rx.recv() => {
                    self.publish(packet).await;
                }

                Some(outbound) = self.direct_rx.recv() => {
                    self.handle_outbound(outbound);
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
            }
        }
    }

    async fn publish(&mut self, packet: Packet) {
        let data = packet.to_bytes();
        if let Err(e) = self.swarm.behaviour_mut().gossipsub.publish(self.topic.clone(), data) {
            warn!(error = %e, "gossipsub publish failed");
        }
    }

    fn handle_outbound(&mut self, outbound: Outbound) {
        match outbound {
            Outbound::Request { peer, packet } => {
                self.swarm.behaviour_mut().pull.send_request(&peer, packet);
            }
            Outbound::Reply { peer, packet } => {
                let Some(channel) = self.pending_replies.get_mut(&peer).and_then(VecDeque::pop_front) else {
                    warn!(peer = %peer, "no pending pull request to answer");
                    return;
                };
                if self.swarm.behaviour_mut().pull.send_response(channel, packet).is_err() {
                    warn!(peer = %peer, "pull response channel closed before reply");
                }
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<ChronxBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "P2P listening on");
            }
            SwarmEvent::Behaviour(ChronxBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message,
                propagation_source,
                ..
            })) => match Packet::from_bytes(&message.data) {
                Ok(packet) => {
                    self.peers.mark_seen(&propagation_source);
                    let _ = self.inbound_tx.send((propagation_source, packet)).await;
                }
                Err(e) => debug!(error = %e, "failed to decode gossip packet"),
            },
            SwarmEvent::Behaviour(ChronxBehaviourEvent::Pull(request_response::Event::Message {
                peer,
                message,
                ..
            })) => match message {
                request_response::Message::Request { request, channel, .. } => {
                    self.peers.mark_seen(&peer);
                    self.pending_replies.entry(peer).or_default().push_back(channel);
                    let _ = self.inbound_tx.send((peer, request)).await;
                }
                request_response::Message::Response { response, .. } => {
                    self.peers.mark_seen(&peer);
                    let _ = self.inbound_tx.send((peer, response)).await;
                }
            },
            SwarmEvent::Behaviour(ChronxBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.peers.on_connected(peer_id);
                debug!(peer = %peer_id, "connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                self.peers.on_disconnected(&peer_id);
                self.pending_replies.remove(&peer_id);
                debug!(peer = %peer_id, "connection closed");
            }
            _ => {}
        }
    }
}
