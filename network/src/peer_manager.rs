//! Peer registry, connection admission, readiness and gossip fan-out.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;

use relay_messages::{
    BlockHashInfo, DisconnectReason, DisconnectingMessage, PeerAddress, PeerListEntry, PeerListMessage,
    WireMessage,
};
use relay_protocol::{validate_identify, LocalNode};
use relay_types::{BlockHash, Identity, TxHash};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::broadcast::{plan_fanout, BroadcastResult, FULL_RELAY_FANOUT};
use crate::connection::PeerChannel;
use crate::known::DEFAULT_KNOWN_CAPACITY;
use crate::peer::{ConnectionState, Direction, Peer, PeerId};
use crate::NetworkError;

/// How long writers get, together, to flush their queues during shutdown.
pub const DEFAULT_WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a rejected peer is asked to stay away, in seconds.
const DISCONNECT_COOLDOWN_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct PeerManagerConfig {
    /// Ceiling on registered connections.
    pub max_peers: usize,
    /// Connected peers required before the node reports ready.
    pub min_peers: usize,
    /// Outbound queue size per peer.
    pub channel_capacity: usize,
    /// Capacity of each per-peer known-hash set.
    pub known_hashes_capacity: usize,
    /// Size of the buffer of addresses learned from peer lists.
    pub max_candidate_addresses: usize,
    /// Shared deadline for all writers to finish once stopping.
    pub writer_shutdown_timeout: Duration,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            max_peers: 50,
            min_peers: 1,
            channel_capacity: 256,
            known_hashes_capacity: DEFAULT_KNOWN_CAPACITY,
            max_candidate_addresses: 256,
            writer_shutdown_timeout: DEFAULT_WRITER_SHUTDOWN_TIMEOUT,
        }
    }
}

/// The hash being gossiped, used to consult and update the known sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GossipItem {
    Block(BlockHash),
    Transaction(TxHash),
}

/// The three encodings of one gossiped item.
#[derive(Clone, Debug)]
pub struct GossipPayload {
    /// Full payload in the current encoding.
    pub full: WireMessage,
    /// Full payload in the legacy encoding.
    pub legacy: WireMessage,
    /// Hash announcement.
    pub announcement: WireMessage,
}

/// Owns every [`Peer`]. All peer state changes go through here.
pub struct PeerManager {
    config: PeerManagerConfig,
    local: LocalNode,
    peers: HashMap<PeerId, Peer>,
    next_peer_id: u64,
    /// Incrementally tracked count of connected peers.
    num_connected: usize,
    ready: bool,
    stopped: bool,
    ready_tx: broadcast::Sender<bool>,
    /// Addresses learned from peer lists, oldest first.
    candidates: VecDeque<PeerListEntry>,
    listener: Option<JoinHandle<()>>,
}

impl PeerManager {
    pub fn new(config: PeerManagerConfig, local: LocalNode) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            ready: config.min_peers == 0,
            config,
            local,
            peers: HashMap::new(),
            next_peer_id: 1,
            num_connected: 0,
            stopped: false,
            ready_tx,
            candidates: VecDeque::new(),
            listener: None,
        }
    }

    pub fn config(&self) -> &PeerManagerConfig {
        &self.config
    }

    pub fn local(&self) -> &LocalNode {
        &self.local
    }

    // -- Connection lifecycle ------------------------------------------------

    /// Whether new inbound connections should be turned away.
    pub fn should_reject_disconnected_peers(&self) -> bool {
        self.peers.len() >= self.config.max_peers
    }

    /// Register a freshly opened connection and send it our `Identify`.
    ///
    /// Inbound connections arriving while the node is full are sent
    /// `Disconnecting { Congested }` and closed without being registered.
    pub fn register_connection(
        &mut self,
        channel: PeerChannel,
        direction: Direction,
        address: Option<PeerAddress>,
        head: BlockHashInfo,
        now_secs: u64,
    ) -> Result<PeerId, NetworkError> {
        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        if self.stopped {
            reject(&channel, id, DisconnectReason::ShuttingDown, now_secs);
            return Err(NetworkError::Stopped);
        }

        if direction == Direction::Inbound && self.should_reject_disconnected_peers() {
            tracing::debug!(peer = %id, registered = self.peers.len(), "rejecting inbound connection, at capacity");
            reject(&channel, id, DisconnectReason::Congested, now_secs);
            return Err(NetworkError::Rejected(id, DisconnectReason::Congested));
        }

        let mut peer = Peer::new(
            id,
            direction,
            address,
            channel,
            self.config.known_hashes_capacity,
            now_secs,
        );
        let identify = self.local.identify(head.hash, head.sequence);
        peer.channel.try_send(id, WireMessage::Identify(identify))?;
        peer.state = ConnectionState::WaitingForIdentity;

        tracing::debug!(peer = %id, ?direction, "connection registered");
        self.peers.insert(id, peer);
        Ok(id)
    }

    /// Keep the transport tasks of a peer so they can be stopped with it.
    pub fn attach_tasks(&mut self, peer: PeerId, writer: JoinHandle<()>, reader: JoinHandle<()>) {
        match self.peers.get_mut(&peer) {
            Some(p) => {
                p.writer_task = Some(writer);
                p.reader_task = Some(reader);
            }
            None => reader.abort(),
        }
    }

    /// Process the peer's `Identify`. On failure the peer is sent the
    /// matching `Disconnecting` reason and removed.
    pub fn handle_identify(
        &mut self,
        peer_id: PeerId,
        identify: &relay_messages::IdentifyMessage,
        now_secs: u64,
    ) -> Result<(), NetworkError> {
        let peer = self.peers.get(&peer_id).ok_or(NetworkError::PeerNotFound(peer_id))?;
        if peer.state == ConnectionState::Connected {
            tracing::debug!(peer = %peer_id, "ignoring repeated identify");
            return Ok(());
        }

        let info = match validate_identify(&self.local, identify) {
            Ok(info) => info,
            Err(e) => {
                let reason = e.disconnect_reason();
                tracing::info!(peer = %peer_id, error = %e, "handshake failed");
                self.disconnect(peer_id, Some(reason), now_secs);
                return Err(NetworkError::Rejected(peer_id, reason));
            }
        };

        if self.find_by_identity(&info.identity).is_some() {
            tracing::info!(peer = %peer_id, identity = %info.identity, "duplicate identity");
            self.disconnect(peer_id, Some(DisconnectReason::DuplicateIdentity), now_secs);
            return Err(NetworkError::Rejected(peer_id, DisconnectReason::DuplicateIdentity));
        }

        if let Some(peer) = self.peers.get_mut(&peer_id) {
            tracing::info!(
                peer = %peer_id,
                identity = %info.identity,
                version = info.version,
                agent = %info.agent,
                "peer connected"
            );
            if let (Some(address), Some(port)) = (peer.address.as_mut(), info.port) {
                address.port = port;
            }
            peer.info = Some(info);
            peer.state = ConnectionState::Connected;
            self.num_connected += 1;
        }
        self.update_readiness();
        Ok(())
    }

    /// The peer announced that it is closing the connection.
    pub fn handle_disconnecting(&mut self, peer_id: PeerId, message: &DisconnectingMessage) {
        tracing::debug!(peer = %peer_id, reason = ?message.reason, "peer is disconnecting");
        self.disconnect(peer_id, None, 0);
    }

    /// Remove a peer. With a reason, the peer is told why before its
    /// channel closes. Unknown peers are ignored.
    pub fn disconnect(&mut self, peer_id: PeerId, reason: Option<DisconnectReason>, now_secs: u64) {
        let Some(mut peer) = self.peers.remove(&peer_id) else {
            return;
        };
        if peer.is_connected() {
            self.num_connected = self.num_connected.saturating_sub(1);
        }
        peer.state = ConnectionState::Disconnecting;
        if let Some(reason) = reason {
            let _ = peer.channel.try_send(
                peer_id,
                WireMessage::Disconnecting(DisconnectingMessage {
                    reason,
                    disconnect_until_secs: now_secs + DISCONNECT_COOLDOWN_SECS,
                }),
            );
        }
        peer.channel.close();
        if let Some(reader) = peer.reader_task.take() {
            reader.abort();
        }
        peer.state = ConnectionState::Disconnected;
        tracing::debug!(peer = %peer_id, ?reason, "peer disconnected");
        self.update_readiness();
    }

    pub fn set_listener(&mut self, listener: JoinHandle<()>) {
        if let Some(old) = self.listener.replace(listener) {
            old.abort();
        }
    }

    /// Close every connection and the listener. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.close_all().wait().await;
    }

    /// Close every connection and the listener without waiting for the
    /// writers. The caller awaits the returned [`PendingWriters`], typically
    /// after releasing its lock on the manager. Calling it again returns
    /// nothing to wait for.
    pub fn close_all(&mut self) -> PendingWriters {
        let mut pending = PendingWriters {
            writers: Vec::new(),
            timeout: self.config.writer_shutdown_timeout,
        };
        if self.stopped {
            return pending;
        }
        self.stopped = true;

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }

        for (id, mut peer) in self.peers.drain() {
            let _ = peer.channel.try_send(
                id,
                WireMessage::Disconnecting(DisconnectingMessage {
                    reason: DisconnectReason::ShuttingDown,
                    disconnect_until_secs: 0,
                }),
            );
            peer.channel.close();
            if let Some(reader) = peer.reader_task.take() {
                reader.abort();
            }
            if let Some(writer) = peer.writer_task.take() {
                pending.writers.push((id, writer));
            }
        }
        self.num_connected = 0;

        self.update_readiness();
        tracing::info!(writers = pending.writers.len(), "peer manager stopped");
        pending
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    // -- Readiness -----------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Receives the new readiness value on every change.
    pub fn subscribe_ready(&self) -> broadcast::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    fn update_readiness(&mut self) {
        let ready = !self.stopped && self.num_connected >= self.config.min_peers;
        if ready != self.ready {
            self.ready = ready;
            tracing::info!(ready, connected = self.num_connected, "readiness changed");
            let _ = self.ready_tx.send(ready);
        }
    }

    // -- Queries -------------------------------------------------------------

    pub fn get(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    pub fn connected_count(&self) -> usize {
        self.num_connected
    }

    /// All registered peers, including those still handshaking.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connected_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().filter(|p| p.is_connected())
    }

    fn find_by_identity(&self, identity: &Identity) -> Option<PeerId> {
        self.connected_peers()
            .find(|p| p.identity().as_ref() == Some(identity))
            .map(|p| p.id)
    }

    // -- Sending -------------------------------------------------------------

    /// Queue a message for one peer. Never waits on the peer's queue.
    pub fn send(&self, peer_id: PeerId, message: WireMessage) -> Result<(), NetworkError> {
        let peer = self.peers.get(&peer_id).ok_or(NetworkError::PeerNotFound(peer_id))?;
        peer.channel.try_send(peer_id, message)
    }

    /// Gossip an item to every connected peer that isn't known to have it,
    /// except `exclude`. Recipients are marked as knowing the item.
    pub fn broadcast(&mut self, item: GossipItem, payload: &GossipPayload, exclude: Option<PeerId>) -> BroadcastResult {
        let candidates: Vec<(PeerId, u16)> = self
            .connected_peers()
            .filter(|p| Some(p.id) != exclude)
            .filter(|p| !knows(p, item))
            .filter_map(|p| p.version().map(|v| (p.id, v)))
            .collect();

        let plan = plan_fanout(&candidates, FULL_RELAY_FANOUT, &mut rand::thread_rng());
        let mut result = BroadcastResult::default();
        let mut failed = 0;

        let deliveries = [
            (&plan.legacy, &payload.legacy, &mut result.legacy),
            (&plan.full, &payload.full, &mut result.full),
            (&plan.announce, &payload.announcement, &mut result.announced),
        ];
        for (ids, message, sent) in deliveries {
            for &id in ids {
                let Some(peer) = self.peers.get_mut(&id) else {
                    continue;
                };
                match peer.channel.try_send(id, message.clone()) {
                    Ok(()) => {
                        mark(peer, item);
                        *sent += 1;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %id, error = %e, "dropped gossip for peer");
                        failed += 1;
                    }
                }
            }
        }
        result.failed = failed;

        tracing::trace!(?item, ?result, "broadcast");
        result
    }

    // -- Known hashes --------------------------------------------------------

    pub fn mark_knows_block(&mut self, peer_id: PeerId, hash: BlockHash) {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.known_blocks.insert(hash);
        }
    }

    pub fn mark_knows_transaction(&mut self, peer_id: PeerId, hash: TxHash) {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.known_transactions.insert(hash);
        }
    }

    pub fn knows_block(&self, peer_id: PeerId, hash: &BlockHash) -> bool {
        self.peers.get(&peer_id).is_some_and(|p| p.knows_block(hash))
    }

    pub fn knows_transaction(&self, peer_id: PeerId, hash: &TxHash) -> bool {
        self.peers.get(&peer_id).is_some_and(|p| p.knows_transaction(hash))
    }

    // -- Peer lists ----------------------------------------------------------

    /// Our connected peers, for answering a `PeerListRequest`.
    pub fn peer_list(&self) -> PeerListMessage {
        let peers = self
            .connected_peers()
            .filter_map(|p| {
                p.identity().map(|identity| PeerListEntry {
                    identity,
                    address: p.address.clone(),
                })
            })
            .collect();
        PeerListMessage { peers }
    }

    /// Remember addresses from a peer's list that we aren't connected to.
    pub fn process_peer_list(&mut self, list: &PeerListMessage) {
        for entry in &list.peers {
            if entry.address.is_none() || entry.identity == self.local.identity {
                continue;
            }
            if self.find_by_identity(&entry.identity).is_some() {
                continue;
            }
            if self.candidates.iter().any(|c| c.identity == entry.identity) {
                continue;
            }
            if self.candidates.len() >= self.config.max_candidate_addresses {
                self.candidates.pop_front();
            }
            self.candidates.push_back(entry.clone());
        }
    }

    pub fn candidate_addresses(&self) -> impl Iterator<Item = &PeerAddress> {
        self.candidates.iter().filter_map(|c| c.address.as_ref())
    }
}

fn reject(channel: &PeerChannel, id: PeerId, reason: DisconnectReason, now_secs: u64) {
    let _ = channel.try_send(
        id,
        WireMessage::Disconnecting(DisconnectingMessage {
            reason,
            disconnect_until_secs: now_secs + DISCONNECT_COOLDOWN_SECS,
        }),
    );
    channel.close();
}

fn knows(peer: &Peer, item: GossipItem) -> bool {
    match item {
        GossipItem::Block(hash) => peer.knows_block(&hash),
        GossipItem::Transaction(hash) => peer.knows_transaction(&hash),
    }
}

fn mark(peer: &mut Peer, item: GossipItem) {
    match item {
        GossipItem::Block(hash) => {
            peer.known_blocks.insert(hash);
        }
        GossipItem::Transaction(hash) => {
            peer.known_transactions.insert(hash);
        }
    }
}

/// Writer tasks still flushing after [`PeerManager::close_all`].
#[must_use = "writers keep running until waited on"]
pub struct PendingWriters {
    writers: Vec<(PeerId, JoinHandle<()>)>,
    timeout: Duration,
}

impl PendingWriters {
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Wait for every writer against one deadline, then abort the ones
    /// still running.
    pub async fn wait(self) {
        let deadline = tokio::time::Instant::now() + self.timeout;
        for (id, mut writer) in self.writers {
            if tokio::time::timeout_at(deadline, &mut writer).await.is_err() {
                tracing::warn!(peer = %id, "writer did not finish in time");
                writer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use relay_messages::{IdentifyMessage, NewPooledTransactionHashesMessage, NewTransactionV2Message};
    use relay_protocol::{HASH_ANNOUNCEMENT_VERSION, PROTOCOL_VERSION};
    use relay_types::{NetworkId, Transaction};
    use tokio::sync::mpsc;

    fn local() -> LocalNode {
        LocalNode {
            identity: Identity::new([1; 32]),
            network_id: NetworkId::Dev,
            genesis_block_hash: BlockHash::new([7; 32]),
            agent: "relay/test".into(),
            port: Some(9035),
        }
    }

    fn head() -> BlockHashInfo {
        BlockHashInfo {
            hash: BlockHash::new([7; 32]),
            sequence: 1,
        }
    }

    fn manager(max_peers: usize, min_peers: usize) -> PeerManager {
        PeerManager::new(
            PeerManagerConfig {
                max_peers,
                min_peers,
                channel_capacity: 16,
                known_hashes_capacity: 64,
                max_candidate_addresses: 2,
                writer_shutdown_timeout: Duration::from_millis(300),
            },
            local(),
        )
    }

    fn identify(seed: u8, version: u16) -> IdentifyMessage {
        let mut msg = local().identify(BlockHash::new([9; 32]), 5);
        msg.identity = Identity::new([seed; 32]);
        msg.version = version;
        msg
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<WireMessage> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(m) = item {
                out.push(m);
            }
        }
        out
    }

    /// Register and handshake a peer; returns its id and outbound queue.
    fn connect(pm: &mut PeerManager, seed: u8, version: u16) -> (PeerId, mpsc::Receiver<Outbound>) {
        let (channel, mut rx) = PeerChannel::new(16);
        let id = pm
            .register_connection(channel, Direction::Outbound, None, head(), 0)
            .unwrap();
        pm.handle_identify(id, &identify(seed, version), 0).unwrap();
        drain(&mut rx);
        (id, rx)
    }

    fn tx_payload() -> (TxHash, GossipPayload) {
        let tx = Transaction::miners_fee(2, 10);
        let hash = tx.hash();
        let payload = GossipPayload {
            full: WireMessage::NewTransactionV2(NewTransactionV2Message { transaction: tx.clone() }),
            legacy: WireMessage::NewTransaction(relay_protocol::legacy::encode_transaction(&tx).unwrap()),
            announcement: WireMessage::NewPooledTransactionHashes(NewPooledTransactionHashesMessage {
                hashes: vec![hash],
            }),
        };
        (hash, payload)
    }

    #[test]
    fn register_sends_identify_and_waits() {
        let mut pm = manager(10, 1);
        let (channel, mut rx) = PeerChannel::new(4);
        let id = pm
            .register_connection(channel, Direction::Inbound, None, head(), 0)
            .unwrap();
        assert_eq!(pm.get(id).unwrap().state(), ConnectionState::WaitingForIdentity);
        assert_eq!(pm.connected_count(), 0);

        let sent = drain(&mut rx);
        assert!(matches!(sent.as_slice(), [WireMessage::Identify(m)] if m.identity == local().identity));
    }

    #[test]
    fn handshake_connects_peer() {
        let mut pm = manager(10, 1);
        let (id, _rx) = connect(&mut pm, 2, PROTOCOL_VERSION);
        let peer = pm.get(id).unwrap();
        assert!(peer.is_connected());
        assert_eq!(peer.identity(), Some(Identity::new([2; 32])));
        assert_eq!(peer.version(), Some(PROTOCOL_VERSION));
        assert_eq!(pm.connected_count(), 1);
    }

    #[test]
    fn inbound_rejected_at_capacity() {
        let mut pm = manager(1, 1);
        let _first = connect(&mut pm, 2, PROTOCOL_VERSION);

        let (channel, mut rx) = PeerChannel::new(4);
        let result = pm.register_connection(channel, Direction::Inbound, None, head(), 100);
        assert!(matches!(
            result,
            Err(NetworkError::Rejected(_, DisconnectReason::Congested))
        ));
        assert_eq!(pm.peer_count(), 1);

        match rx.try_recv().unwrap() {
            Outbound::Message(WireMessage::Disconnecting(m)) => {
                assert_eq!(m.reason, DisconnectReason::Congested);
                assert!(m.disconnect_until_secs > 100);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Close));
    }

    #[test]
    fn outbound_allowed_at_capacity() {
        let mut pm = manager(1, 1);
        let _first = connect(&mut pm, 2, PROTOCOL_VERSION);
        let (channel, _rx) = PeerChannel::new(4);
        assert!(pm
            .register_connection(channel, Direction::Outbound, None, head(), 0)
            .is_ok());
    }

    #[test]
    fn failed_handshake_disconnects_with_reason() {
        let mut pm = manager(10, 1);
        let (channel, mut rx) = PeerChannel::new(4);
        let id = pm
            .register_connection(channel, Direction::Inbound, None, head(), 0)
            .unwrap();
        drain(&mut rx);

        let mut msg = identify(2, PROTOCOL_VERSION);
        msg.network_id = NetworkId::Main;
        let err = pm.handle_identify(id, &msg, 0).unwrap_err();
        assert!(matches!(err, NetworkError::Rejected(_, DisconnectReason::NetworkMismatch)));
        assert!(pm.get(id).is_none());

        let sent = drain(&mut rx);
        assert!(matches!(
            sent.as_slice(),
            [WireMessage::Disconnecting(m)] if m.reason == DisconnectReason::NetworkMismatch
        ));
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut pm = manager(10, 1);
        let _first = connect(&mut pm, 2, PROTOCOL_VERSION);

        let (channel, _rx) = PeerChannel::new(4);
        let id = pm
            .register_connection(channel, Direction::Inbound, None, head(), 0)
            .unwrap();
        let err = pm.handle_identify(id, &identify(2, PROTOCOL_VERSION), 0).unwrap_err();
        assert!(matches!(err, NetworkError::Rejected(_, DisconnectReason::DuplicateIdentity)));
        assert_eq!(pm.connected_count(), 1);
    }

    #[test]
    fn readiness_fires_only_on_edges() {
        let mut pm = manager(10, 2);
        let mut events = pm.subscribe_ready();
        assert!(!pm.is_ready());

        let (a, _ra) = connect(&mut pm, 2, PROTOCOL_VERSION);
        assert!(events.try_recv().is_err());

        let (_b, _rb) = connect(&mut pm, 3, PROTOCOL_VERSION);
        assert!(pm.is_ready());
        assert!(events.try_recv().unwrap());

        let (_c, _rc) = connect(&mut pm, 4, PROTOCOL_VERSION);
        assert!(events.try_recv().is_err());

        pm.disconnect(a, None, 0);
        assert!(pm.is_ready());
        assert!(events.try_recv().is_err());

        let ids: Vec<PeerId> = pm.connected_peers().map(|p| p.id()).collect();
        pm.disconnect(ids[0], None, 0);
        assert!(!pm.is_ready());
        assert!(!events.try_recv().unwrap());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_resets_readiness() {
        let mut pm = manager(10, 1);
        let mut events = pm.subscribe_ready();
        let (_a, mut rx) = connect(&mut pm, 2, PROTOCOL_VERSION);
        assert!(events.try_recv().unwrap());

        pm.stop().await;
        assert!(pm.is_stopped());
        assert!(!pm.is_ready());
        assert_eq!(pm.peer_count(), 0);
        assert!(!events.try_recv().unwrap());

        let sent = drain(&mut rx);
        assert!(matches!(
            sent.as_slice(),
            [WireMessage::Disconnecting(m)] if m.reason == DisconnectReason::ShuttingDown
        ));

        pm.stop().await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_writers_share_one_shutdown_deadline() {
        let mut pm = manager(10, 1);
        let mut stalled = Vec::new();
        for _ in 0..3 {
            let (channel, rx) = PeerChannel::new(16);
            let id = pm
                .register_connection(channel, Direction::Outbound, None, head(), 0)
                .unwrap();
            // One-byte pipe nobody reads: the writer blocks on our Identify.
            let (near, far) = tokio::io::duplex(1);
            let writer = crate::connection::spawn_writer(id, rx, near);
            pm.attach_tasks(id, writer, tokio::spawn(async {}));
            stalled.push(far);
        }

        let pending = pm.close_all();
        assert_eq!(pending.len(), 3);
        assert!(pm.close_all().is_empty());

        let started = std::time::Instant::now();
        pending.wait().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[tokio::test]
    async fn registration_refused_after_stop() {
        let mut pm = manager(10, 1);
        pm.stop().await;
        let (channel, _rx) = PeerChannel::new(4);
        assert!(matches!(
            pm.register_connection(channel, Direction::Outbound, None, head(), 0),
            Err(NetworkError::Stopped)
        ));
    }

    #[test]
    fn send_to_unknown_peer_fails() {
        let pm = manager(10, 1);
        assert!(matches!(
            pm.send(PeerId(99), WireMessage::PeerListRequest),
            Err(NetworkError::PeerNotFound(PeerId(99)))
        ));
    }

    #[test]
    fn full_queue_only_affects_that_peer() {
        let mut pm = manager(10, 1);
        let (slow_channel, _slow_rx) = PeerChannel::new(1);
        let slow = pm
            .register_connection(slow_channel, Direction::Outbound, None, head(), 0)
            .unwrap();
        pm.handle_identify(slow, &identify(2, PROTOCOL_VERSION), 0).unwrap();
        let (fast, mut fast_rx) = connect(&mut pm, 3, PROTOCOL_VERSION);

        // Slow peer's queue still holds our Identify.
        assert!(matches!(
            pm.send(slow, WireMessage::PeerListRequest),
            Err(NetworkError::ChannelFull(_))
        ));
        pm.send(fast, WireMessage::PeerListRequest).unwrap();
        assert_eq!(drain(&mut fast_rx), vec![WireMessage::PeerListRequest]);
    }

    #[test]
    fn broadcast_skips_sender_and_peers_that_know() {
        let mut pm = manager(10, 1);
        let (sender, mut sender_rx) = connect(&mut pm, 2, PROTOCOL_VERSION);
        let (knower, mut knower_rx) = connect(&mut pm, 3, PROTOCOL_VERSION);
        let (other, mut other_rx) = connect(&mut pm, 4, PROTOCOL_VERSION);
        let (hash, payload) = tx_payload();

        pm.mark_knows_transaction(knower, hash);
        let result = pm.broadcast(GossipItem::Transaction(hash), &payload, Some(sender));

        assert_eq!(result.sent(), 1);
        assert!(drain(&mut sender_rx).is_empty());
        assert!(drain(&mut knower_rx).is_empty());
        assert_eq!(drain(&mut other_rx), vec![payload.full.clone()]);
        assert!(pm.knows_transaction(other, &hash));

        // Nobody left who doesn't know it.
        let again = pm.broadcast(GossipItem::Transaction(hash), &payload, None);
        assert_eq!(again.sent(), 1);
        assert!(pm.knows_transaction(sender, &hash));
        let third = pm.broadcast(GossipItem::Transaction(hash), &payload, None);
        assert_eq!(third, BroadcastResult::default());
    }

    #[test]
    fn broadcast_sends_legacy_payload_to_legacy_peers() {
        let mut pm = manager(20, 1);
        let mut capable = Vec::new();
        for seed in 10..20 {
            capable.push(connect(&mut pm, seed, PROTOCOL_VERSION));
        }
        let mut legacy = Vec::new();
        for seed in 20..30 {
            legacy.push(connect(&mut pm, seed, HASH_ANNOUNCEMENT_VERSION - 1));
        }
        let (hash, payload) = tx_payload();

        let result = pm.broadcast(GossipItem::Transaction(hash), &payload, None);
        assert_eq!(result.legacy, 10);
        assert_eq!(result.full, 0);
        assert_eq!(result.announced, 10);

        for (_, rx) in legacy.iter_mut() {
            assert_eq!(drain(rx), vec![payload.legacy.clone()]);
        }
        for (_, rx) in capable.iter_mut() {
            assert_eq!(drain(rx), vec![payload.announcement.clone()]);
        }
    }

    #[test]
    fn peer_list_and_candidates() {
        let mut pm = manager(10, 1);
        let (channel, _rx) = PeerChannel::new(4);
        let address = PeerAddress {
            ip: "10.0.0.2".into(),
            port: 40000,
        };
        let id = pm
            .register_connection(channel, Direction::Inbound, Some(address), head(), 0)
            .unwrap();
        pm.handle_identify(id, &identify(2, PROTOCOL_VERSION), 0).unwrap();

        let list = pm.peer_list();
        assert_eq!(list.peers.len(), 1);
        // Advertised listening port replaces the ephemeral one.
        assert_eq!(list.peers[0].address.as_ref().unwrap().port, 9035);

        let entry = |seed: u8| PeerListEntry {
            identity: Identity::new([seed; 32]),
            address: Some(PeerAddress {
                ip: format!("10.0.1.{seed}"),
                port: 9035,
            }),
        };
        pm.process_peer_list(&PeerListMessage {
            peers: vec![entry(1), entry(2), entry(5), entry(5), entry(6), entry(7)],
        });
        // Self and connected identities skipped; buffer holds the newest two.
        let ips: Vec<String> = pm.candidate_addresses().map(|a| a.ip.clone()).collect();
        assert_eq!(ips, vec!["10.0.1.6".to_string(), "10.0.1.7".to_string()]);
    }
}
