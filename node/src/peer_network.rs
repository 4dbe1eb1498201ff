//! The peer network: owns the peer manager, dispatches every inbound
//! message, and wires the relay pipeline to the node's collaborators.
//!
//! Block and transaction handling live in [`crate::blocks`] and
//! [`crate::transactions`]; requests from peers are answered by the
//! [`CompactDataServer`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use relay_chain::{Accounts, Chain, MemPool, Verifier, WorkerPool};
use relay_messages::{BlockHashInfo, PeerAddress, WireMessage};
use relay_network::{
    spawn_reader, spawn_writer, Direction, InboundEvent, NetworkError, PeerChannel, PeerId, PeerManager,
};
use relay_protocol::{legacy, LocalNode};
use relay_types::{BlockHash, Identity, TxHash};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::compact_server::CompactDataServer;
use crate::config::NetworkConfig;
use crate::fetcher::Fetcher;
use crate::metrics::NetworkMetrics;
use crate::seen_ledger::SeenLedger;
use crate::shutdown::ShutdownController;
use crate::tracing_spans;
use crate::NodeError;

/// Inbound events buffered between reader tasks and the dispatch loop.
const INBOUND_QUEUE_CAPACITY: usize = 1024;

/// How often expired requests and ledger entries are cleaned up.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

/// External services the relay pipeline depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn Chain>,
    pub verifier: Arc<dyn Verifier>,
    pub mempool: Arc<dyn MemPool>,
    pub accounts: Arc<dyn Accounts>,
    pub workers: Arc<dyn WorkerPool>,
}

pub struct PeerNetwork {
    pub(crate) config: NetworkConfig,
    pub(crate) peer_manager: Arc<RwLock<PeerManager>>,
    pub(crate) chain: Arc<dyn Chain>,
    pub(crate) verifier: Arc<dyn Verifier>,
    pub(crate) mempool: Arc<dyn MemPool>,
    pub(crate) accounts: Arc<dyn Accounts>,
    pub(crate) workers: Arc<dyn WorkerPool>,
    pub(crate) compact_server: CompactDataServer,
    pub(crate) fetcher: Mutex<Fetcher>,
    pub(crate) seen_transactions: Mutex<SeenLedger<TxHash>>,
    pub(crate) blocks_in_flight: Mutex<SeenLedger<BlockHash>>,
    pub(crate) metrics: Arc<NetworkMetrics>,
    started: AtomicBool,
    enable_syncing: AtomicBool,
    shutdown: ShutdownController,
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    /// Bounds the message handlers running at once.
    handler_permits: Arc<Semaphore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerNetwork {
    pub fn new(config: NetworkConfig, identity: Identity, collaborators: Collaborators) -> Result<Self, NodeError> {
        config.validate()?;

        let local = LocalNode {
            identity,
            network_id: config.network_id,
            genesis_block_hash: collaborators.chain.genesis().hash(),
            agent: config.agent.clone(),
            port: Some(config.listen_port),
        };
        let peer_manager = PeerManager::new(config.peer_manager_config(), local);
        let compact_server = CompactDataServer::new(
            collaborators.chain.clone(),
            collaborators.mempool.clone(),
            config.compact_block_max_depth,
            config.block_transactions_max_depth,
        );
        let ttl = Duration::from_secs(config.seen_ledger_ttl_secs);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        Ok(Self {
            peer_manager: Arc::new(RwLock::new(peer_manager)),
            chain: collaborators.chain,
            verifier: collaborators.verifier,
            mempool: collaborators.mempool,
            accounts: collaborators.accounts,
            workers: collaborators.workers,
            compact_server,
            fetcher: Mutex::new(Fetcher::new(Duration::from_secs(config.request_timeout_secs))),
            seen_transactions: Mutex::new(SeenLedger::new(config.seen_ledger_capacity, ttl)),
            blocks_in_flight: Mutex::new(SeenLedger::new(config.seen_ledger_capacity, ttl)),
            metrics: Arc::new(NetworkMetrics::new()),
            started: AtomicBool::new(false),
            enable_syncing: AtomicBool::new(config.enable_syncing),
            shutdown: ShutdownController::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            handler_permits: Arc::new(Semaphore::new(config.max_concurrent_handlers)),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Start the dispatch and maintenance loops, and the accept loop if a
    /// listener is given. Starting twice is an error.
    pub async fn start(self: &Arc<Self>, listener: Option<TcpListener>) -> Result<(), NodeError> {
        let inbound_rx = self.inbound_rx.lock().await.take().ok_or(NodeError::AlreadyStarted)?;
        self.started.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(Arc::clone(self).dispatch_loop(inbound_rx)));
        tasks.push(tokio::spawn(Arc::clone(self).maintenance_loop()));
        drop(tasks);

        if let Some(listener) = listener {
            let accept = tokio::spawn(Arc::clone(self).accept_loop(listener));
            self.peer_manager.write().await.set_listener(accept);
        }

        tracing::info!(
            network = self.config.network_id.as_str(),
            port = self.config.listen_port,
            syncing = self.syncing_enabled(),
            "peer network started"
        );
        Ok(())
    }

    /// Close every connection and stop all background work. Verifications
    /// still running finish, but their results are discarded. Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.shutdown();
        let writers = self.peer_manager.write().await.close_all();
        writers.wait().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.metrics.connected_peers.set(0);
        tracing::info!("peer network stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn is_ready(&self) -> bool {
        self.is_started() && self.peer_manager.read().await.is_ready()
    }

    /// Readiness changes, delivered once per edge.
    pub async fn subscribe_ready(&self) -> broadcast::Receiver<bool> {
        self.peer_manager.read().await.subscribe_ready()
    }

    pub fn set_enable_syncing(&self, enabled: bool) {
        let previous = self.enable_syncing.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            tracing::info!(enabled, "syncing toggled");
        }
    }

    pub fn syncing_enabled(&self) -> bool {
        self.enable_syncing.load(Ordering::SeqCst)
    }

    pub fn peer_manager(&self) -> &Arc<RwLock<PeerManager>> {
        &self.peer_manager
    }

    pub fn metrics(&self) -> &Arc<NetworkMetrics> {
        &self.metrics
    }

    // -- Connections ---------------------------------------------------------

    /// Open an outbound connection.
    pub async fn connect(&self, address: PeerAddress) -> Result<PeerId, NodeError> {
        let stream = TcpStream::connect((address.ip.as_str(), address.port)).await?;
        self.attach_stream(stream, Direction::Outbound, Some(address)).await
    }

    /// Register a connected byte stream as a peer and start its transport
    /// tasks.
    pub async fn attach_stream<S>(
        &self,
        stream: S,
        direction: Direction,
        address: Option<PeerAddress>,
    ) -> Result<PeerId, NodeError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (channel, outbound_rx) = PeerChannel::new(self.config.peer_channel_capacity);
        let head = self.head_info();

        let mut pm = self.peer_manager.write().await;
        match pm.register_connection(channel, direction, address, head, now_secs()) {
            Ok(peer) => {
                let writer = spawn_writer(peer, outbound_rx, writer);
                let reader = spawn_reader(peer, reader, self.inbound_tx.clone());
                pm.attach_tasks(peer, writer, reader);
                Ok(peer)
            }
            Err(e) => {
                // Let the Disconnecting message reach the peer.
                if let NetworkError::Rejected(peer, _) = e {
                    spawn_writer(peer, outbound_rx, writer);
                }
                Err(e.into())
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let address = PeerAddress {
                ip: remote.ip().to_string(),
                port: remote.port(),
            };
            if let Err(e) = self.attach_stream(stream, Direction::Inbound, Some(address)).await {
                tracing::debug!(%remote, error = %e, "inbound connection not accepted");
            }
        }
    }

    // -- Dispatch ------------------------------------------------------------

    async fn dispatch_loop(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<InboundEvent>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => break,
                event = inbound_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                InboundEvent::Message { peer, message } => {
                    // Handshake traffic is handled in order; everything else
                    // may wait on verification and runs on its own task, once
                    // a handler slot is free.
                    if message.allowed_before_handshake() {
                        self.handle_message(peer, message).await;
                    } else {
                        let permit = tokio::select! {
                            _ = shutdown.wait() => break,
                            permit = Arc::clone(&self.handler_permits).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break,
                            },
                        };
                        let network = Arc::clone(&self);
                        tokio::spawn(async move {
                            network.handle_message(peer, message).await;
                            drop(permit);
                        });
                    }
                }
                InboundEvent::Closed(peer) => self.handle_closed(peer).await,
            }
        }
        tracing::debug!("dispatch loop stopped");
    }

    async fn maintenance_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }
            let now = Instant::now();
            let expired = self.fetcher.lock().await.expire(now);
            if expired > 0 {
                tracing::debug!(expired, "requests timed out");
            }
            self.seen_transactions.lock().await.prune(now);
            self.blocks_in_flight.lock().await.prune(now);
        }
    }

    /// Handle one message from a peer.
    pub async fn handle_message(&self, peer: PeerId, message: WireMessage) {
        if !self.is_started() {
            return;
        }
        self.metrics.messages_received.with_label_values(&[message.name()]).inc();

        if !message.allowed_before_handshake() {
            let connected = self
                .peer_manager
                .read()
                .await
                .get(peer)
                .is_some_and(|p| p.is_connected());
            if !connected {
                tracing::debug!(%peer, kind = message.name(), "message before handshake, ignoring");
                return;
            }
        }

        let span = tracing_spans::message_span(peer, message.name());
        self.dispatch(peer, message).instrument(span).await;
    }

    async fn dispatch(&self, peer: PeerId, message: WireMessage) {
        match message {
            WireMessage::Identify(identify) => self.handle_identify(peer, identify).await,
            WireMessage::Disconnecting(msg) => {
                {
                    let mut pm = self.peer_manager.write().await;
                    pm.handle_disconnecting(peer, &msg);
                    self.metrics.connected_peers.set(pm.connected_count() as i64);
                }
                self.peer_gone(peer).await;
            }
            WireMessage::PeerListRequest => {
                let list = self.peer_manager.read().await.peer_list();
                self.send(peer, WireMessage::PeerList(list)).await;
            }
            WireMessage::PeerList(list) => self.peer_manager.write().await.process_peer_list(&list),

            WireMessage::NewBlock(msg) => match legacy::decode_block(&msg) {
                Ok(block) => {
                    self.handle_new_block(Some(peer), block).await;
                }
                Err(e) => tracing::debug!(%peer, error = %e, "undecodable legacy block"),
            },
            WireMessage::NewBlockV2(msg) => {
                self.handle_new_block(Some(peer), msg.block).await;
            }
            WireMessage::NewBlockHashes(msg) => self.handle_block_hashes(peer, msg).await,
            WireMessage::GetCompactBlockRequest(request) => {
                let span = tracing_spans::request_span(peer, "compact_block", request.rpc_id);
                let response = span.in_scope(|| self.compact_server.handle_compact_block_request(&request));
                self.respond(peer, response).await;
            }
            WireMessage::GetCompactBlockResponse(response) => self.handle_compact_block_response(peer, response).await,
            WireMessage::GetBlockTransactionsRequest(request) => {
                let span = tracing_spans::request_span(peer, "block_transactions", request.rpc_id);
                let response = span.in_scope(|| self.compact_server.handle_block_transactions_request(&request));
                self.respond(peer, response).await;
            }
            WireMessage::GetBlockTransactionsResponse(response) => {
                self.handle_block_transactions_response(peer, response).await
            }
            WireMessage::CannotSatisfyRequest(msg) => {
                if self.fetcher.lock().await.take(peer, msg.rpc_id).is_some() {
                    tracing::debug!(%peer, rpc_id = msg.rpc_id, "peer declined request");
                }
            }

            WireMessage::NewTransaction(msg) => match legacy::decode_transaction(&msg) {
                Ok(transaction) => {
                    self.handle_new_transaction(Some(peer), transaction).await;
                }
                Err(e) => tracing::debug!(%peer, error = %e, "undecodable legacy transaction"),
            },
            WireMessage::NewTransactionV2(msg) => {
                self.handle_new_transaction(Some(peer), msg.transaction).await;
            }
            WireMessage::NewPooledTransactionHashes(msg) => self.handle_pooled_transaction_hashes(peer, msg).await,
            WireMessage::PooledTransactionsRequest(request) => {
                let span = tracing_spans::request_span(peer, "pooled_transactions", request.rpc_id);
                let response = span.in_scope(|| self.compact_server.handle_pooled_transactions_request(&request));
                self.respond(peer, response).await;
            }
            WireMessage::PooledTransactionsResponse(response) => {
                self.handle_pooled_transactions_response(peer, response).await
            }
        }
    }

    async fn handle_identify(&self, peer: PeerId, identify: relay_messages::IdentifyMessage) {
        let result = {
            let mut pm = self.peer_manager.write().await;
            let result = pm.handle_identify(peer, &identify, now_secs());
            self.metrics.connected_peers.set(pm.connected_count() as i64);
            result
        };
        match result {
            Ok(()) => self.send(peer, WireMessage::PeerListRequest).await,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "identify rejected");
                self.peer_gone(peer).await;
            }
        }
    }

    /// The reader task for `peer` ended.
    pub async fn handle_closed(&self, peer: PeerId) {
        {
            let mut pm = self.peer_manager.write().await;
            pm.disconnect(peer, None, now_secs());
            self.metrics.connected_peers.set(pm.connected_count() as i64);
        }
        self.peer_gone(peer).await;
    }

    async fn peer_gone(&self, peer: PeerId) {
        self.fetcher.lock().await.forget_peer(peer);
    }

    // -- Sending -------------------------------------------------------------

    pub(crate) async fn send(&self, peer: PeerId, message: WireMessage) {
        if let Err(e) = self.peer_manager.read().await.send(peer, message) {
            tracing::debug!(%peer, error = %e, "message not sent");
        }
    }

    pub(crate) async fn send_request(&self, peer: PeerId, request: WireMessage) {
        self.metrics.requests_sent.inc();
        self.send(peer, request).await;
    }

    async fn respond(&self, peer: PeerId, response: WireMessage) {
        if let WireMessage::CannotSatisfyRequest(decline) = &response {
            tracing::debug!(%peer, rpc_id = decline.rpc_id, "declining request");
            self.metrics.requests_declined.inc();
        }
        self.send(peer, response).await;
    }

    pub(crate) fn head_info(&self) -> BlockHashInfo {
        let head = self.chain.head();
        BlockHashInfo {
            hash: head.hash(),
            sequence: head.sequence,
        }
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
