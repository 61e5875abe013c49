use crate::command::{Command, CommandSender};
use crate::error::{NodeError, NodeResult};
use crate::peer::{ConnectionState, PeerRegistry};
use crate::wire::{read_frame, write_frame, RpcRequest, RpcResponse};
use chain_core::{AddOutcome, Block, Blockchain, ChainError, NodeConfig, Output, Transaction, TransactionPool, UtxoKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const LIVENESS_BASE_BACKOFF: Duration = Duration::from_secs(3);
const LIVENESS_MAX_FAILURES: u32 = 3;
const SYNC_BATCH: usize = 5;

/// Chain tree + pending transaction pool. Guarded by one lock: `add_block`
/// must be serialized end to end, and the pool is drained in lockstep
/// with it.
struct ChainState {
    chain: Blockchain,
    pool: TransactionPool,
}

/// Peers, the out-of-sync failure counter and the syncing flag, guarded
/// together: the counter and flag only ever change alongside peer-facing
/// RPC outcomes.
struct ServerState {
    peers: PeerRegistry,
    consecutive_failures: u64,
    syncing: bool,
}

/// The node: owns chain state and peer state behind their own locks, and
/// a handle to the command channel the mining supervisor and sync loop
/// listen on.
pub struct FullNode {
    config: NodeConfig,
    chain_state: RwLock<ChainState>,
    server_state: RwLock<ServerState>,
    commands: CommandSender,
}

impl FullNode {
    #[must_use]
    pub fn new(config: NodeConfig, commands: CommandSender) -> Arc<Self> {
        Arc::new(Self {
            config,
            chain_state: RwLock::new(ChainState {
                chain: Blockchain::genesis(),
                pool: TransactionPool::new(),
            }),
            server_state: RwLock::new(ServerState {
                peers: PeerRegistry::new(),
                consecutive_failures: 0,
                syncing: false,
            }),
            commands,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub async fn tail_hash(&self) -> String {
        self.chain_state.read().await.chain.tail_hash().to_string()
    }

    pub async fn height(&self) -> u64 {
        self.chain_state.read().await.chain.height()
    }

    pub async fn ledger_at_depth(&self, depth: u64) -> chain_core::Ledger {
        self.chain_state.read().await.chain.ledger_at_depth(depth)
    }

    pub async fn pool_snapshot(&self) -> Vec<Transaction> {
        self.chain_state.read().await.pool.drain_snapshot()
    }

    /// Drops pooled transactions that a mining job found it could no
    /// longer apply against its ledger snapshot. They are not re-tried.
    pub async fn evict_transactions(&self, txs: &[Transaction]) {
        let mut state = self.chain_state.write().await;
        state.pool.remove_all(txs.iter().map(|tx| tx.hash.as_str()));
    }

    /// Validates `tx` against the tail ledger. Invalid transactions are
    /// dropped silently (logged); valid, new ones are pooled and, unless
    /// this call originated from the sync loop, rebroadcast.
    pub async fn set_transaction(&self, tx: Transaction, broadcast: bool) {
        let tail_ledger = self.chain_state.read().await.chain.ledger_at_depth(0);

        if let Err(err) = tx.verify(&tail_ledger) {
            debug!(hash = %tx.hash, error = %err, "dropping invalid transaction");
            return;
        }

        let inserted = self.chain_state.write().await.pool.insert(tx.clone());

        if inserted && broadcast {
            self.broadcast(RpcRequest::SetTransaction(tx)).await;
        }
    }

    /// Runs `add_block` against the chain tree and wires its outcome into
    /// the out-of-sync counter, the remine command and peer broadcast.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ChainError`], wrapped, on rejection.
    pub async fn set_block(&self, block: Block, broadcast: bool) -> NodeResult<()> {
        let outcome = {
            let mut state = self.chain_state.write().await;
            state
                .chain
                .add_block(block.clone(), &self.config, &mut state.pool)
        };

        match outcome {
            Ok(AddOutcome { tail_changed }) => {
                {
                    let mut server = self.server_state.write().await;
                    server.consecutive_failures = 0;
                }
                if tail_changed && self.config.remine_on_tail_change {
                    let _ = self.commands.send(Command::Restart);
                }
                if broadcast {
                    self.broadcast(RpcRequest::SetBlock(block)).await;
                }
                Ok(())
            }
            Err(ChainError::ParentMissing) => {
                self.note_out_of_sync().await;
                Err(NodeError::Chain(ChainError::ParentMissing))
            }
            Err(err) => Err(NodeError::Chain(err)),
        }
    }

    async fn note_out_of_sync(&self) {
        let mut server = self.server_state.write().await;
        if server.syncing {
            return;
        }
        server.consecutive_failures += 1;
        if server.consecutive_failures >= self.config.confirmation {
            server.consecutive_failures = 0;
            server.syncing = true;
            drop(server);
            let _ = self.commands.send(Command::Sync);
        }
    }

    /// Balance snapshot at depth `confirmation`, filtered to `public_key`.
    pub async fn get_balance(&self, public_key: &[u8]) -> Vec<(UtxoKey, Output)> {
        let ledger = self
            .chain_state
            .read()
            .await
            .chain
            .ledger_at_depth(self.config.confirmation);
        ledger.entries_for_public_key(public_key)
    }

    /// Registers `addr` and spawns its liveness watcher.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PeerAlreadyExists`] if `addr` is already
    /// registered.
    pub async fn add_peer(self: &Arc<Self>, addr: String) -> NodeResult<()> {
        {
            let mut server = self.server_state.write().await;
            if !server.peers.add(addr.clone()) {
                return Err(NodeError::PeerAlreadyExists(addr));
            }
        }
        self.spawn_liveness_watcher(addr);
        Ok(())
    }

    pub async fn get_peers(&self) -> Vec<String> {
        self.server_state.read().await.peers.addresses()
    }

    pub async fn get_blocks_from(&self, from_hash: &str, n: usize) -> (Vec<Block>, bool) {
        self.chain_state
            .read()
            .await
            .chain
            .get_blocks_from(from_hash, n)
    }

    /// Dispatches one RPC request against this node, for the listener to
    /// call per accepted connection.
    pub async fn handle_request(self: &Arc<Self>, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::SetTransaction(tx) => {
                self.set_transaction(tx, true).await;
                RpcResponse::Ack
            }
            RpcRequest::SetBlock(block) => match self.set_block(block, true).await {
                Ok(()) => RpcResponse::Ack,
                Err(err) => RpcResponse::Error(err.to_string()),
            },
            RpcRequest::GetBalance { public_key } => {
                RpcResponse::Balance(self.get_balance(&public_key).await)
            }
            RpcRequest::AddPeer { addr } => match self.add_peer(addr).await {
                Ok(()) => RpcResponse::Ack,
                Err(err) => RpcResponse::Error(err.to_string()),
            },
            RpcRequest::GetPeers => RpcResponse::Peers(self.get_peers().await),
            RpcRequest::Sync { from_hash, n } => {
                let (blocks, synced) = self.get_blocks_from(&from_hash, n).await;
                RpcResponse::SyncResult { blocks, synced }
            }
        }
    }

    /// Registers `addr` locally, then asks it to register us in turn.
    /// `peer_already_exist` from the remote is treated as success; any
    /// other failure undoes the local registration.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::PeerUnreachable`] if the remote call fails or
    /// refuses for any other reason.
    pub async fn add_mutual_peer(self: &Arc<Self>, addr: String, our_addr: String) -> NodeResult<()> {
        self.add_peer(addr.clone()).await?;

        match self
            .call(&addr, &RpcRequest::AddPeer { addr: our_addr })
            .await
        {
            Ok(RpcResponse::Ack) => Ok(()),
            Ok(RpcResponse::Error(msg)) if msg.contains("already registered") => Ok(()),
            Ok(_) | Err(_) => {
                self.server_state.write().await.peers.remove(&addr);
                Err(NodeError::PeerUnreachable(addr))
            }
        }
    }

    /// Round-robins over `Ready` peers pulling batches of blocks until a
    /// peer reports `synced` or none remain reachable.
    pub async fn sync_to_latest(self: &Arc<Self>) {
        loop {
            let ready = self.server_state.read().await.peers.ready_addresses();
            if ready.is_empty() {
                break;
            }

            let mut made_progress = false;
            for addr in &ready {
                let tail_hash = self.tail_hash().await;
                let request = RpcRequest::Sync {
                    from_hash: tail_hash,
                    n: SYNC_BATCH,
                };
                match self.call(addr, &request).await {
                    Ok(RpcResponse::SyncResult { blocks, synced }) => {
                        for block in blocks {
                            if let Err(err) = self.set_block(block, false).await {
                                debug!(%addr, error = %err, "sync block rejected");
                            }
                        }
                        made_progress = true;
                        if synced {
                            let mut server = self.server_state.write().await;
                            server.consecutive_failures = 0;
                            server.syncing = false;
                            return;
                        }
                    }
                    Ok(_) | Err(_) => continue,
                }
            }

            if !made_progress {
                break;
            }
        }

        let mut server = self.server_state.write().await;
        server.consecutive_failures = 0;
        server.syncing = false;
    }

    /// Asks `addr` for its known peers and registers each locally.
    ///
    /// # Errors
    ///
    /// Propagates the RPC call's error.
    pub async fn introduce(self: &Arc<Self>, addr: &str) -> NodeResult<()> {
        match self.call(addr, &RpcRequest::GetPeers).await? {
            RpcResponse::Peers(addrs) => {
                for peer_addr in addrs {
                    let _ = self.add_peer(peer_addr).await;
                }
                Ok(())
            }
            _ => Err(NodeError::BadMessage(
                "unexpected response to GetPeers".to_string(),
            )),
        }
    }

    async fn call(&self, addr: &str, request: &RpcRequest) -> NodeResult<RpcResponse> {
        let mut stream = timeout(RPC_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| NodeError::RpcTimeout(addr.to_string()))??;

        timeout(RPC_TIMEOUT, write_frame(&mut stream, request))
            .await
            .map_err(|_| NodeError::RpcTimeout(addr.to_string()))??;

        timeout(RPC_TIMEOUT, read_frame::<RpcResponse>(&mut stream))
            .await
            .map_err(|_| NodeError::RpcTimeout(addr.to_string()))?
    }

    /// Sequential broadcast in peer-registry order; a failed delivery is
    /// logged and dropped rather than retried or failing the caller.
    async fn broadcast(&self, request: RpcRequest) {
        let addrs = self.server_state.read().await.peers.addresses();
        for addr in addrs {
            if let Err(err) = self.call(&addr, &request).await {
                warn!(%addr, error = %err, "broadcast to peer failed");
            }
        }
    }

    fn spawn_liveness_watcher(self: &Arc<Self>, addr: String) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut backoff = LIVENESS_BASE_BACKOFF;
            loop {
                tokio::time::sleep(backoff).await;
                let reachable = TcpStream::connect(&addr).await.is_ok();

                let mut server = node.server_state.write().await;
                let Some(peer) = server.peers.get_mut(&addr) else {
                    return;
                };

                if reachable {
                    peer.state = ConnectionState::Ready;
                    peer.consecutive_failures = 0;
                    backoff = LIVENESS_BASE_BACKOFF;
                    continue;
                }

                peer.consecutive_failures += 1;
                if peer.consecutive_failures >= LIVENESS_MAX_FAILURES {
                    peer.state = ConnectionState::Closed;
                    warn!(%addr, "evicting peer after repeated liveness failures");
                    server.peers.remove(&addr);
                    return;
                }
                peer.state = ConnectionState::Failing;
                backoff *= 2;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{mine_block, Input};
    use shared::KeyPair;
    use std::sync::mpsc;

    fn trivial_config() -> NodeConfig {
        NodeConfig {
            difficulty: 0,
            coinbase_reward: 50.0,
            confirmation: 0,
            remine_on_tail_change: true,
        }
    }

    fn mine_one(node_config: &NodeConfig, prev_hash: &str, pk: &[u8]) -> Block {
        let (_tx, rx) = mpsc::channel();
        let outcome = mine_block(&[], prev_hash, node_config.coinbase_reward, 1, pk, &chain_core::Ledger::new(), node_config.difficulty, &rx).unwrap();
        outcome.block
    }

    fn mine_child_block(config: &NodeConfig, prev_hash: &str, height: u64, pk: &[u8]) -> Block {
        let (_tx, rx) = mpsc::channel();
        mine_block(
            &[],
            prev_hash,
            config.coinbase_reward,
            height,
            pk,
            &chain_core::Ledger::new(),
            config.difficulty,
            &rx,
        )
        .unwrap()
        .block
    }

    fn mine_child_with_txs(
        config: &NodeConfig,
        prev_hash: &str,
        height: u64,
        pk: &[u8],
        txs: &[Transaction],
        ledger: &chain_core::Ledger,
    ) -> Block {
        let (_tx, rx) = mpsc::channel();
        mine_block(
            txs,
            prev_hash,
            config.coinbase_reward,
            height,
            pk,
            ledger,
            config.difficulty,
            &rx,
        )
        .unwrap()
        .block
    }

    /// Spins up a real `FullNode` behind a real `TcpListener`, serving
    /// requests the way `main.rs`'s accept loop does, for tests that need
    /// more than one node talking over actual sockets.
    async fn spawn_serving_node(config: NodeConfig) -> (Arc<FullNode>, String) {
        let (command_tx, _command_rx) = crate::command::channel();
        let node = FullNode::new(config, command_tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let serving_node = Arc::clone(&node);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let node = Arc::clone(&serving_node);
                tokio::spawn(async move {
                    loop {
                        let request: RpcRequest = match read_frame(&mut socket).await {
                            Ok(request) => request,
                            Err(_) => return,
                        };
                        let response = node.handle_request(request).await;
                        if write_frame(&mut socket, &response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (node, addr)
    }

    #[tokio::test]
    async fn genesis_then_one_block_reports_coinbase_balance() {
        let keypair = KeyPair::generate().unwrap();
        let config = trivial_config();
        let (tx, _rx) = crate::command::channel();
        let node = FullNode::new(config, tx);

        let block = mine_one(&config, chain_core::GENESIS_HASH, keypair.public_key.as_bytes());
        node.set_block(block, false).await.unwrap();

        let balance = node.get_balance(keypair.public_key.as_bytes()).await;
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].1.value, 50.0);
    }

    #[tokio::test]
    async fn set_transaction_drops_invalid_tx_silently() {
        let keypair = KeyPair::generate().unwrap();
        let config = trivial_config();
        let (tx_send, _rx) = crate::command::channel();
        let node = FullNode::new(config, tx_send);

        let mut bad_tx = Transaction::new(
            vec![Input::new("missing".to_string(), 0, Vec::new())],
            vec![chain_core::Output::new(1.0, keypair.public_key.as_bytes().to_vec())],
        );
        bad_tx.fill_hash().unwrap();

        node.set_transaction(bad_tx, false).await;
        assert!(node.pool_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn add_peer_rejects_duplicate() {
        let config = trivial_config();
        let (tx, _rx) = crate::command::channel();
        let node = FullNode::new(config, tx);

        node.add_peer("127.0.0.1:9000".to_string()).await.unwrap();
        assert!(matches!(
            node.add_peer("127.0.0.1:9000".to_string()).await,
            Err(NodeError::PeerAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn rpc_round_trip_over_real_socket_reports_balance() {
        let keypair = KeyPair::generate().unwrap();
        let config = trivial_config();
        let (tx, _rx) = crate::command::channel();
        let node = FullNode::new(config, tx);

        let block = mine_one(&config, chain_core::GENESIS_HASH, keypair.public_key.as_bytes());
        node.set_block(block, false).await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_node = Arc::clone(&node);
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request: RpcRequest = read_frame(&mut socket).await.unwrap();
            let response = server_node.handle_request(request).await;
            write_frame(&mut socket, &response).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(
            &mut client,
            &RpcRequest::GetBalance {
                public_key: keypair.public_key.as_bytes().to_vec(),
            },
        )
        .await
        .unwrap();
        let response: RpcResponse = read_frame(&mut client).await.unwrap();

        match response {
            RpcResponse::Balance(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].1.value, 50.0);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transfer_is_visible_to_the_receiving_peer_after_confirmation() {
        let wallet_a = KeyPair::generate().unwrap();
        let wallet_b = KeyPair::generate().unwrap();
        let config = NodeConfig {
            difficulty: 0,
            coinbase_reward: 10.0,
            confirmation: 1,
            remine_on_tail_change: true,
        };

        let (node_a, addr_a) = spawn_serving_node(config).await;
        let (node_b, addr_b) = spawn_serving_node(config).await;
        node_a
            .add_mutual_peer(addr_b.clone(), addr_a.clone())
            .await
            .unwrap();

        let block1 = mine_child_block(
            &config,
            chain_core::GENESIS_HASH,
            1,
            wallet_a.public_key.as_bytes(),
        );
        let cb1_hash = block1.coinbase.hash.clone();
        node_a.set_block(block1.clone(), true).await.unwrap();

        let block2 = mine_child_block(&config, &block1.hash, 2, wallet_a.public_key.as_bytes());
        node_a.set_block(block2.clone(), true).await.unwrap();
        assert_eq!(node_b.height().await, 2);

        let mut transfer = Transaction::new(
            vec![Input::new(cb1_hash, 0, Vec::new())],
            vec![
                chain_core::Output::new(5.0, wallet_b.public_key.as_bytes().to_vec()),
                chain_core::Output::new(0.5, wallet_a.public_key.as_bytes().to_vec()),
            ],
        );
        transfer.sign_input(0, &wallet_a.private_key).unwrap();
        transfer.fill_hash().unwrap();

        node_a.set_transaction(transfer.clone(), true).await;

        let ledger = node_a.ledger_at_depth(0).await;
        let block3 = mine_child_with_txs(
            &config,
            &block2.hash,
            3,
            wallet_a.public_key.as_bytes(),
            &[transfer],
            &ledger,
        );
        node_a.set_block(block3.clone(), true).await.unwrap();

        let block4 = mine_child_block(&config, &block3.hash, 4, wallet_a.public_key.as_bytes());
        node_a.set_block(block4, true).await.unwrap();

        let balance = node_b.get_balance(wallet_b.public_key.as_bytes()).await;
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].1.value, 5.0);
    }

    #[tokio::test]
    async fn out_of_sync_node_catches_up_after_consecutive_parent_missing() {
        let keypair = KeyPair::generate().unwrap();
        let config = NodeConfig {
            difficulty: 0,
            coinbase_reward: 50.0,
            confirmation: 2,
            remine_on_tail_change: true,
        };

        // B mines two blocks entirely on its own; A never sees them land.
        let (node_b, addr_b) = spawn_serving_node(config).await;
        let block1 = mine_child_block(
            &config,
            chain_core::GENESIS_HASH,
            1,
            keypair.public_key.as_bytes(),
        );
        node_b.set_block(block1.clone(), false).await.unwrap();
        let block2 = mine_child_block(&config, &block1.hash, 2, keypair.public_key.as_bytes());
        node_b.set_block(block2.clone(), false).await.unwrap();

        let (command_tx, mut command_rx) = crate::command::channel();
        let node_a = FullNode::new(config, command_tx);
        node_a.add_peer(addr_b.clone()).await.unwrap();

        // An orphan block built atop B's tip looks exactly like the tip of
        // a chain A hasn't caught up to yet.
        let orphan = mine_child_block(&config, &block2.hash, 3, keypair.public_key.as_bytes());

        assert!(matches!(
            node_a.set_block(orphan.clone(), false).await,
            Err(NodeError::Chain(ChainError::ParentMissing))
        ));
        assert!(command_rx.try_recv().is_err());

        assert!(matches!(
            node_a.set_block(orphan, false).await,
            Err(NodeError::Chain(ChainError::ParentMissing))
        ));
        assert!(matches!(command_rx.try_recv(), Ok(Command::Sync)));

        node_a.sync_to_latest().await;

        assert_eq!(node_a.height().await, node_b.height().await);
        assert_eq!(node_a.tail_hash().await, node_b.tail_hash().await);
    }

    #[tokio::test]
    async fn double_spend_is_rejected_on_the_peer_that_lost_the_race() {
        let miner = KeyPair::generate().unwrap();
        let victim = KeyPair::generate().unwrap();
        let payee_x = KeyPair::generate().unwrap();
        let payee_y = KeyPair::generate().unwrap();
        let config = NodeConfig {
            difficulty: 0,
            coinbase_reward: 10.0,
            confirmation: 1,
            remine_on_tail_change: true,
        };

        let (node_a, addr_a) = spawn_serving_node(config).await;
        let (node_b, addr_b) = spawn_serving_node(config).await;
        node_a
            .add_mutual_peer(addr_b.clone(), addr_a.clone())
            .await
            .unwrap();

        let block1 = mine_child_block(
            &config,
            chain_core::GENESIS_HASH,
            1,
            victim.public_key.as_bytes(),
        );
        let cb1_hash = block1.coinbase.hash.clone();
        node_a.set_block(block1.clone(), true).await.unwrap();
        assert_eq!(node_b.height().await, 1);

        let mut tx1 = Transaction::new(
            vec![Input::new(cb1_hash.clone(), 0, Vec::new())],
            vec![chain_core::Output::new(
                10.0,
                payee_x.public_key.as_bytes().to_vec(),
            )],
        );
        tx1.sign_input(0, &victim.private_key).unwrap();
        tx1.fill_hash().unwrap();

        let mut tx2 = Transaction::new(
            vec![Input::new(cb1_hash, 0, Vec::new())],
            vec![chain_core::Output::new(
                10.0,
                payee_y.public_key.as_bytes().to_vec(),
            )],
        );
        tx2.sign_input(0, &victim.private_key).unwrap();
        tx2.fill_hash().unwrap();

        let ledger = node_a.ledger_at_depth(0).await;
        let block2 = mine_child_with_txs(
            &config,
            &block1.hash,
            2,
            miner.public_key.as_bytes(),
            &[tx1],
            &ledger,
        );
        node_a.set_block(block2, true).await.unwrap();

        // tx2 spends the same coinbase output tx1 already consumed; on the
        // peer that received block2 it no longer exists.
        let ledger_b = node_b.ledger_at_depth(0).await;
        assert!(matches!(
            tx2.verify(&ledger_b),
            Err(ChainError::UnknownInput)
        ));

        node_b.set_transaction(tx2, false).await;
        assert!(node_b.pool_snapshot().await.is_empty());
    }
}
