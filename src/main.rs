mod cli;
mod command;
mod error;
mod miner_task;
mod peer;
mod server;
mod wire;

use chain_core::NodeConfig;
use clap::Parser;
use cli::Cli;
use command::Command;
use server::FullNode;
use shared::KeyPair;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use wire::{read_frame, write_frame, RpcRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = NodeConfig {
        difficulty: cli.difficulty,
        coinbase_reward: cli.coinbase_reward,
        confirmation: cli.confirmation,
        remine_on_tail_change: cli.remine_on_tail_change,
    };

    let miner_key = KeyPair::generate()?;
    info!(
        public_key_bytes = miner_key.public_key.as_bytes().len(),
        "generated node keypair"
    );

    let (command_tx, mut command_rx) = command::channel();
    let (miner_tx, miner_rx) = command::channel();
    let node = FullNode::new(config, command_tx);

    let listener = TcpListener::bind(&cli.listen).await?;
    let our_addr = listener.local_addr()?.to_string();
    info!(local_addr = %our_addr, "rpc listener bound");

    for addr in cli.peers {
        if let Err(err) = node.add_mutual_peer(addr.clone(), our_addr.clone()).await {
            warn!(%addr, error = %err, "failed to add bootstrap peer");
        }
    }

    let listener_node = Arc::clone(&node);
    tokio::spawn(async move {
        loop {
            let (socket, _peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            let node = Arc::clone(&listener_node);
            tokio::spawn(handle_connection(node, socket));
        }
    });

    tokio::spawn(miner_task::run(Arc::clone(&node), miner_key, miner_rx));

    let dispatch_node = Arc::clone(&node);
    let dispatch_our_addr = our_addr.clone();
    tokio::spawn(async move {
        dispatch_commands(dispatch_node, &mut command_rx, miner_tx, dispatch_our_addr).await
    });

    let sync_node = Arc::clone(&node);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            sync_node.sync_to_latest().await;
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Serves one accepted connection: request/response pairs until the peer
/// closes the stream or sends a malformed frame.
async fn handle_connection(node: Arc<FullNode>, mut socket: tokio::net::TcpStream) {
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
}

/// Routes commands from the shared command channel: `Restart`/`Stop` are
/// forwarded to the mining supervisor's own channel, `Sync` kicks off the
/// sync loop on a fresh task, `AddPeer`/`Introduce` reciprocate peering
/// with the remote, and the remaining inspection commands log their
/// result.
async fn dispatch_commands(
    node: Arc<FullNode>,
    commands: &mut command::CommandReceiver,
    miner_tx: command::CommandSender,
    our_addr: String,
) {
    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Restart | Command::Stop => {
                let _ = miner_tx.send(cmd);
            }
            Command::Sync => {
                let node = Arc::clone(&node);
                tokio::spawn(async move { node.sync_to_latest().await });
            }
            Command::AddPeer(addr) => {
                if let Err(err) = node.add_mutual_peer(addr.clone(), our_addr.clone()).await {
                    warn!(%addr, error = %err, "add_peer command failed");
                }
            }
            Command::Introduce(addr) => {
                if let Err(err) = node.introduce(&addr).await {
                    warn!(%addr, error = %err, "introduce command failed");
                }
            }
            Command::ListPeer => {
                info!(peers = ?node.get_peers().await, "peer list");
            }
            Command::Show => {
                info!(height = node.height().await, tail = %node.tail_hash().await, "node status");
            }
            Command::Key | Command::Start => {}
        }
    }
}
