use crate::command::{Command, CommandReceiver};
use crate::server::FullNode;
use chain_core::{mine_block, MineCommand, MiningOutcome};
use shared::KeyPair;
use std::sync::{mpsc, Arc};
use tracing::{info, warn};

/// Drives the background mining loop: drains the pool into a candidate
/// block at the current tail, mines it on a blocking task, and submits a
/// successful solution back through the node's own `set_block` so local
/// and remote blocks share the same validation path. A `Restart` command
/// interrupts the in-progress job and starts over at the (possibly new)
/// tail; a `Stop` command ends the supervisor.
pub async fn run(node: Arc<FullNode>, miner_key: KeyPair, mut commands: CommandReceiver) {
    loop {
        let (cancel_tx, cancel_rx) = mpsc::channel::<MineCommand>();
        let job = spawn_job(Arc::clone(&node), miner_key.clone(), cancel_rx);
        tokio::pin!(job);

        loop {
            tokio::select! {
                result = &mut job => {
                    match result {
                        Ok(Some(outcome)) => {
                            if !outcome.rejected_txs.is_empty() {
                                node.evict_transactions(&outcome.rejected_txs).await;
                            }
                            if let Err(err) = node.set_block(outcome.block, true).await {
                                warn!(%err, "locally mined block rejected");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%err, "mining task panicked"),
                    }
                    break;
                }
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Restart) => {
                            let _ = cancel_tx.send(MineCommand::Restart);
                            break;
                        }
                        Some(Command::Stop) | None => {
                            let _ = cancel_tx.send(MineCommand::Stop);
                            return;
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }
}

async fn spawn_job(
    node: Arc<FullNode>,
    miner_key: KeyPair,
    cancel: mpsc::Receiver<MineCommand>,
) -> Result<Option<MiningOutcome>, tokio::task::JoinError> {
    let config = *node.config();
    let prev_hash = node.tail_hash().await;
    let height = node.height().await + 1;
    let ledger = node.ledger_at_depth(0).await;
    let txs = node.pool_snapshot().await;
    let miner_pk = miner_key.public_key.as_bytes().to_vec();

    tokio::task::spawn_blocking(move || {
        match mine_block(
            &txs,
            &prev_hash,
            config.coinbase_reward,
            height,
            &miner_pk,
            &ledger,
            config.difficulty,
            &cancel,
        ) {
            Ok(outcome) => {
                info!(hash = %outcome.block.hash, "mined block");
                Some(outcome)
            }
            Err(_) => None,
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::NodeConfig;
    use std::time::Duration;

    /// A difficulty no real SHA-256 digest will satisfy, so a job started
    /// against it never completes on its own within the test's lifetime.
    fn unsatisfiable_config() -> NodeConfig {
        NodeConfig {
            difficulty: 256,
            coinbase_reward: 50.0,
            confirmation: 100,
            remine_on_tail_change: true,
        }
    }

    #[tokio::test]
    async fn restart_keeps_the_supervisor_running_but_stop_ends_it() {
        let miner_key = KeyPair::generate().unwrap();
        let (node_commands_tx, _node_commands_rx) = crate::command::channel();
        let node = FullNode::new(unsatisfiable_config(), node_commands_tx);

        let (commands_tx, commands_rx) = crate::command::channel();
        let handle = tokio::spawn(run(Arc::clone(&node), miner_key, commands_rx));

        commands_tx.send(Command::Restart).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            !handle.is_finished(),
            "Restart should cancel the in-flight job and start a new one, not end the supervisor"
        );

        commands_tx.send(Command::Stop).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("supervisor did not stop after Command::Stop")
            .unwrap();
    }
}
