//! Request/response RPC wire protocol: each message is a 4-byte big-endian
//! length prefix followed by a `serde_json` payload, mirroring the
//! `serde_json::to_vec`/`from_slice` framing the node already uses for its
//! gossip messages, adapted to a point-to-point stream instead of a
//! pubsub topic.

use crate::error::{NodeError, NodeResult};
use chain_core::{Block, Output, Transaction, UtxoKey};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_MESSAGE_BYTES: u32 = 16 * 1024 * 1024;

/// Request payloads for the node's RPC surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    SetTransaction(Transaction),
    SetBlock(Block),
    GetBalance { public_key: Vec<u8> },
    AddPeer { addr: String },
    GetPeers,
    Sync { from_hash: String, n: usize },
}

/// Response payloads, one variant per [`RpcRequest`] variant plus a
/// catch-all error response carrying the node-level error kind as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResponse {
    Ack,
    Balance(Vec<(UtxoKey, Output)>),
    Peers(Vec<String>),
    SyncResult { blocks: Vec<Block>, synced: bool },
    Error(String),
}

/// Writes `message` to `stream` as a length-prefixed JSON frame.
///
/// # Errors
///
/// Returns [`NodeError::Io`] on a write failure.
pub async fn write_frame<T: Serialize>(stream: &mut TcpStream, message: &T) -> NodeResult<()> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| NodeError::BadMessage(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| NodeError::BadMessage("message too large to frame".to_string()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one length-prefixed JSON frame from `stream`.
///
/// # Errors
///
/// Returns [`NodeError::Io`] on a read failure, or [`NodeError::BadMessage`]
/// if the declared length exceeds [`MAX_MESSAGE_BYTES`] or the payload does
/// not deserialize to `T`.
pub async fn read_frame<T: for<'de> Deserialize<'de>>(stream: &mut TcpStream) -> NodeResult<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        return Err(NodeError::BadMessage(format!(
            "frame of {len} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload).map_err(|e| NodeError::BadMessage(e.to_string()))
}
