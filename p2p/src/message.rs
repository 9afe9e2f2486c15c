use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use codec::{impl_codec, Decoder, Encoder};
use types::block::Block;
use types::tx::Transaction;

/// Largest batch a `GetBlocks` responder will return.
pub const MAX_BLOCKS_PER_BATCH: usize = 50;

/// Hard cap on a single frame; anything larger is a protocol violation.
const MAX_FRAME_LEN: u32 = 32 * 1024 * 1024;

pub const PROTOCOL_VERSION: u32 = 1;

/// Wire messages, framed as a 4-byte little-endian length followed by the
/// encoded payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Handshake, sent by both sides on connect.
    Version {
        version: u32,
        block_height: u64,
        from_addr: String,
    },
    /// Request canonical blocks starting at a height.
    GetBlocks { from_height: u64 },
    /// Bounded batch answering `GetBlocks`, in canonical order.
    Blocks { blocks: Vec<Block> },
    /// Gossip: a single new block.
    Block { block: Block },
    /// Gossip: a single new transaction.
    Tx { tx: Transaction },
}

impl_codec!(Message);

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = msg.encode()?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        bail!("outgoing frame of {len} bytes exceeds limit");
    }
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        bail!("incoming frame of {len} bytes exceeds limit");
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Message::decode(&payload)
}
