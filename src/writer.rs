//! Per-connection writer task.
//!
//! Worker tasks finish out of order, so each connection owns one task that
//! serializes their frames onto the socket. Workers hold cloned
//! [`WriterHandle`]s; the task exits once every handle is dropped and the
//! queue is drained.
//!
//! ```text
//! worker 1 ─┐
//! worker 2 ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► TCP write half
//! worker N ─┘
//! ```
//!
//! The channel is bounded; a full queue makes [`WriterHandle::send`] wait.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::codec::MsgPackCodec;
use crate::error::{Result, ServeError};
use crate::protocol::{Header, HEADER_SIZE};

/// Frames coalesced into one write.
const MAX_BATCH_FRAMES: usize = 64;

/// An encoded header plus its payload, queued for the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    header: [u8; HEADER_SIZE],
    payload: Bytes,
}

impl OutboundFrame {
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Serialize `message` as the payload; `header` gets the payload length.
    pub fn message<T: Serialize>(header: impl FnOnce(u32) -> Header, message: &T) -> Result<Self> {
        let payload = MsgPackCodec::encode(message)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            ServeError::Protocol(format!("payload of {} bytes exceeds u32", payload.len()))
        })?;
        Ok(Self::new(&header(len), payload))
    }

    #[cfg(test)]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Header plus payload.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Cloneable sender into a connection's writer task.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// [`ServeError::ConnectionClosed`] once the writer task has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ServeError::ConnectionClosed)
    }
}

/// Spawn a writer task over `writer` with a queue of `capacity` frames.
///
/// The returned task resolves after the last handle is dropped and all
/// queued frames are flushed, or on the first write error.
pub fn spawn_writer<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(write_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn write_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();

    while let Some(first) = rx.recv().await {
        let mut frames = 1;
        encode_into(&mut out, &first);

        while frames < MAX_BATCH_FRAMES {
            match rx.try_recv() {
                Ok(frame) => {
                    encode_into(&mut out, &frame);
                    frames += 1;
                }
                Err(_) => break,
            }
        }

        trace!(frames, bytes = out.len(), "writing batch");
        writer.write_all(&out).await?;
        writer.flush().await?;
        out.clear();
    }

    writer.shutdown().await?;
    Ok(())
}

fn encode_into(out: &mut BytesMut, frame: &OutboundFrame) {
    out.reserve(frame.size());
    out.put_slice(&frame.header);
    out.put_slice(&frame.payload);
}
