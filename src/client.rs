//! Minimal `Predict` client.
//!
//! Requests are pipelined over one connection: each call gets a fresh
//! `request_id`, and a reader task routes response frames back to the
//! waiting caller by that id, in whatever order the server answers.
//!
//! ```no_run
//! use predictwire::protocol::Content;
//! use predictwire::PredictClient;
//!
//! #[tokio::main]
//! async fn main() -> predictwire::Result<()> {
//!     let client = PredictClient::connect("127.0.0.1:8500").await?;
//!     let response = client.call("/echo", Content::Text("hi".into())).await?;
//!     assert_eq!(response.msg, "Succ");
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::MsgPackCodec;
use crate::error::{Result, ServeError};
use crate::protocol::{Content, FrameBuffer, Header, Request, Response, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer, OutboundFrame, WriterHandle};

const CHANNEL_CAPACITY: usize = 256;

/// Waiters keyed by request id. `closed` is set once the reader has stopped;
/// no waiter may be inserted after that.
#[derive(Default)]
struct PendingState {
    waiters: HashMap<u32, oneshot::Sender<Result<Response>>>,
    closed: bool,
}

type Pending = Arc<Mutex<PendingState>>;

/// A connection to a predict server.
pub struct PredictClient {
    writer: WriterHandle,
    pending: Pending,
    next_id: AtomicU32,
    reader: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl PredictClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (writer, writer_task) = spawn_writer(write_half, CHANNEL_CAPACITY);
        let pending = Pending::default();
        let reader = tokio::spawn(read_loop(read_half, pending.clone()));

        Ok(Self {
            writer,
            pending,
            next_id: AtomicU32::new(1),
            reader,
            writer_task,
        })
    }

    /// True once the connection can no longer carry requests.
    pub fn is_closed(&self) -> bool {
        self.reader.is_finished() || self.writer_task.is_finished()
    }

    /// Send `request` and wait for its response.
    ///
    /// # Errors
    ///
    /// Transport failures only; a failed call is an `Ok` response with
    /// `code == -1`.
    pub async fn predict(&self, request: &Request) -> Result<Response> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = OutboundFrame::message(|len| Header::request(request_id, len), request)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed || self.writer_task.is_finished() {
                return Err(ServeError::ConnectionClosed);
            }
            pending.waiters.insert(request_id, tx);
        }

        if let Err(e) = self.writer.send(frame).await {
            self.pending.lock().await.waiters.remove(&request_id);
            return Err(e);
        }

        rx.await.map_err(|_| ServeError::ConnectionClosed)?
    }

    /// Shorthand for `predict(&Request::new(path, content))`.
    pub async fn call(&self, path: &str, content: Content) -> Result<Response> {
        self.predict(&Request::new(path, content)).await
    }
}

impl Drop for PredictClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer_task.abort();
    }
}

async fn read_loop(mut reader: OwnedReadHalf, pending: Pending) {
    let mut frames = FrameBuffer::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE);
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "read failed");
                break;
            }
        };

        let batch = match frames.push(&buf[..n]) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "bad frame from server");
                break;
            }
        };

        for frame in batch {
            if !frame.is_response() {
                warn!(request_id = frame.request_id(), "ignoring non-response frame");
                continue;
            }
            let Some(waiter) = pending.lock().await.waiters.remove(&frame.request_id()) else {
                warn!(request_id = frame.request_id(), "response for unknown request");
                continue;
            };
            let _ = waiter.send(MsgPackCodec::decode(&frame.payload));
        }
    }

    // Dropping the senders wakes every waiter with `ConnectionClosed`.
    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.waiters.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, PREDICT_METHOD_ID};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_responses_routed_by_request_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Answer two requests in reverse order.
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = FrameBuffer::new();
            let mut received = Vec::new();
            let mut buf = vec![0u8; 4096];
            while received.len() < 2 {
                let n = stream.read(&mut buf).await.unwrap();
                received.extend(frames.push(&buf[..n]).unwrap());
            }
            for frame in received.iter().rev() {
                let request: Request = MsgPackCodec::decode(&frame.payload).unwrap();
                let payload =
                    MsgPackCodec::encode(&Response::success(Content::Text(request.path))).unwrap();
                let header =
                    Header::response(PREDICT_METHOD_ID, frame.request_id(), payload.len() as u32);
                stream.write_all(&build_frame(&header, &payload)).await.unwrap();
            }
        });

        let client = PredictClient::connect(addr).await.unwrap();
        let (a, b) = tokio::join!(
            client.call("/a", Content::Empty),
            client.call("/b", Content::Empty)
        );

        assert_eq!(a.unwrap().content, Content::Text("/a".into()));
        assert_eq!(b.unwrap().content, Content::Text("/b".into()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_close_fails_pending_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
        });

        let client = PredictClient::connect(addr).await.unwrap();
        let result = client.call("/echo", Content::Text("hi".into())).await;
        assert!(matches!(result, Err(ServeError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_call_after_close_fails_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let client = PredictClient::connect(addr).await.unwrap();
        tokio::time::timeout(Duration::from_secs(3), async {
            while !client.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        for _ in 0..2 {
            let result = tokio::time::timeout(
                Duration::from_secs(3),
                client.call("/echo", Content::Text("hi".into())),
            )
            .await
            .unwrap();
            assert!(matches!(result, Err(ServeError::ConnectionClosed)));
        }
    }
}
