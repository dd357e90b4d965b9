//! TCP server exposing the `Predict` method.
//!
//! [`ServerBuilder`] collects routes and configuration; [`Server`] owns the
//! lifecycle:
//! 1. `start(host, port)` binds an unencrypted listener and spawns the accept loop
//! 2. each connection gets a read loop and a writer task
//! 3. every request frame waits for a worker permit, then runs
//!    [`Dispatcher::handle`] on the blocking pool
//! 4. `stop()` closes the listener and the read loops; requests already
//!    dispatched run to completion and their responses are still written
//!
//! # Example
//!
//! ```no_run
//! use predictwire::handler::Route;
//! use predictwire::Server;
//!
//! #[tokio::main]
//! async fn main() -> predictwire::Result<()> {
//!     let server = Server::builder()
//!         .description("echo service")
//!         .route(Route::unary("/echo", |text: String| Ok(text)))
//!         .max_workers(8)
//!         .build()?;
//!
//!     server.run("0.0.0.0", 8500).await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, ServeError};
use crate::handler::{ApiService, Route, RouteTable};
use crate::protocol::{Frame, FrameBuffer, Header, Request, Response, PREDICT_METHOD_ID};
use crate::writer::{spawn_writer, OutboundFrame, WriterHandle};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Fluent configuration for a [`Server`].
pub struct ServerBuilder {
    service: ApiService,
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            service: ApiService::default(),
            config: ServerConfig::default(),
        }
    }

    /// Text served at `/`.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.service.description = description.into();
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.service.routes.push(route);
        self
    }

    /// Replace the description and routes with those of `service`.
    pub fn service(mut self, service: ApiService) -> Self {
        self.service = service;
        self
    }

    /// Concurrent dispatches across all connections.
    ///
    /// Default: 20
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    /// Default: 64 MiB
    pub fn max_payload_size(mut self, bytes: u32) -> Self {
        self.config.max_payload_size = bytes;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and build the route table.
    ///
    /// # Errors
    ///
    /// [`ServeError::Config`] for unusable settings and
    /// [`ServeError::Route`] when two routes share a path.
    pub fn build(self) -> Result<Server> {
        self.config.validate()?;
        let table = RouteTable::from_service(self.service)?;
        Ok(Server::new(Dispatcher::new(table), self.config))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the accept loop, connections and workers.
struct Shared {
    dispatcher: Dispatcher,
    workers: Arc<Semaphore>,
    config: ServerConfig,
}

/// A predict server.
///
/// Every method takes `&self`; wrap the server in an `Arc` to call
/// [`stop`](Server::stop) from another task while one is in
/// [`wait`](Server::wait).
pub struct Server {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    stopped: Arc<watch::Sender<bool>>,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Server over an existing dispatcher.
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        let shared = Shared {
            workers: Arc::new(Semaphore::new(config.max_workers)),
            dispatcher,
            config,
        };
        Self {
            shared: Arc::new(shared),
            shutdown: watch::channel(false).0,
            stopped: Arc::new(watch::channel(false).0),
            local_addr: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// Bind `host:port` and start accepting connections.
    ///
    /// Port 0 picks a free port; the bound address is returned and
    /// available from [`local_addr`](Server::local_addr).
    pub async fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        if self.local_addr.get().is_some() {
            return Err(ServeError::State("server already started"));
        }
        if *self.shutdown.borrow() {
            return Err(ServeError::State("server was stopped"));
        }

        let listener = TcpListener::bind(format!("{host}:{port}")).await?;
        let addr = listener.local_addr()?;
        self.local_addr
            .set(addr)
            .map_err(|_| ServeError::State("server already started"))?;

        info!(
            %addr,
            max_workers = self.shared.config.max_workers,
            "predict server listening"
        );

        tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            self.shutdown.subscribe(),
            self.stopped.clone(),
        ));
        Ok(addr)
    }

    /// `start` followed by `wait`.
    pub async fn run(&self, host: &str, port: u16) -> Result<()> {
        self.start(host, port).await?;
        self.wait().await
    }

    /// Resolve once the server has stopped and every connection has drained.
    pub async fn wait(&self) -> Result<()> {
        if self.local_addr.get().is_none() {
            return Err(ServeError::State("server not started"));
        }
        // The sender is owned by `self`, so this only returns once stopped.
        stop_requested(&mut self.stopped.subscribe()).await;
        Ok(())
    }

    /// Stop accepting connections and stop reading new requests.
    ///
    /// Idempotent. Handlers already running are not interrupted.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("predict server stopping");
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn is_running(&self) -> bool {
        self.local_addr.get().is_some() && !*self.stopped.borrow()
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    stopped: Arc<watch::Sender<bool>>,
) {
    let conn_shutdown = shutdown.clone();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop_requested(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        shared.clone(),
                        conn_shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_exit(joined);
            }
        }
    }

    drop(listener);
    debug!(open = connections.len(), "listener closed, draining connections");
    while let Some(joined) = connections.join_next().await {
        log_connection_exit(joined);
    }

    stopped.send_replace(true);
    info!("predict server stopped");
}

/// Resolve once `rx` reads `true` or its sender is gone.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|flag| *flag).await;
}

fn log_connection_exit(joined: std::result::Result<Result<()>, task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "connection closed with error"),
        Err(e) => error!(error = %e, "connection task failed"),
    }
}

/// Read frames from one connection until EOF, a protocol error or shutdown.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, write_half) = stream.into_split();
    let (writer, writer_task) = spawn_writer(write_half, shared.config.channel_capacity);

    let mut frames = FrameBuffer::with_max_payload(shared.config.max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let read_result = loop {
        let n = tokio::select! {
            _ = stop_requested(&mut shutdown) => break Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(ServeError::Io(e)),
            },
        };

        let batch = match frames.push(&buf[..n]) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection after protocol error");
                break Err(e);
            }
        };
        let mut stopping = false;
        for frame in batch {
            if !dispatch_frame(frame, &shared, &writer, &mut shutdown).await {
                stopping = true;
                break;
            }
        }
        if stopping {
            break Ok(());
        }
    };

    // Workers still hold handles; the writer finishes after their responses.
    drop(writer);
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(%peer, error = %e, "writer stopped"),
        Err(e) => error!(%peer, error = %e, "writer task failed"),
    }

    debug!(%peer, "connection closed");
    read_result
}

/// Wait for a worker permit, then handle `frame` on a worker.
///
/// Waiting here stalls the connection's read loop, which pushes back on the
/// client through TCP flow control. Returns `false` when shutdown arrives
/// first; the frame is dropped unanswered.
async fn dispatch_frame(
    frame: Frame,
    shared: &Arc<Shared>,
    writer: &WriterHandle,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if frame.is_response() {
        warn!(request_id = frame.request_id(), "ignoring response frame");
        return true;
    }

    let permit = tokio::select! {
        _ = stop_requested(shutdown) => {
            debug!(request_id = frame.request_id(), "stopping before dispatch");
            return false;
        }
        permit = shared.workers.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return false,
        },
    };

    let shared = Arc::clone(shared);
    let writer = writer.clone();
    tokio::spawn(async move {
        let method_id = frame.method_id();
        let request_id = frame.request_id();

        let response = respond(&shared, frame).await;
        drop(permit);

        let out = match response_frame(method_id, request_id, &response, shared.config.max_payload_size)
        {
            Ok(out) => out,
            Err(e) => {
                error!(request_id, error = %e, "failed to encode response");
                return;
            }
        };
        if let Err(e) = writer.send(out).await {
            debug!(request_id, error = %e, "response dropped");
        }
    });
    true
}

async fn respond(shared: &Shared, frame: Frame) -> Response {
    if frame.method_id() != PREDICT_METHOD_ID {
        warn!(method_id = frame.method_id(), "unknown method");
        return Response::failure(format!("Unknown method id: {}", frame.method_id()));
    }

    let request: Request = match MsgPackCodec::decode(&frame.payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(request_id = frame.request_id(), error = %e, "undecodable request envelope");
            return Response::failure(e.to_string());
        }
    };

    let dispatcher = shared.dispatcher.clone();
    match task::spawn_blocking(move || dispatcher.handle(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "dispatch task failed");
            Response::failure("internal server error")
        }
    }
}

/// Encode `response`, substituting a failure when it would exceed `max_payload`.
fn response_frame(
    method_id: u16,
    request_id: u32,
    response: &Response,
    max_payload: u32,
) -> Result<OutboundFrame> {
    let header = |len| Header::response(method_id, request_id, len);
    let frame = OutboundFrame::message(header, response)?;
    if frame.payload_len() <= max_payload as usize {
        return Ok(frame);
    }

    warn!(
        request_id,
        size = frame.payload_len(),
        max_payload,
        "response too large"
    );
    let fallback = Response::failure(format!(
        "Response payload size {} exceeds maximum {}",
        frame.payload_len(),
        max_payload
    ));
    OutboundFrame::message(header, &fallback)
}
