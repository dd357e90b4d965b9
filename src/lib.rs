//! # predictwire
//!
//! Path-routed `Predict` RPC server for model inference handlers.
//!
//! A service is a set of routes. Each route binds a request path to a plain
//! Rust handler plus optional input/output codecs. One wire method carries a
//! request envelope `{ path, content }` and returns `{ content, code, msg }`.
//!
//! ## Architecture
//!
//! - **Codecs**: convert the wire content union (text, bytes, tensor, JSON)
//!   into handler values and back
//! - **Route table**: immutable path → route map with a built-in `/` route
//!   that returns the service description
//! - **Dispatcher**: resolve, decode, call and encode; every failure becomes
//!   a `code = -1` response
//! - **Server**: TCP listener with a bounded worker pool
//!
//! ## Example
//!
//! ```no_run
//! use predictwire::codec::Codec;
//! use predictwire::handler::Route;
//! use predictwire::value::{NdArray, Value};
//! use predictwire::Server;
//!
//! #[tokio::main]
//! async fn main() -> predictwire::Result<()> {
//!     let server = Server::builder()
//!         .description("toy model")
//!         .route(Route::unary("/echo", |v: Value| Ok(v)))
//!         .route(
//!             Route::unary("/shape", |a: NdArray| Ok(format!("{:?}", a.shape())))
//!                 .input_codec(Codec::NumericArray),
//!         )
//!         .build()?;
//!
//!     server.run("0.0.0.0", 8500).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod value;

mod client;
mod server;
mod writer;

pub use client::PredictClient;
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{DecodeError, Result, RouteError, ServeError};
pub use server::{Server, ServerBuilder};
