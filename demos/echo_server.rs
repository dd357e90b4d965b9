//! Echo server - a small service with one route per codec.
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo_server
//! cargo run --example predict_client
//! ```
//!
//! Routes:
//! - `/`        service description
//! - `/echo`    returns its text input
//! - `/stats`   tensor in, JSON summary out
//! - `/greet`   `{"name": .., "greeting": ..}` or `[name, greeting]`

use anyhow::{anyhow, bail};
use predictwire::codec::Codec;
use predictwire::handler::Route;
use predictwire::value::{ArrayData, NdArray, Value};
use predictwire::Server;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Stats {
    shape: Vec<usize>,
    mean: f64,
    max: f64,
}

fn stats(array: NdArray) -> anyhow::Result<predictwire::value::Json<Stats>> {
    let values: Vec<f64> = match array.data() {
        ArrayData::F32(v) => v.iter().map(|&x| x as f64).collect(),
        ArrayData::F64(v) => v.clone(),
        other => bail!("unsupported element type {:?}", other.dtype()),
    };
    if values.is_empty() {
        bail!("empty array");
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    Ok(predictwire::value::Json(Stats {
        shape: array.shape().to_vec(),
        mean,
        max,
    }))
}

fn text_arg(value: &Value) -> anyhow::Result<&str> {
    match value {
        Value::Json(serde_json::Value::String(s)) => Ok(s),
        other => Err(anyhow!("expected a string, got {}", other.kind())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = Server::builder()
        .description("predictwire echo demo")
        .route(Route::unary("/echo", |text: String| Ok(text)))
        .route(
            Route::unary("/stats", stats)
                .input_codec(Codec::NumericArray)
                .output_codec(Codec::Json),
        )
        .route(Route::variadic(
            "/greet",
            &["name", "greeting"],
            |args: Vec<Value>| Ok(format!("{}, {}!", text_arg(&args[1])?, text_arg(&args[0])?)),
        ))
        .max_workers(4)
        .build()?;

    let addr = server.start("127.0.0.1", 8500).await?;
    tracing::info!(%addr, "press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    server.stop();
    server.wait().await?;
    Ok(())
}
