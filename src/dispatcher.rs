//! Request dispatch: path → route → decode → call → encode.
//!
//! [`Dispatcher::handle`] never fails. Every per-request error (unknown
//! path, decode failure, argument mismatch, handler error or panic, encode
//! failure) becomes a [`Response`] with `code = -1`. The full diagnostic goes
//! to the log; the client only sees the error's top-level message.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use tracing::{error, info};

use crate::codec::Codec;
use crate::handler::{Args, CallingConvention, Route, RouteTable};
use crate::protocol::{Content, Request, Response};
use crate::value::Value;

/// Codec used for results when the route does not pin one.
pub const DEFAULT_OUTPUT_CODEC: Codec = Codec::Text;

/// Turns request envelopes into response envelopes using a shared route table.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self::from_shared(Arc::new(routes))
    }

    pub fn from_shared(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Serve one request.
    pub fn handle(&self, request: Request) -> Response {
        let Request { path, content } = request;

        let response = match self.routes.resolve(&path) {
            Ok(route) => match invoke(route, content) {
                Ok(content) => Response::success(content),
                Err(err) => {
                    error!(path = %path, error = ?err, "route invocation failed");
                    Response::failure(err.to_string())
                }
            },
            Err(err) => {
                error!(path = %path, "{}", err);
                Response::failure(err.to_string())
            }
        };

        info!(path = %path, code = response.code, "predict called");
        response
    }
}

/// Steps 2-6 for a resolved route. Any error lands in the failure branch.
fn invoke(route: &Route, content: Content) -> anyhow::Result<Content> {
    let input = route
        .explicit_input_codec()
        .unwrap_or_else(|| Codec::infer(&content));
    let value = input.decode(content)?;

    let args = bind_args(route.convention(), value)?;
    let result = call_guarded(route, args)?;

    let output = route.explicit_output_codec().unwrap_or(DEFAULT_OUTPUT_CODEC);
    Ok(output.encode(result)?)
}

/// Shape a decoded value into arguments for `convention`.
///
/// Variadic handlers accept a JSON object (matched by parameter name), a
/// JSON array (matched by position) or a numeric array (split along its
/// first axis).
pub fn bind_args(convention: &CallingConvention, value: Value) -> anyhow::Result<Args> {
    let params = match convention {
        CallingConvention::Nullary => return Ok(Args::None),
        CallingConvention::Unary => return Ok(Args::Single(value)),
        CallingConvention::Variadic { params } => params,
    };

    let values = match value {
        Value::Json(serde_json::Value::Object(mut map)) => {
            let mut values = Vec::with_capacity(params.len());
            for param in params {
                match map.remove(param) {
                    Some(v) => values.push(Value::Json(v)),
                    None => bail!("missing required argument '{}'", param),
                }
            }
            if let Some(extra) = map.keys().next() {
                bail!("got an unexpected argument '{}'", extra);
            }
            values
        }
        Value::Json(serde_json::Value::Array(items)) => {
            check_count(params.len(), items.len())?;
            items.into_iter().map(Value::Json).collect()
        }
        Value::Array(array) => {
            let rows = array
                .rows()
                .ok_or_else(|| anyhow!("cannot spread a scalar array into {} arguments", params.len()))?;
            check_count(params.len(), rows.len())?;
            rows.into_iter().map(Value::Array).collect()
        }
        other => bail!(
            "cannot spread {} content into {} arguments",
            other.kind(),
            params.len()
        ),
    };

    Ok(Args::Many(values))
}

fn check_count(expected: usize, given: usize) -> anyhow::Result<()> {
    if expected != given {
        bail!(
            "takes {} positional arguments but {} were given",
            expected,
            given
        );
    }
    Ok(())
}

/// Call the handler, turning a panic into an error.
fn call_guarded(route: &Route, args: Args) -> anyhow::Result<Value> {
    match panic::catch_unwind(AssertUnwindSafe(|| route.call(args))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
