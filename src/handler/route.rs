//! Route descriptors and the handler calling contract.
//!
//! A [`Route`] binds a path to a handler, the handler's [`CallingConvention`]
//! and optional input/output codecs. The convention is fixed when the route
//! is built, so dispatch never has to inspect the handler.
//!
//! # Example
//!
//! ```
//! use predictwire::codec::Codec;
//! use predictwire::handler::{CallingConvention, Route};
//! use predictwire::value::Value;
//!
//! let echo = Route::unary("/echo", |text: String| Ok(text));
//! assert_eq!(echo.convention(), &CallingConvention::Unary);
//!
//! let add = Route::variadic("/add", &["a", "b"], |args: Vec<Value>| Ok(args.len().to_string()))
//!     .input_codec(Codec::Json);
//! assert_eq!(add.convention().arity(), 2);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::bail;

use crate::codec::Codec;
use crate::value::{FromValue, IntoValue, Value};

/// How a decoded value becomes handler arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallingConvention {
    /// No arguments; the decoded value is discarded.
    Nullary,
    /// The whole decoded value is the only argument.
    Unary,
    /// Several named parameters, filled from a mapping by name or from a
    /// sequence by position.
    Variadic { params: Vec<String> },
}

impl CallingConvention {
    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        match self {
            CallingConvention::Nullary => 0,
            CallingConvention::Unary => 1,
            CallingConvention::Variadic { params } => params.len(),
        }
    }
}

/// Arguments produced for a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    None,
    Single(Value),
    /// Ordered to match the declared parameters.
    Many(Vec<Value>),
}

/// A callable route handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, args: Args) -> anyhow::Result<Value>;
}

/// Handler taking no arguments.
pub struct NullaryHandler<F, R> {
    handler: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<F, R> Handler for NullaryHandler<F, R>
where
    F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
    R: IntoValue + 'static,
{
    fn call(&self, args: Args) -> anyhow::Result<Value> {
        match args {
            Args::None => (self.handler)()?.into_value(),
            other => bail!("takes 0 arguments, got {}", describe(&other)),
        }
    }
}

/// Handler taking one typed argument converted through [`FromValue`].
pub struct UnaryHandler<F, T, R> {
    handler: F,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<F, T, R> Handler for UnaryHandler<F, T, R>
where
    F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    T: FromValue + 'static,
    R: IntoValue + 'static,
{
    fn call(&self, args: Args) -> anyhow::Result<Value> {
        match args {
            Args::Single(value) => (self.handler)(T::from_value(value)?)?.into_value(),
            other => bail!("takes 1 argument, got {}", describe(&other)),
        }
    }
}

/// Handler taking its declared parameters as an ordered list.
pub struct VariadicHandler<F, R> {
    handler: F,
    _phantom: PhantomData<fn() -> R>,
}

impl<F, R> Handler for VariadicHandler<F, R>
where
    F: Fn(Vec<Value>) -> anyhow::Result<R> + Send + Sync + 'static,
    R: IntoValue + 'static,
{
    fn call(&self, args: Args) -> anyhow::Result<Value> {
        let values = match args {
            Args::None => Vec::new(),
            Args::Single(value) => vec![value],
            Args::Many(values) => values,
        };
        (self.handler)(values)?.into_value()
    }
}

fn describe(args: &Args) -> String {
    match args {
        Args::None => "no arguments".to_string(),
        Args::Single(_) => "1 argument".to_string(),
        Args::Many(values) => format!("{} arguments", values.len()),
    }
}

/// Registration record binding a path to a handler.
///
/// Immutable once registered in a [`RouteTable`](super::RouteTable).
#[derive(Clone)]
pub struct Route {
    path: String,
    handler: Arc<dyn Handler>,
    convention: CallingConvention,
    input_codec: Option<Codec>,
    output_codec: Option<Codec>,
}

impl Route {
    /// Route over a raw [`Handler`] with an explicit convention.
    pub fn new(
        path: impl Into<String>,
        convention: CallingConvention,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            path: path.into(),
            handler,
            convention,
            input_codec: None,
            output_codec: None,
        }
    }

    /// Route whose handler takes no arguments.
    pub fn nullary<F, R>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoValue + 'static,
    {
        let handler = NullaryHandler {
            handler,
            _phantom: PhantomData,
        };
        Self::new(path, CallingConvention::Nullary, Arc::new(handler))
    }

    /// Route whose handler takes the whole decoded value.
    pub fn unary<F, T, R>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
        T: FromValue + 'static,
        R: IntoValue + 'static,
    {
        let handler = UnaryHandler {
            handler,
            _phantom: PhantomData,
        };
        Self::new(path, CallingConvention::Unary, Arc::new(handler))
    }

    /// Route whose handler takes the named parameters `params`, in that order.
    ///
    /// The convention follows the parameter count: no parameters ignore the
    /// content, one parameter receives the whole decoded value, and two or
    /// more are spread from a mapping or a sequence.
    pub fn variadic<F, R>(path: impl Into<String>, params: &[&str], handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoValue + 'static,
    {
        let handler = VariadicHandler {
            handler,
            _phantom: PhantomData,
        };
        let convention = match params {
            [] => CallingConvention::Nullary,
            [_] => CallingConvention::Unary,
            _ => CallingConvention::Variadic {
                params: params.iter().map(|p| p.to_string()).collect(),
            },
        };
        Self::new(path, convention, Arc::new(handler))
    }

    /// Pin the codec used to decode request content.
    pub fn input_codec(mut self, codec: Codec) -> Self {
        self.input_codec = Some(codec);
        self
    }

    /// Pin the codec used to encode the handler's result.
    pub fn output_codec(mut self, codec: Codec) -> Self {
        self.output_codec = Some(codec);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn convention(&self) -> &CallingConvention {
        &self.convention
    }

    pub fn explicit_input_codec(&self) -> Option<Codec> {
        self.input_codec
    }

    pub fn explicit_output_codec(&self) -> Option<Codec> {
        self.output_codec
    }

    /// Invoke the handler.
    pub fn call(&self, args: Args) -> anyhow::Result<Value> {
        self.handler.call(args)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("convention", &self.convention)
            .field("input_codec", &self.input_codec)
            .field("output_codec", &self.output_codec)
            .finish_non_exhaustive()
    }
}
