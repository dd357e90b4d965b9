//! Handler module - routes, calling conventions and the route table.
//!
//! Provides:
//! - [`Route`] - path + handler + calling convention + optional codecs
//! - [`RouteTable`] - maps request paths to routes, with a built-in `/`
//! - [`ApiService`] - the service definition a table is built from
//!
//! # Example
//!
//! ```
//! use predictwire::handler::{ApiService, Route, RouteTable};
//! use predictwire::value::{Json, Value};
//!
//! let service = ApiService::new("text utilities")
//!     .route(Route::unary("/upper", |s: String| Ok(s.to_uppercase())))
//!     .route(Route::variadic("/concat", &["left", "right"], |args: Vec<Value>| {
//!         Ok(Json(format!("{:?}", args)))
//!     }));
//!
//! let table = RouteTable::from_service(service).unwrap();
//! assert_eq!(table.len(), 3);
//! ```

mod registry;
mod route;
mod service;

pub use registry::{RouteTable, ROOT_PATH};
pub use route::{
    Args, CallingConvention, Handler, NullaryHandler, Route, UnaryHandler, VariadicHandler,
};
pub use service::ApiService;
