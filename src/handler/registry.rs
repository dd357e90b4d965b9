//! Route table mapping request paths to routes.
//!
//! Built once before the server starts and read-only afterwards, so it is
//! shared across workers behind an `Arc` without locking.
//!
//! # Example
//!
//! ```
//! use predictwire::handler::{Route, RouteTable};
//!
//! let mut table = RouteTable::new("demo service");
//! table.register(Route::unary("/echo", |s: String| Ok(s))).unwrap();
//!
//! assert!(table.resolve("/echo").is_ok());
//! assert_eq!(table.paths(), vec!["/", "/echo"]);
//! ```

use std::collections::HashMap;

use tracing::debug;

use super::{ApiService, Route};
use crate::error::RouteError;

/// Path of the built-in service description route.
pub const ROOT_PATH: &str = "/";

struct Entry {
    route: Route,
    /// Installed by the table itself; a user route may replace it.
    builtin: bool,
}

/// Immutable-after-construction map from path to [`Route`].
pub struct RouteTable {
    routes: HashMap<String, Entry>,
}

impl RouteTable {
    /// Create a table holding only the `/` route, which returns `description`.
    pub fn new(description: impl Into<String>) -> Self {
        let description = description.into();
        let root = Route::nullary(ROOT_PATH, move || Ok(description.clone()));

        let mut routes = HashMap::new();
        routes.insert(
            ROOT_PATH.to_string(),
            Entry {
                route: root,
                builtin: true,
            },
        );
        Self { routes }
    }

    /// Build the table for a service definition.
    pub fn from_service(service: ApiService) -> Result<Self, RouteError> {
        let ApiService {
            description,
            routes,
        } = service;

        let mut table = Self::new(description);
        for route in routes {
            table.register(route)?;
        }
        Ok(table)
    }

    /// Add a route.
    ///
    /// # Errors
    ///
    /// [`RouteError::DuplicatePath`] if a user route already owns the path.
    /// Registering `/` replaces the built-in description route once.
    pub fn register(&mut self, route: Route) -> Result<(), RouteError> {
        if let Some(existing) = self.routes.get(route.path()) {
            if !existing.builtin {
                return Err(RouteError::DuplicatePath(route.path().to_string()));
            }
            debug!(path = route.path(), "replacing built-in route");
        }

        self.routes.insert(
            route.path().to_string(),
            Entry {
                route,
                builtin: false,
            },
        );
        Ok(())
    }

    /// Look up the route for `path`.
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownPath`] carrying the path and every known path.
    pub fn resolve(&self, path: &str) -> Result<&Route, RouteError> {
        self.routes
            .get(path)
            .map(|e| &e.route)
            .ok_or_else(|| RouteError::UnknownPath {
                path: path.to_string(),
                known: self.paths(),
            })
    }

    /// All registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Always false: the root route is always present.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
