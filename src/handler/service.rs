//! Service definition consumed by the route table.

use super::Route;

/// A service description plus the routes it exposes.
///
/// The description is served as text at `/`.
#[derive(Debug, Clone, Default)]
pub struct ApiService {
    pub description: String,
    pub routes: Vec<Route>,
}

impl ApiService {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            routes: Vec::new(),
        }
    }

    /// Append a route. Duplicates surface when the table is built.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }
}
