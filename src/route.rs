//! Path patterns used to collapse concrete request paths onto registered routes.
//!
//! Endpoints are registered with the usual `{name}` wildcard syntax (`/users/{id}`). Each
//! wildcard segment is replaced by [`WILDCARD`] and the result is matched, anchored at both
//! ends, against the path of incoming requests.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::{Error, Result};

/// Expression replacing every `{name}` segment of a registered path.
pub const WILDCARD: &str = "[a-zA-Z0-9-_]+";

static WILD_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\{[a-zA-Z0-9_]+\}").expect("valid wildcard segment expression"));

/// HTTP details of a single endpoint, each attribute is used as a label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointDetails {
    /// Relative path pattern (i.e. `/api/v1/users/{id}`).
    pub path: String,
    /// Verb used on the endpoint resource (i.e. `GET`).
    pub verb: String,
}

impl EndpointDetails {
    pub fn new(path: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            verb: verb.into(),
        }
    }
}

/// Label combinations registered before the first request is served.
///
/// Every endpoint is combined with every status code, using the same `host`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitMetricDetails {
    /// Path and verb of each endpoint, in matching order.
    pub endpoints: Vec<EndpointDetails>,
    /// Host of the running server.
    pub host: String,
    /// Status codes the endpoints may answer with (i.e. `200`, `400`, `500`).
    pub status_codes: Vec<String>,
}

impl InitMetricDetails {
    /// Replaces the wildcard segments of every endpoint path.
    pub fn normalize(mut self) -> Self {
        for endpoint in &mut self.endpoints {
            endpoint.path = replace_path_with_pattern(&endpoint.path);
        }
        self
    }
}

/// Replaces each `{name}` segment of `path` with [`WILDCARD`].
///
/// Paths without wildcard segments are returned unchanged.
pub fn replace_path_with_pattern(path: &str) -> String {
    let wildcard = format!("/{WILDCARD}");
    WILD_SEGMENT
        .replace_all(path, NoExpand(&wildcard))
        .into_owned()
}

/// Compiles a normalized pattern so that it has to match the whole path.
fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

/// Finds the first normalized entry whose pattern matches the whole `path`.
///
/// An empty list, or a path matching no entry, gives `Ok(None)`. A pattern that does not
/// compile stops the search with [`Error::InvalidPattern`].
///
/// Every pattern is compiled again on each call, this is meant for one-shot lookups. Build a
/// [`RouteTable`] to match many paths against the same entries.
pub fn find_matching_pattern<'a>(
    path: &str,
    entries: &'a [EndpointDetails],
) -> Result<Option<&'a str>> {
    for entry in entries {
        if anchored(&entry.path)?.is_match(path) {
            return Ok(Some(&entry.path));
        }
    }
    Ok(None)
}

#[derive(Clone, Debug)]
struct Route {
    template: String,
    pattern: String,
    regex: Regex,
}

/// Registered routes, compiled once and matched in registration order.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Normalizes and compiles the given endpoint templates.
    pub fn new(endpoints: &[EndpointDetails]) -> Result<Self> {
        let routes = endpoints
            .iter()
            .map(|endpoint| {
                let pattern = replace_path_with_pattern(&endpoint.path);
                let regex = anchored(&pattern)?;
                Ok(Route {
                    template: endpoint.path.clone(),
                    pattern,
                    regex,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the pattern of the first route matching `path`.
    ///
    /// A route also matches when `path` is its template verbatim, as returned by routers
    /// exposing the matched route (i.e. `/users/{id}`).
    pub fn find(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.template == path || route.regex.is_match(path))
            .map(|route| route.pattern.as_str())
    }
}
