//! Metrics layer for HTTP services.
//!
//! Every request handled by [`metrics::Http`] records four instruments, all labelled with
//! `http.verb`, `http.host`, `http.path` and `http.status_code`:
//!
//! - `http.server.duration`: histogram of request durations in milliseconds.
//! - `http.server.active_requests`: gauge of in-flight requests (without `http.status_code`).
//! - `http.server.request.size`: histogram of request body sizes in bytes.
//! - `http.server.response.size`: histogram of response body sizes in bytes.
//!
//! Parameterized routes are collapsed onto the path patterns registered with
//! [`InitMetricDetails`], so `/users/42` and `/users/43` are both reported as
//! `/users/[a-zA-Z0-9-_]+`. The same label combinations are registered when the layer is
//! built, hence every expected series is exported from the start.
//!
//! ```no_run
//! use prometheus_client::registry::Registry;
//! use tower_request_metrics::{
//!     metrics::{HttpLayer, MetricsConfig},
//!     EndpointDetails, InitMetricDetails,
//! };
//!
//! # fn main() -> Result<(), tower_request_metrics::Error> {
//! let mut registry = Registry::default();
//! let config = MetricsConfig::new("users").with_duration_buckets([10.0, 100.0, 1000.0]);
//!
//! let details = InitMetricDetails {
//!     endpoints: vec![EndpointDetails::new("/users/{id}", "GET")],
//!     host: "localhost:3000".to_owned(),
//!     status_codes: vec!["200".to_owned(), "404".to_owned()],
//! };
//! let layer = HttpLayer::prometheus(&mut registry, &config, Some(details))?;
//! # let _ = layer;
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod metrics;
pub mod route;

mod error;
mod util;

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    route::{EndpointDetails, InitMetricDetails},
};
