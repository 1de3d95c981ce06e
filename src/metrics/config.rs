use std::{fmt, sync::Arc};

use http::request::Parts;

use crate::{Error, Result};

/// Default boundaries of the duration histogram, in milliseconds.
pub const DEFAULT_DURATION_BUCKETS: [f64; 10] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// Default boundaries of the request and response size histograms, in bytes.
pub const DEFAULT_SIZE_BUCKETS: [f64; 8] = [
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

/// Computes the `http.path` label of a request in place of its path.
pub type RouteResolver = Arc<dyn Fn(&Parts) -> String + Send + Sync>;

/// Settings shared by the recorders and the [`HttpLayer`].
///
/// [`HttpLayer`]: super::HttpLayer
#[derive(Clone)]
pub struct MetricsConfig {
    service: String,
    duration_buckets: Vec<f64>,
    request_size_buckets: Vec<f64>,
    response_size_buckets: Vec<f64>,
    resolver: Option<RouteResolver>,
}

impl MetricsConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            duration_buckets: DEFAULT_DURATION_BUCKETS.to_vec(),
            request_size_buckets: DEFAULT_SIZE_BUCKETS.to_vec(),
            response_size_buckets: DEFAULT_SIZE_BUCKETS.to_vec(),
            resolver: None,
        }
    }

    /// Set the boundaries of the duration histogram, in milliseconds.
    pub fn with_duration_buckets(mut self, buckets: impl IntoIterator<Item = f64>) -> Self {
        self.duration_buckets = buckets.into_iter().collect();
        self
    }

    /// Set the boundaries of the request size histogram, in bytes.
    pub fn with_request_size_buckets(mut self, buckets: impl IntoIterator<Item = f64>) -> Self {
        self.request_size_buckets = buckets.into_iter().collect();
        self
    }

    /// Set the boundaries of the response size histogram, in bytes.
    pub fn with_response_size_buckets(mut self, buckets: impl IntoIterator<Item = f64>) -> Self {
        self.response_size_buckets = buckets.into_iter().collect();
        self
    }

    /// Use `resolver` instead of the request path to label requests.
    ///
    /// The resolved route is still matched against the registered endpoints.
    pub fn with_route_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Label requests with the route matched by axum, if any.
    ///
    /// The matched route is only known by layers added with `Router::route_layer`.
    #[cfg(feature = "axum")]
    pub fn with_matched_path(self) -> Self {
        self.with_route_resolver(|parts| {
            crate::util::http_route(parts)
                .unwrap_or_else(|| parts.uri.path())
                .to_owned()
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn duration_buckets(&self) -> &[f64] {
        &self.duration_buckets
    }

    pub fn request_size_buckets(&self) -> &[f64] {
        &self.request_size_buckets
    }

    pub fn response_size_buckets(&self) -> &[f64] {
        &self.response_size_buckets
    }

    pub(crate) fn resolver(&self) -> Option<&RouteResolver> {
        self.resolver.as_ref()
    }

    /// Checks that every histogram has usable boundaries.
    pub fn validate(&self) -> Result<()> {
        validate_buckets("duration", &self.duration_buckets)?;
        validate_buckets("request size", &self.request_size_buckets)?;
        validate_buckets("response size", &self.response_size_buckets)
    }
}

impl fmt::Debug for MetricsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsConfig")
            .field("service", &self.service)
            .field("duration_buckets", &self.duration_buckets)
            .field("request_size_buckets", &self.request_size_buckets)
            .field("response_size_buckets", &self.response_size_buckets)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

fn validate_buckets(name: &'static str, buckets: &[f64]) -> Result<()> {
    let finite = buckets.iter().all(|bound| bound.is_finite());
    let increasing = buckets.windows(2).all(|pair| pair[0] < pair[1]);
    if buckets.is_empty() || !finite || !increasing {
        return Err(Error::InvalidBuckets { name });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MetricsConfig::new("testsvc");
        assert_eq!(config.service(), "testsvc");
        assert!(config.resolver().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn custom_buckets() {
        let config = MetricsConfig::new("testsvc")
            .with_duration_buckets([10.0, 110.0])
            .with_request_size_buckets(vec![1.0])
            .with_response_size_buckets([1.0, 2.0, 3.0]);

        assert_eq!(config.duration_buckets(), &[10.0, 110.0]);
        assert_eq!(config.request_size_buckets(), &[1.0]);
        assert_eq!(config.response_size_buckets(), &[1.0, 2.0, 3.0]);
        config.validate().unwrap();
    }

    #[test]
    fn reject_invalid_buckets() {
        let err = MetricsConfig::new("testsvc")
            .with_duration_buckets([110.0, 10.0])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBuckets { name: "duration" }));

        let err = MetricsConfig::new("testsvc")
            .with_request_size_buckets([])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBuckets { name: "request size" }));

        let err = MetricsConfig::new("testsvc")
            .with_response_size_buckets([1.0, f64::INFINITY])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBuckets { name: "response size" }));
    }

    #[test]
    fn route_resolver() {
        let config = MetricsConfig::new("testsvc").with_route_resolver(|parts| {
            format!("{} {}", parts.method, parts.uri.path())
        });
        let (parts, _) = http::Request::post("/users/1").body(()).unwrap().into_parts();

        let resolver = config.resolver().unwrap();
        assert_eq!(resolver(&parts), "POST /users/1");
        assert!(format!("{config:?}").contains("resolver: true"));
    }
}
