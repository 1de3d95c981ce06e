//! Backend-neutral view of the instruments updated by the middleware.

/// Label carrying the HTTP verb (`GET`, `POST` etc.).
pub const HTTP_VERB: &str = "http.verb";
/// Label carrying the host the request was sent to.
pub const HTTP_HOST: &str = "http.host";
/// Label carrying the path pattern, or the raw path if no pattern matched.
pub const HTTP_PATH: &str = "http.path";
/// Label carrying the response status code.
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Histogram of request durations in milliseconds.
pub const HTTP_SERVER_DURATION: &str = "http.server.duration";
/// Gauge of in-flight requests.
pub const HTTP_SERVER_ACTIVE_REQUESTS: &str = "http.server.active_requests";
/// Histogram of request body sizes in bytes.
pub const HTTP_SERVER_REQUEST_SIZE: &str = "http.server.request.size";
/// Histogram of response body sizes in bytes.
pub const HTTP_SERVER_RESPONSE_SIZE: &str = "http.server.response.size";

/// Labels attached to an observation.
///
/// `status_code` is unknown while the request is in flight, so the active requests gauge is
/// always updated with `status_code` set to `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Labels {
    pub verb: String,
    pub host: String,
    pub path: String,
    pub status_code: Option<String>,
}

impl Labels {
    pub(crate) fn status_code(&self) -> &str {
        self.status_code.as_deref().unwrap_or_default()
    }
}

/// Metrics registry updated by [`Http`].
///
/// Implementations must accept concurrent updates from every request served by the layer.
///
/// [`Http`]: super::Http
pub trait Recorder: Send + Sync + 'static {
    /// Creates the duration series for `labels` without observing anything.
    fn touch(&self, labels: &Labels);

    /// Adds `delta` to the active requests gauge.
    fn add_active_requests(&self, labels: &Labels, delta: i64);

    fn record_duration(&self, labels: &Labels, millis: f64);

    fn record_request_size(&self, labels: &Labels, bytes: u64);

    fn record_response_size(&self, labels: &Labels, bytes: u64);
}
