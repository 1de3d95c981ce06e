//! Middleware that adds metrics to a [`Service`] that handles HTTP requests.

use std::{
    fmt::{self, Display},
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::Instant,
};

use http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use opentelemetry::metrics::Meter;
use pin_project::pin_project;
use prometheus_client::registry::Registry;
use tower_layer::Layer;
use tower_service::Service;

use super::{
    config::{MetricsConfig, RouteResolver},
    otel::OtelRecorder,
    prometheus::PrometheusRecorder,
    recorder::{Labels, Recorder},
};
use crate::{
    body::{self, BodyLength, LengthBody},
    route::{InitMetricDetails, RouteTable},
    util, Result,
};

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// [`Layer`] that adds metrics to a [`Service`] that handles HTTP requests.
#[derive(Clone)]
pub struct HttpLayer {
    recorder: Arc<dyn Recorder>,
    routes: Arc<RouteTable>,
    resolver: Option<RouteResolver>,
    clock: Clock,
}

impl HttpLayer {
    /// Creates the layer recording into a [`PrometheusRecorder`] built from `config`.
    pub fn prometheus(
        registry: &mut Registry,
        config: &MetricsConfig,
        details: Option<InitMetricDetails>,
    ) -> Result<Self> {
        let recorder = PrometheusRecorder::new(registry, config)?;
        Self::new(config, recorder, details)
    }

    /// Creates the layer recording into an [`OtelRecorder`] built from `config`.
    pub fn otel(
        meter: &Meter,
        config: &MetricsConfig,
        details: Option<InitMetricDetails>,
    ) -> Result<Self> {
        let recorder = OtelRecorder::new(meter, config)?;
        Self::new(config, recorder, details)
    }

    /// Creates the layer and registers the label combinations described by `details`.
    ///
    /// Only the route resolver of `config` is used here, the buckets belong to `recorder`.
    /// Prefer [`HttpLayer::prometheus`] or [`HttpLayer::otel`] unless `recorder` is a custom
    /// implementation.
    ///
    /// Fails if one of the endpoint paths is not a valid pattern.
    pub fn new<R: Recorder>(
        config: &MetricsConfig,
        recorder: R,
        details: Option<InitMetricDetails>,
    ) -> Result<Self> {
        let recorder: Arc<dyn Recorder> = Arc::new(recorder);
        let details = details.unwrap_or_default();
        let routes = RouteTable::new(&details.endpoints)?;

        let series = init_metrics(recorder.as_ref(), &details.normalize());
        tracing::debug!(
            service = config.service(),
            routes = routes.len(),
            series,
            "http metrics initialized"
        );

        Ok(Self {
            recorder,
            routes: Arc::new(routes),
            resolver: config.resolver().cloned(),
            clock: Arc::new(Instant::now),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> Instant + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }
}

impl fmt::Debug for HttpLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLayer")
            .field("routes", &self.routes)
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for HttpLayer {
    type Service = Http<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Http {
            inner,
            recorder: self.recorder.clone(),
            routes: self.routes.clone(),
            resolver: self.resolver.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Middleware that adds metrics to a [`Service`] that handles HTTP requests.
///
/// The inner service receives the request body wrapped in a [`LengthBody`].
#[derive(Clone)]
pub struct Http<S> {
    inner: S,
    recorder: Arc<dyn Recorder>,
    routes: Arc<RouteTable>,
    resolver: Option<RouteResolver>,
    clock: Clock,
}

impl<S: fmt::Debug> fmt::Debug for Http<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Http")
            .field("inner", &self.inner)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Http<S>
where
    S: Service<Request<LengthBody<ReqBody>>, Response = Response<ResBody>>,
    S::Error: Display,
    ResBody: Body,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let route = match &self.resolver {
            Some(resolve) => resolve(&parts),
            None => parts.uri.path().to_owned(),
        };
        let labels = Labels {
            verb: parts.method.as_str().to_owned(),
            host: util::http_host(&parts).to_owned(),
            path: route,
            status_code: None,
        };
        let active = ActiveRequest::start(self.recorder.clone(), labels.clone());

        let start = (self.clock)();
        let (req, length) = body::track(Request::from_parts(parts, body));
        let inner = self.inner.call(req);

        ResponseFuture {
            inner,
            active: Some(active),
            labels,
            length,
            start,
            clock: self.clock.clone(),
            recorder: self.recorder.clone(),
            routes: self.routes.clone(),
        }
    }
}

/// Response future for [`Http`].
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    inner: F,
    active: Option<ActiveRequest>,
    labels: Labels,
    length: BodyLength,
    start: Instant,
    clock: Clock,
    recorder: Arc<dyn Recorder>,
    routes: Arc<RouteTable>,
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    ResBody: Body,
    E: Display,
{
    type Output = Result<Response<ResponseBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = match ready!(this.inner.poll(cx)) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(route = %this.labels.path, error = %err, "request failed");
                this.active.take();
                return Poll::Ready(Err(err));
            }
        };

        let mut labels = mem::take(this.labels);
        labels.status_code = Some(response.status().as_u16().to_string());
        if let Some(pattern) = this.routes.find(&labels.path) {
            tracing::trace!(route = %labels.path, pattern, "route matched");
            labels.path = pattern.to_owned();
        }

        let elapsed = (this.clock)().saturating_duration_since(*this.start);
        this.recorder
            .record_duration(&labels, elapsed.as_millis() as f64);
        this.recorder
            .record_request_size(&labels, this.length.get());
        this.active.take();

        let pending = match util::http_response_size(&response) {
            Some(size) => {
                this.recorder.record_response_size(&labels, size);
                None
            }
            None => Some(ResponseSize {
                recorder: this.recorder.clone(),
                labels,
                length: BodyLength::default(),
            }),
        };
        Poll::Ready(Ok(response.map(|body| ResponseBody::new(body, pending))))
    }
}

/// Response body of [`Http`].
///
/// When the size of the response is not known upfront, the bytes are counted while the body
/// is sent and the size is recorded at the end of the stream, or when the body is dropped.
#[pin_project]
pub struct ResponseBody<B> {
    #[pin]
    inner: LengthBody<B>,
    pending: Option<ResponseSize>,
}

impl<B> ResponseBody<B> {
    fn new(inner: B, pending: Option<ResponseSize>) -> Self {
        let length = pending
            .as_ref()
            .map(|pending| pending.length.clone())
            .unwrap_or_default();
        Self {
            inner: LengthBody::new(inner, length),
            pending,
        }
    }
}

impl<B: Body> Body for ResponseBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));
        if frame.is_none() || this.inner.is_end_stream() {
            this.pending.take();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Records the response size counted so far when dropped.
struct ResponseSize {
    recorder: Arc<dyn Recorder>,
    labels: Labels,
    length: BodyLength,
}

impl Drop for ResponseSize {
    fn drop(&mut self) {
        self.recorder
            .record_response_size(&self.labels, self.length.get());
    }
}

/// Keeps a request counted in the active requests gauge until dropped.
struct ActiveRequest {
    recorder: Arc<dyn Recorder>,
    labels: Labels,
}

impl ActiveRequest {
    fn start(recorder: Arc<dyn Recorder>, labels: Labels) -> Self {
        recorder.add_active_requests(&labels, 1);
        Self { recorder, labels }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.recorder.add_active_requests(&self.labels, -1);
    }
}

/// Touches the duration series of every endpoint and status code combination.
///
/// The endpoint paths are expected to be normalized already.
fn init_metrics(recorder: &dyn Recorder, details: &InitMetricDetails) -> usize {
    let mut series = 0;
    for endpoint in &details.endpoints {
        for status_code in &details.status_codes {
            recorder.touch(&Labels {
                verb: endpoint.verb.clone(),
                host: details.host.clone(),
                path: endpoint.path.clone(),
                status_code: Some(status_code.clone()),
            });
            series += 1;
        }
    }
    series
}
