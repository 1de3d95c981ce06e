//! [`Recorder`] backed by a [`prometheus_client`] registry.
//!
//! Prometheus names cannot contain dots, they are replaced by underscores: the duration
//! histogram is exported as `http_server_duration` with labels `http_verb`, `http_host`,
//! `http_path` and `http_status_code`.

use std::{borrow::Cow, sync::Arc};

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        family::{Family, MetricConstructor},
        gauge::Gauge,
        histogram::Histogram,
    },
    registry::Registry,
};

use super::{
    config::MetricsConfig,
    recorder::{Labels, Recorder},
};
use crate::Result;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ActiveLabels {
    http_verb: String,
    http_host: String,
    http_path: String,
}

impl From<&Labels> for ActiveLabels {
    fn from(labels: &Labels) -> Self {
        Self {
            http_verb: labels.verb.clone(),
            http_host: labels.host.clone(),
            http_path: labels.path.clone(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    http_verb: String,
    http_host: String,
    http_path: String,
    http_status_code: String,
}

impl From<&Labels> for RequestLabels {
    fn from(labels: &Labels) -> Self {
        Self {
            http_verb: labels.verb.clone(),
            http_host: labels.host.clone(),
            http_path: labels.path.clone(),
            http_status_code: labels.status_code().to_owned(),
        }
    }
}

/// Builds every histogram of a family with the same boundaries.
#[derive(Clone, Debug)]
struct Buckets(Arc<[f64]>);

impl Buckets {
    fn new(bounds: &[f64]) -> Self {
        Self(bounds.into())
    }
}

impl MetricConstructor<Histogram> for Buckets {
    fn new_metric(&self) -> Histogram {
        Histogram::new(self.0.iter().copied())
    }
}

type HistogramFamily = Family<RequestLabels, Histogram, Buckets>;

/// [`Recorder`] registering its instruments in a Prometheus [`Registry`].
///
/// Every instrument carries the constant label `service`.
#[derive(Clone, Debug)]
pub struct PrometheusRecorder {
    durations: HistogramFamily,
    active_requests: Family<ActiveLabels, Gauge>,
    request_sizes: HistogramFamily,
    response_sizes: HistogramFamily,
}

impl PrometheusRecorder {
    pub fn new(registry: &mut Registry, config: &MetricsConfig) -> Result<Self> {
        config.validate()?;

        let durations =
            HistogramFamily::new_with_constructor(Buckets::new(config.duration_buckets()));
        let active_requests = Family::<ActiveLabels, Gauge>::default();
        let request_sizes =
            HistogramFamily::new_with_constructor(Buckets::new(config.request_size_buckets()));
        let response_sizes =
            HistogramFamily::new_with_constructor(Buckets::new(config.response_size_buckets()));

        let registry = registry.sub_registry_with_label((
            Cow::Borrowed("service"),
            Cow::Owned(config.service().to_owned()),
        ));
        registry.register(
            "http_server_duration",
            "Histogram of request durations in milliseconds",
            durations.clone(),
        );
        registry.register(
            "http_server_active_requests",
            "Number of requests currently handled",
            active_requests.clone(),
        );
        registry.register(
            "http_server_request_size",
            "Histogram of request sizes in bytes",
            request_sizes.clone(),
        );
        registry.register(
            "http_server_response_size",
            "Histogram of response sizes in bytes",
            response_sizes.clone(),
        );

        Ok(Self {
            durations,
            active_requests,
            request_sizes,
            response_sizes,
        })
    }
}

impl Recorder for PrometheusRecorder {
    fn touch(&self, labels: &Labels) {
        drop(self.durations.get_or_create(&labels.into()));
    }

    fn add_active_requests(&self, labels: &Labels, delta: i64) {
        self.active_requests.get_or_create(&labels.into()).inc_by(delta);
    }

    fn record_duration(&self, labels: &Labels, millis: f64) {
        self.durations.get_or_create(&labels.into()).observe(millis);
    }

    fn record_request_size(&self, labels: &Labels, bytes: u64) {
        self.request_sizes
            .get_or_create(&labels.into())
            .observe(bytes as f64);
    }

    fn record_response_size(&self, labels: &Labels, bytes: u64) {
        self.response_sizes
            .get_or_create(&labels.into())
            .observe(bytes as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::{bucket_counts, encode, sample};

    fn labels(status_code: Option<&str>) -> Labels {
        Labels {
            verb: "GET".to_owned(),
            host: "localhost".to_owned(),
            path: "/status".to_owned(),
            status_code: status_code.map(str::to_owned),
        }
    }

    #[test]
    fn touch_exports_empty_series() {
        let mut registry = Registry::default();
        let config = MetricsConfig::new("testsvc");
        let recorder = PrometheusRecorder::new(&mut registry, &config).unwrap();

        recorder.touch(&labels(Some("200")));

        let text = encode(&registry);
        let count = sample(
            &text,
            "http_server_duration_count",
            &[r#"http_status_code="200""#, r#"service="testsvc""#],
        );
        assert_eq!(count, Some(0.0));
        assert_eq!(sample(&text, "http_server_request_size_count", &[]), None);
    }

    #[test]
    fn cumulative_buckets() {
        let mut registry = Registry::default();
        let config = MetricsConfig::new("testsvc").with_response_size_buckets([10.0, 110.0]);
        let recorder = PrometheusRecorder::new(&mut registry, &config).unwrap();

        for bytes in [1, 100, 1000] {
            recorder.record_response_size(&labels(Some("200")), bytes);
        }

        let text = encode(&registry);
        assert_eq!(
            bucket_counts(&text, "http_server_response_size", &[]),
            vec![1, 2]
        );
    }

    #[test]
    fn active_requests_gauge() {
        let mut registry = Registry::default();
        let config = MetricsConfig::new("testsvc");
        let recorder = PrometheusRecorder::new(&mut registry, &config).unwrap();

        recorder.add_active_requests(&labels(None), 1);
        recorder.add_active_requests(&labels(None), 1);
        let text = encode(&registry);
        assert_eq!(sample(&text, "http_server_active_requests", &[]), Some(2.0));

        recorder.add_active_requests(&labels(None), -2);
        let text = encode(&registry);
        assert_eq!(sample(&text, "http_server_active_requests", &[]), Some(0.0));
    }

    #[test]
    fn invalid_configuration() {
        let mut registry = Registry::default();
        let config = MetricsConfig::new("testsvc").with_duration_buckets([]);
        assert!(PrometheusRecorder::new(&mut registry, &config).is_err());
    }
}
