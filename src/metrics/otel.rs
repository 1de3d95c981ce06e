//! [`Recorder`] backed by OpenTelemetry instruments.
//!
//! These instruments follow the conventions defined by OpenTelemetry for [HTTP protocol].
//!
//! [HTTP protocol]: https://opentelemetry.io/docs/specs/semconv/http/http-metrics/

use opentelemetry::{
    metrics::{Histogram, Meter, UpDownCounter},
    KeyValue,
};

use super::{
    config::MetricsConfig,
    recorder::{
        Labels, Recorder, HTTP_HOST, HTTP_PATH, HTTP_SERVER_ACTIVE_REQUESTS, HTTP_SERVER_DURATION,
        HTTP_SERVER_REQUEST_SIZE, HTTP_SERVER_RESPONSE_SIZE, HTTP_STATUS_CODE, HTTP_VERB,
    },
};
use crate::Result;

/// [`Recorder`] creating its instruments from an OpenTelemetry [`Meter`].
///
/// A series only exists once a measurement is recorded, so [`Recorder::touch`] does nothing.
#[derive(Clone)]
pub struct OtelRecorder {
    durations: Histogram<f64>,
    active_requests: UpDownCounter<i64>,
    request_sizes: Histogram<u64>,
    response_sizes: Histogram<u64>,
}

impl OtelRecorder {
    pub fn new(meter: &Meter, config: &MetricsConfig) -> Result<Self> {
        config.validate()?;

        let durations = meter
            .f64_histogram(HTTP_SERVER_DURATION)
            .with_description("Duration of HTTP server requests")
            .with_unit("ms")
            .with_boundaries(config.duration_buckets().to_vec())
            .build();
        let active_requests = meter
            .i64_up_down_counter(HTTP_SERVER_ACTIVE_REQUESTS)
            .with_description("Number of active HTTP server requests")
            .with_unit("{request}")
            .build();
        let request_sizes = meter
            .u64_histogram(HTTP_SERVER_REQUEST_SIZE)
            .with_description("Size of HTTP server request bodies")
            .with_unit("By")
            .with_boundaries(config.request_size_buckets().to_vec())
            .build();
        let response_sizes = meter
            .u64_histogram(HTTP_SERVER_RESPONSE_SIZE)
            .with_description("Size of HTTP server response bodies")
            .with_unit("By")
            .with_boundaries(config.response_size_buckets().to_vec())
            .build();

        Ok(Self {
            durations,
            active_requests,
            request_sizes,
            response_sizes,
        })
    }
}

fn attributes(labels: &Labels) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(HTTP_VERB, labels.verb.clone()),
        KeyValue::new(HTTP_HOST, labels.host.clone()),
        KeyValue::new(HTTP_PATH, labels.path.clone()),
    ];
    if let Some(status_code) = &labels.status_code {
        attributes.push(KeyValue::new(HTTP_STATUS_CODE, status_code.clone()));
    }
    attributes
}

impl Recorder for OtelRecorder {
    fn touch(&self, labels: &Labels) {
        tracing::trace!(path = %labels.path, "series are created on first measurement");
    }

    fn add_active_requests(&self, labels: &Labels, delta: i64) {
        self.active_requests.add(delta, &attributes(labels));
    }

    fn record_duration(&self, labels: &Labels, millis: f64) {
        self.durations.record(millis, &attributes(labels));
    }

    fn record_request_size(&self, labels: &Labels, bytes: u64) {
        self.request_sizes.record(bytes, &attributes(labels));
    }

    fn record_response_size(&self, labels: &Labels, bytes: u64) {
        self.response_sizes.record(bytes, &attributes(labels));
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};

    use super::*;
    use crate::metrics::testing::{find_metric, has_attributes, OtelMetrics};

    #[test]
    fn status_code_attribute_is_optional() {
        let mut labels = Labels {
            verb: "GET".to_owned(),
            host: "localhost".to_owned(),
            path: "/".to_owned(),
            status_code: None,
        };
        let keys = |labels: &Labels| {
            attributes(labels)
                .into_iter()
                .map(|kv| kv.key.as_str().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&labels), [HTTP_VERB, HTTP_HOST, HTTP_PATH]);

        labels.status_code = Some("200".to_owned());
        assert_eq!(
            keys(&labels),
            [HTTP_VERB, HTTP_HOST, HTTP_PATH, HTTP_STATUS_CODE]
        );
    }

    #[test]
    fn reject_invalid_configuration() {
        let meter = opentelemetry::global::meter("tower-request-metrics");
        let config = MetricsConfig::new("testsvc").with_duration_buckets([1.0, 1.0]);
        assert!(OtelRecorder::new(&meter, &config).is_err());
    }

    #[test]
    fn durations_use_configured_boundaries() {
        let metrics = OtelMetrics::new();
        let config = MetricsConfig::new("testsvc").with_duration_buckets([10.0, 110.0]);
        let recorder = OtelRecorder::new(&metrics.meter(), &config).unwrap();
        let labels = Labels {
            verb: "GET".to_owned(),
            host: "localhost".to_owned(),
            path: "/status".to_owned(),
            status_code: Some("200".to_owned()),
        };

        recorder.touch(&labels);
        for millis in [1.0, 100.0, 1000.0] {
            recorder.record_duration(&labels, millis);
        }

        let resources = metrics.collect();
        let metric = find_metric(&resources, HTTP_SERVER_DURATION);
        assert_eq!(metric.unit(), "ms");
        let AggregatedMetrics::F64(MetricData::Histogram(histogram)) = metric.data() else {
            panic!("{} is not a f64 histogram", metric.name());
        };
        let points = histogram.data_points().collect::<Vec<_>>();
        assert_eq!(points.len(), 1);
        assert!(has_attributes(
            points[0].attributes(),
            &[(HTTP_PATH, "/status"), (HTTP_STATUS_CODE, "200")]
        ));
        assert_eq!(points[0].bounds().collect::<Vec<_>>(), [10.0, 110.0]);
        assert_eq!(points[0].bucket_counts().collect::<Vec<_>>(), [1, 1, 1]);
    }
}
