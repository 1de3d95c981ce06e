//! Helpers reading back recorded metrics, from the Prometheus text exposition or from an
//! in-memory OpenTelemetry exporter.

use opentelemetry::{
    metrics::{Meter, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::{
    data::{Metric, ResourceMetrics},
    InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
};
use prometheus_client::registry::Registry;

pub(crate) fn encode(registry: &Registry) -> String {
    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, registry).unwrap();
    text
}

/// Value of the first `series` sample whose labels contain every filter.
pub(crate) fn sample(text: &str, series: &str, filters: &[&str]) -> Option<f64> {
    text.lines()
        .filter(|line| {
            line.strip_prefix(series)
                .is_some_and(|labels| labels.starts_with('{'))
        })
        .find(|line| filters.iter().all(|filter| line.contains(filter)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Cumulative counts of the `10` and `110` buckets of `histogram`.
pub(crate) fn bucket_counts(text: &str, histogram: &str, filters: &[&str]) -> Vec<u64> {
    let series = format!("{histogram}_bucket");
    [r#"le="10"#, r#"le="110"#]
        .into_iter()
        .map(|bound| {
            let mut filters = filters.to_vec();
            filters.push(bound);
            sample(text, &series, &filters).unwrap_or_default() as u64
        })
        .collect()
}

pub(crate) fn count_series(text: &str, series: &str) -> usize {
    text.lines()
        .filter(|line| {
            line.strip_prefix(series)
                .is_some_and(|labels| labels.starts_with('{'))
        })
        .count()
}

/// Meter provider exporting to memory, read back with [`OtelMetrics::collect`].
pub(crate) struct OtelMetrics {
    provider: SdkMeterProvider,
    exporter: InMemoryMetricExporter,
}

impl OtelMetrics {
    pub(crate) fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        Self { provider, exporter }
    }

    pub(crate) fn meter(&self) -> Meter {
        self.provider.meter("tower-request-metrics")
    }

    pub(crate) fn collect(&self) -> Vec<ResourceMetrics> {
        self.provider.force_flush().unwrap();
        self.exporter.get_finished_metrics().unwrap()
    }
}

/// Latest export of the metric called `name`.
pub(crate) fn find_metric<'a>(resources: &'a [ResourceMetrics], name: &str) -> &'a Metric {
    resources
        .iter()
        .rev()
        .flat_map(|resource| resource.scope_metrics())
        .flat_map(|scope| scope.metrics())
        .find(|metric| metric.name() == name)
        .unwrap_or_else(|| panic!("no {name} metric exported"))
}

pub(crate) fn has_attributes<'a>(
    attributes: impl Iterator<Item = &'a KeyValue>,
    expected: &[(&str, &str)],
) -> bool {
    let attributes = attributes.collect::<Vec<_>>();
    expected.iter().all(|(key, value)| {
        attributes
            .iter()
            .any(|kv| kv.key.as_str() == *key && kv.value.as_str() == *value)
    })
}
