//! Middleware that adds metrics to a [`Service`].
//!
//! The middleware only talks to a [`Recorder`], two implementations are provided: the
//! [`PrometheusRecorder`] and the [`OtelRecorder`].
//!
//! [`Service`]: tower_service::Service

#[doc(inline)]
pub use self::{
    config::{MetricsConfig, RouteResolver, DEFAULT_DURATION_BUCKETS, DEFAULT_SIZE_BUCKETS},
    http::{Http, HttpLayer, ResponseBody, ResponseFuture},
    otel::OtelRecorder,
    prometheus::PrometheusRecorder,
    recorder::{Labels, Recorder},
};

pub mod recorder;

mod config;
mod http;
mod otel;
mod prometheus;

#[cfg(test)]
mod testing;
