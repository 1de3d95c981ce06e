use std::sync::Arc;

use axum::{extract::Path, routing::get, Router};
use prometheus_client::{encoding::text::encode, registry::Registry};
use tower_request_metrics::{
    metrics::{HttpLayer, MetricsConfig},
    EndpointDetails, InitMetricDetails,
};
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

const ADDR: &str = "[::1]:3000";

#[tokio::main]
async fn main() {
    const PKG_NAME: &str = env!("CARGO_PKG_NAME");

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(Level::DEBUG))
        .with(tracing_subscriber::fmt::layer().with_level(true))
        .init();

    let mut registry = Registry::default();
    let config = MetricsConfig::new(PKG_NAME)
        .with_duration_buckets([1.0, 5.0, 10.0, 50.0, 100.0, 500.0])
        .with_request_size_buckets([16.0, 256.0, 4096.0])
        .with_response_size_buckets([16.0, 256.0, 4096.0])
        .with_matched_path();

    let details = InitMetricDetails {
        endpoints: vec![
            EndpointDetails::new("/users/{id}", "GET"),
            EndpointDetails::new("/users/{id}/posts/{post}", "GET"),
        ],
        host: ADDR.to_owned(),
        status_codes: vec!["200".to_owned(), "404".to_owned()],
    };
    let metrics = HttpLayer::prometheus(&mut registry, &config, Some(details)).unwrap();

    let registry = Arc::new(registry);
    let app = Router::new()
        .route("/users/{id}", get(|Path(id): Path<String>| async move { format!("user {id}") }))
        .route(
            "/users/{id}/posts/{post}",
            get(|Path((id, post)): Path<(String, String)>| async move {
                format!("post {post} of user {id}")
            }),
        )
        .route_layer(metrics)
        .route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let mut buffer = String::new();
                    encode(&mut buffer, &registry).unwrap();
                    buffer
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind(ADDR).await.unwrap();
    tracing::info!("listening on http://{ADDR}");
    axum::serve(listener, app).await.unwrap();
}
