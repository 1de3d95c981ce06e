use http::{header::HOST, request::Parts, Response};
use http_body::Body;

/// Host the request was sent to, from the URI authority or the `Host` header.
pub fn http_host(parts: &Parts) -> &str {
    parts
        .uri
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| parts.headers.get(HOST).and_then(|v| v.to_str().ok()))
        .unwrap_or_default()
}

/// Get the size of the HTTP response body from the `Content-Length` header.
pub fn http_response_size<B: Body>(res: &Response<B>) -> Option<u64> {
    res.headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| res.body().size_hint().exact())
}

cfg_if::cfg_if! {
    if #[cfg(feature = "axum")] {
        pub fn http_route(parts: &Parts) -> Option<&str> {
            use axum::extract::MatchedPath;
            parts.extensions.get::<MatchedPath>().map(|matched_path| matched_path.as_str())
        }
    }
}
