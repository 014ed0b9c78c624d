//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vcount_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vcount_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vcount_http_requests_in_flight";

    pub const UPLOADS_TOTAL: &str = "vcount_uploads_total";
    pub const UPLOAD_BYTES: &str = "vcount_upload_bytes";
    pub const JOBS_SUBMITTED_TOTAL: &str = "vcount_jobs_submitted_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vcount_jobs_cancelled_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "vcount_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted upload.
pub fn record_upload(mode: &'static str, bytes: u64) {
    counter!(names::UPLOADS_TOTAL, "mode" => mode).increment(1);
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse resource ids so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        if matches!(previous, "jobs" | "analysis") && !segment.is_empty() {
            out.push(":id");
        } else {
            out.push(segment);
        }
        previous = segment;
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/jobs/:id"
        );
        assert_eq!(sanitize_path("/analysis/abc123"), "/analysis/:id");
        assert_eq!(sanitize_path("/history"), "/history");
        assert_eq!(sanitize_path("/jobs"), "/jobs");
    }
}
