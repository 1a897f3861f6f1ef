use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
};
use hyper::StatusCode;

/// Custom failure handling for the trace layer. 503 responses are logged
/// at `INFO` instead of `ERROR` so they don't fill the error log.
#[derive(Clone, Copy)]
pub(crate) struct LevelAdjustingOnFailure;

impl tower_http::trace::OnFailure<tower_http::classify::ServerErrorsFailureClass>
    for LevelAdjustingOnFailure
{
    fn on_failure(
        &mut self,
        failure_classification: tower_http::classify::ServerErrorsFailureClass,
        latency: core::time::Duration,
        span: &tracing::Span,
    ) {
        use tower_http::classify::ServerErrorsFailureClass as S;

        match failure_classification {
            S::StatusCode(StatusCode::SERVICE_UNAVAILABLE) => {
                tracing::info!(classification = %S::StatusCode(StatusCode::SERVICE_UNAVAILABLE), latency = %format!("{} ms", latency.as_millis()), "response failed (downgraded)");
            }
            value => {
                tower_http::trace::DefaultOnFailure::default().on_failure(value, latency, span);
            }
        }
    }
}

/// Middleware to set response headers for a JSON only API.
///
/// Responses describe live machine state and must never be served from a cache.
pub(crate) async fn api_headers_middleware(
    req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
    response
}
