use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use metrics::{histogram, increment_counter};

pub const REQUESTS_TOTAL: &str = "gridbot_http_requests_total";
pub const LATENCY_MS: &str = "gridbot_http_latency_ms";

/// Which HTTP surface a request belongs to: `udf`, `health` or `other`.
pub fn surface(path: &str) -> &'static str {
    match path.trim_start_matches('/').split('/').next() {
        Some("udf") => "udf",
        Some("health") => "health",
        _ => "other",
    }
}

/// `404` -> `"4xx"`.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Counts requests and records latency per surface and endpoint.
/// Unrouted requests share the `unmatched` endpoint label.
pub struct Metrics;

impl<S, B> Transform<S, ServiceRequest> for Metrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = MetricsSvc<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, srv: S) -> Self::Future {
        ready(Ok(MetricsSvc { inner: srv }))
    }
}

pub struct MetricsSvc<S> {
    inner: S,
}

impl<S, B> Service<ServiceRequest> for MetricsSvc<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let surface = surface(req.path());
        let endpoint = req.match_pattern().unwrap_or_else(|| "unmatched".to_string());

        let fut = self.inner.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let latency_ms = start.elapsed().as_secs_f64() * 1_000.0;

            increment_counter!(
                REQUESTS_TOTAL,
                "surface" => surface,
                "endpoint" => endpoint.clone(),
                "status" => status_class(res.status().as_u16()),
            );
            histogram!(
                LATENCY_MS,
                latency_ms,
                "surface" => surface,
                "endpoint" => endpoint,
            );

            Ok(res)
        })
    }
}
