//! Metrics middleware. Counts every request against the shared state and
//! records per-endpoint timing, feeding the /health and /metrics views. The
//! transcription route gets extra visibility: it is the only expensive
//! endpoint this service has, so its concurrency and slow requests are worth
//! a log line on their own.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{debug, warn};

/// The route served by the recognition pipeline.
const TRANSCRIBE_PATH: &str = "/transcribe";

/// Successful transcriptions slower than this still get a warning line.
const SLOW_TRANSCRIPTION_MS: u64 = 10_000;

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = format!("{} {}", req.method(), req.uri().path());
        let is_transcription = req.uri().path() == TRANSCRIBE_PATH;

        if let Some(app_state) = req.app_data::<web::Data<AppState>>() {
            app_state.increment_request_count();

            if is_transcription {
                let in_flight = app_state.get_metrics_snapshot().in_flight_transcriptions;
                debug!(in_flight, "Transcription request accepted");
            }
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Ok(response) = &result {
                if let Some(app_state) = response.request().app_data::<web::Data<AppState>>() {
                    app_state.record_endpoint_request(&endpoint, duration_ms, is_error);

                    if is_error {
                        app_state.increment_error_count();
                    }
                }
            }

            if is_transcription && !is_error && duration_ms > SLOW_TRANSCRIPTION_MS {
                warn!(endpoint = %endpoint, duration_ms, "Slow transcription request");
            }

            result
        })
    }
}
