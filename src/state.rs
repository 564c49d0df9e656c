//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler: the configuration,
//! the request metrics, and - most importantly - the recognition engine
//! handle.
//!
//! ## Sharing model:
//! - **Config** lives behind `Arc<RwLock<_>>`: many readers, rare writers.
//! - **Metrics** live behind `Arc<RwLock<_>>`: every request updates them.
//! - **Engine** is `Arc<dyn RecognitionEngine>`: loaded once at startup and
//!   read-only for the lifetime of the process, so no lock is needed at this
//!   level. Handlers receive it by injection through `AppState` rather than
//!   reaching for a global.

use crate::config::AppConfig;
use crate::transcription::RecognitionEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be read concurrently)
    pub config: Arc<RwLock<AppConfig>>,

    /// The loaded recognition engine. Read-only, shared across requests;
    /// inference serializes on the engine's own internal lock.
    pub engine: Arc<dyn RecognitionEngine>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Number of transcriptions currently running
    pub in_flight_transcriptions: u32,

    /// Detailed metrics for each API endpoint (e.g. "POST /transcribe")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration and engine handle.
    pub fn new(config: AppConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            engine,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other requests aren't
    /// blocked; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark one transcription as running (entering the recognition stage).
    pub fn transcription_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.in_flight_transcriptions += 1;
    }

    /// Mark one transcription as finished (any terminal state).
    ///
    /// Guards against underflow so an unbalanced call can't panic.
    pub fn transcription_finished(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.in_flight_transcriptions > 0 {
            metrics.in_flight_transcriptions -= 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones under the read lock so metrics stay consistent while we
    /// serialize them, without holding the lock during response generation.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            in_flight_transcriptions: metrics.in_flight_transcriptions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::{RecognitionEngine, Transcript};

    struct NullEngine;

    impl RecognitionEngine for NullEngine {
        fn transcribe(&self, _sample_rate: u32, _samples: &[i16]) -> anyhow::Result<Transcript> {
            Ok(Transcript {
                text: String::new(),
                audio_duration: 0.0,
                processing_time_ms: 0,
                model_name: "null".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    fn state() -> AppState {
        AppState::new(AppConfig::default(), Arc::new(NullEngine))
    }

    #[test]
    fn test_request_counters() {
        let state = state();
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_in_flight_underflow_protection() {
        let state = state();
        state.transcription_finished(); // Unbalanced on purpose
        assert_eq!(state.get_metrics_snapshot().in_flight_transcriptions, 0);

        state.transcription_started();
        state.transcription_finished();
        assert_eq!(state.get_metrics_snapshot().in_flight_transcriptions, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("POST /transcribe", 100, false);
        state.record_endpoint_request("POST /transcribe", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /transcribe"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
