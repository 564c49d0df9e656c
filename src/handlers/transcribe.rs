//! # Transcription Request Handler
//!
//! `POST /transcribe` - the one endpoint this service exists for. The flow
//! per request is strictly linear:
//!
//! ```text
//! intake -> persist -> validate -> recognize -> respond
//! ```
//!
//! with two rejection points (missing field, format gate) and failure
//! reachable from any stage. The scoped temp file created at the persist
//! stage is removed on *every* terminal path - including the format-gate
//! rejection - because its guard drops with the request.
//!
//! Recognition runs on a blocking worker thread under a bounded timeout;
//! the model handle itself is shared read-only and never mutated here.

use crate::audio::temp::TempWav;
use crate::audio::upload::{self, AudioUpload};
use crate::audio::wav::WavFile;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Success body: `{"transcription": "<text>"}`.
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcription: String,
}

/// Handle one transcription request end to end.
///
/// ## Outcomes:
/// - 200 `{"transcription": s}` - valid mono/16-bit/PCM WAV, engine succeeded
/// - 400 `{"error": s}` - missing `audioFile` field, or non-conforming audio
/// - 500 `{"error": s}` - decode failure, engine failure, or timeout
///
/// Exactly one temp file is created and removed per request that reaches the
/// persist stage; a missing upload field never touches the disk.
pub async fn transcribe(
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let config = state.get_config();

    // Intake. Nothing is on disk yet; rejection here needs no cleanup.
    let AudioUpload { bytes, filename } =
        upload::read_audio_field(payload, config.limits.max_upload_bytes).await?;
    debug!(
        filename = filename.as_deref().unwrap_or("unknown"),
        size_bytes = bytes.len(),
        "Audio upload received"
    );

    // Persist to a unique scratch path. From here until the response is
    // built, `_temp` guards the file: every exit path below drops it.
    let temp = TempWav::create(&bytes)?;

    // Open the container and read its metadata.
    let wav = WavFile::open(temp.path())
        .map_err(|e| AppError::Processing(format!("Failed to decode the WAV container: {}", e)))?;

    // Format gate: runs after the write, so this rejection path exercises
    // the guard's cleanup just like the failure paths do.
    let spec = wav.spec();
    spec.validate_for_recognition().map_err(AppError::InvalidFormat)?;

    // Read all frames and submit the complete buffer in one call.
    let samples = wav
        .into_samples()
        .map_err(|e| AppError::Processing(format!("Failed to decode audio samples: {}", e)))?;

    let engine = state.engine.clone();
    let sample_rate = spec.sample_rate;
    let timeout = Duration::from_secs(config.limits.request_timeout_secs);

    state.transcription_started();
    let outcome = tokio::time::timeout(
        timeout,
        web::block(move || engine.transcribe(sample_rate, &samples)),
    )
    .await;
    state.transcription_finished();

    let transcript = match outcome {
        Err(_elapsed) => {
            warn!(
                timeout_secs = config.limits.request_timeout_secs,
                "Transcription timed out"
            );
            return Err(AppError::Timeout(format!(
                "Transcription did not finish within {} seconds.",
                config.limits.request_timeout_secs
            )));
        }
        Ok(Err(blocking)) => {
            return Err(AppError::Processing(format!(
                "Transcription worker failed: {}",
                blocking
            )));
        }
        Ok(Ok(Err(engine_err))) => {
            return Err(AppError::Processing(format!(
                "An error occurred during processing: {}",
                engine_err
            )));
        }
        Ok(Ok(Ok(transcript))) => transcript,
    };

    info!(
        model = %transcript.model_name,
        audio_seconds = transcript.audio_duration,
        processing_ms = transcript.processing_time_ms,
        chars = transcript.text.len(),
        "Transcription completed"
    );

    // The scratch file is gone before the response leaves the handler.
    drop(temp);

    Ok(HttpResponse::Ok().json(TranscribeResponse {
        transcription: transcript.text,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{silent_wav, wav_bytes};
    use crate::config::AppConfig;
    use crate::transcription::{RecognitionEngine, Transcript};
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    /// Deterministic stand-in for the loaded model: echoes a fixed text and
    /// records nothing. Lets the HTTP pipeline be tested without weights.
    struct StubEngine {
        text: String,
        fail: bool,
        delay: Option<Duration>,
    }

    impl StubEngine {
        fn fixed(text: &str) -> Self {
            Self {
                text: text.to_string(),
                fail: false,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                text: String::new(),
                fail: true,
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                text: "late".to_string(),
                fail: false,
                delay: Some(delay),
            }
        }
    }

    impl RecognitionEngine for StubEngine {
        fn transcribe(&self, sample_rate: u32, samples: &[i16]) -> anyhow::Result<Transcript> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                anyhow::bail!("engine exploded");
            }
            Ok(Transcript {
                text: self.text.clone(),
                audio_duration: samples.len() as f64 / sample_rate as f64,
                processing_time_ms: 1,
                model_name: "stub".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn app_state(engine: StubEngine) -> AppState {
        AppState::new(AppConfig::default(), Arc::new(engine))
    }

    fn app_state_with_timeout(engine: StubEngine, timeout_secs: u64) -> AppState {
        let mut config = AppConfig::default();
        config.limits.request_timeout_secs = timeout_secs;
        AppState::new(config, Arc::new(engine))
    }

    /// Build a multipart/form-data body carrying one file field.
    fn multipart_request(
        field_name: &str,
        file_bytes: &[u8],
    ) -> test::TestRequest {
        let boundary = "----transcribe-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
                 filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file_bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(body)
    }

    async fn run(
        state: AppState,
        req: test::TestRequest,
    ) -> (StatusCode, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let response = test::call_service(&app, req.to_request()).await;
        let status = response.status();
        let body: serde_json::Value = test::read_body_json(response).await;
        (status, body)
    }

    #[actix_web::test]
    async fn test_valid_wav_returns_transcription() {
        let wav = silent_wav(16000, 0.25);
        let (status, body) = run(
            app_state(StubEngine::fixed("hello world")),
            multipart_request("audioFile", &wav),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcription"], "hello world");
    }

    #[actix_web::test]
    async fn test_one_second_of_silence_yields_empty_transcript() {
        let wav = silent_wav(16000, 1.0);
        let (status, body) = run(
            app_state(StubEngine::fixed("")),
            multipart_request("audioFile", &wav),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcription"], "");
    }

    #[actix_web::test]
    async fn test_same_upload_twice_is_idempotent() {
        let state = app_state(StubEngine::fixed("same every time"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/transcribe", web::post().to(transcribe)),
        )
        .await;

        let wav = silent_wav(16000, 0.1);
        let mut transcripts = Vec::new();
        for _ in 0..2 {
            let response =
                test::call_service(&app, multipart_request("audioFile", &wav).to_request()).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = test::read_body_json(response).await;
            transcripts.push(body["transcription"].clone());
        }
        assert_eq!(transcripts[0], transcripts[1]);
    }

    #[actix_web::test]
    async fn test_missing_field_is_400_with_error_body() {
        let wav = silent_wav(16000, 0.1);
        // Field named anything other than "audioFile" counts as missing.
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("somethingElse", &wav),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("No audio file"));
    }

    #[actix_web::test]
    async fn test_stereo_wav_is_400_and_mentions_mono() {
        let stereo = wav_bytes(1, 2, 44100, 16, &[0u8; 16]);
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("audioFile", &stereo),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("mono"));
    }

    #[actix_web::test]
    async fn test_eight_bit_wav_is_400() {
        let eight_bit = wav_bytes(1, 1, 16000, 8, &[0u8; 8]);
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("audioFile", &eight_bit),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_compressed_wav_is_400() {
        // Format code 3 (IEEE float) fails the uncompressed-PCM gate.
        let float_wav = wav_bytes(3, 1, 16000, 16, &[0u8; 8]);
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("audioFile", &float_wav),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("PCM"));
    }

    #[actix_web::test]
    async fn test_truncated_wav_is_500() {
        let mut wav = silent_wav(16000, 0.1);
        wav.truncate(18); // Cut inside the fmt chunk
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("audioFile", &wav),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_garbage_bytes_are_500() {
        let (status, body) = run(
            app_state(StubEngine::fixed("unused")),
            multipart_request("audioFile", b"this is not audio at all"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_engine_failure_is_500() {
        let wav = silent_wav(16000, 0.1);
        let (status, body) = run(
            app_state(StubEngine::failing()),
            multipart_request("audioFile", &wav),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("processing"));
    }

    #[actix_web::test]
    async fn test_slow_engine_hits_the_timeout() {
        let wav = silent_wav(16000, 0.1);
        let state = app_state_with_timeout(StubEngine::slow(Duration::from_secs(3)), 1);
        let (status, body) = run(state, multipart_request("audioFile", &wav)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("did not finish"));
    }

    #[actix_web::test]
    async fn test_oversize_upload_is_rejected() {
        let wav = silent_wav(16000, 1.0); // 32KB of samples
        let mut config = AppConfig::default();
        config.limits.max_upload_bytes = 1024;
        let state = AppState::new(config, Arc::new(StubEngine::fixed("unused")));

        let (status, body) = run(state, multipart_request("audioFile", &wav)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("maximum upload size"));
    }
}
