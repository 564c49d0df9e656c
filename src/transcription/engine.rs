//! # Recognition Engine Seam
//!
//! The trait boundary between the request handler and whatever actually
//! converts samples into text. The handler never sees model internals: it
//! hands over the container's sample rate and the complete 16-bit PCM mono
//! buffer, and gets back the final aggregate transcript.
//!
//! Engines must be `Send + Sync`: the single loaded engine is shared
//! read-only across all in-flight requests through an `Arc`.

use crate::transcription::model::{WhisperModel, NATIVE_SAMPLE_RATE};
use anyhow::{anyhow, Result};
use candle_core::Device;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// The final, aggregate result for one complete audio buffer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Transcript {
    /// The transcribed text
    pub text: String,

    /// Duration of the submitted audio (seconds)
    pub audio_duration: f64,

    /// Time taken for recognition (milliseconds)
    pub processing_time_ms: u64,

    /// Model that produced the text
    pub model_name: String,
}

/// A speech-to-text engine invoked in one-shot, non-streaming mode.
///
/// Implementations are free to resample or convert internally; callers only
/// guarantee mono 16-bit PCM samples at the stated rate.
pub trait RecognitionEngine: Send + Sync {
    /// Transcribe a complete buffer of mono 16-bit PCM samples.
    fn transcribe(&self, sample_rate: u32, samples: &[i16]) -> Result<Transcript>;

    /// Human-readable name of the loaded model.
    fn model_name(&self) -> &str;
}

/// Whisper-backed engine, loaded once from a local model directory.
///
/// ## Sharing:
/// The decoder mutates internal state during inference, so the model sits
/// behind a `Mutex`; requests share the engine itself read-only and
/// serialize on the lock only for the inference call.
pub struct WhisperEngine {
    model: Mutex<WhisperModel>,
    language: Option<String>,
    name: String,
}

impl WhisperEngine {
    /// Load the model from `model_dir` and smoke-test it with one second of
    /// silence before accepting any traffic.
    pub fn load(model_dir: &Path, language: Option<&str>, device: Device) -> Result<Self> {
        let mut model = WhisperModel::load(model_dir, device)?;

        // A model that cannot transcribe silence will not transcribe speech;
        // fail startup instead of the first request.
        model.validate(language)?;

        let name = model.name().to_string();
        Ok(Self {
            model: Mutex::new(model),
            language: language.map(|s| s.to_string()),
            name,
        })
    }
}

impl RecognitionEngine for WhisperEngine {
    fn transcribe(&self, sample_rate: u32, samples: &[i16]) -> Result<Transcript> {
        let start_time = Instant::now();
        let audio_duration = samples.len() as f64 / sample_rate as f64;

        // An empty (or effectively empty) buffer transcribes to nothing.
        if samples.is_empty() {
            return Ok(Transcript {
                text: String::new(),
                audio_duration: 0.0,
                processing_time_ms: start_time.elapsed().as_millis() as u64,
                model_name: self.name.clone(),
            });
        }

        let audio = pcm_to_float(samples);
        let audio = resample_to(&audio, sample_rate, NATIVE_SAMPLE_RATE);

        let text = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow!("recognition model lock poisoned"))?;
            model.transcribe(&audio, self.language.as_deref())?
        };

        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!(
            "Recognized {:.2}s of audio in {}ms ({} chars)",
            audio_duration,
            processing_time_ms,
            text.len()
        );

        Ok(Transcript {
            text: text.trim().to_string(),
            audio_duration,
            processing_time_ms,
            model_name: self.name.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Convert 16-bit PCM samples to the float range [-1.0, 1.0] models expect.
pub(crate) fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Linear-interpolation resampling to the engine's native rate.
///
/// Whisper only hears 16kHz; clients upload whatever their recorder
/// produced. Linear interpolation is plenty for speech.
pub(crate) fn resample_to(audio: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || audio.is_empty() {
        return audio.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((audio.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = audio[idx.min(audio.len() - 1)];
        let b = audio[(idx + 1).min(audio.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}
