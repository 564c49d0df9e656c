//! # Whisper Model Internals
//!
//! Loads a Whisper model from a local directory and runs one-shot greedy
//! decoding over a complete audio buffer via Candle.
//!
//! ## Model directory layout:
//! - `config.json` - model architecture configuration
//! - `tokenizer.json` - the tokenizer
//! - `model.safetensors` - the weights (safetensors only; mmap-loaded)
//!
//! The directory is resolved at startup; nothing here touches the network.

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::path::Path;
use tokenizers::Tokenizer;

/// The sample rate Whisper models are trained on.
pub const NATIVE_SAMPLE_RATE: u32 = 16_000;

/// Whisper processes fixed 30-second windows.
const WINDOW_SECONDS: usize = 30;

/// Standard Whisper frame count for one 30-second window.
const N_FRAMES: usize = 3000;

/// FFT size for 16kHz Whisper mel features.
const N_FFT: usize = 400;

/// Cap on decoded tokens for a single window.
const MAX_DECODE_TOKENS: usize = 200;

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    name: String,
}

impl WhisperModel {
    /// Load a Whisper model from a local directory.
    ///
    /// ## Loading Process:
    /// 1. Check all three required files exist (clear message if not)
    /// 2. Parse the architecture config and the tokenizer
    /// 3. Build the mel filter bank for this architecture
    /// 4. Mmap the safetensors weights and initialize the model
    pub fn load(model_dir: &Path, device: Device) -> Result<Self> {
        let start_time = std::time::Instant::now();

        let config_path = model_dir.join("config.json");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let weights_path = model_dir.join("model.safetensors");

        for (label, path) in [
            ("config.json", &config_path),
            ("tokenizer.json", &tokenizer_path),
            ("model.safetensors", &weights_path),
        ] {
            if !path.is_file() {
                return Err(anyhow!(
                    "model directory {} is missing {}",
                    model_dir.display(),
                    label
                ));
            }
        }

        let config: Config = serde_json::from_reader(std::fs::File::open(&config_path)?)?;
        tracing::debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = Self::create_mel_filter_bank(N_FFT, config.num_mel_bins as usize);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "whisper".to_string());

        tracing::info!(
            "Whisper model '{}' loaded in {:.2}s",
            name,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            name,
        })
    }

    /// Human-readable model name (the directory name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smoke-test the model with one second of silence.
    ///
    /// Proves the weights, tokenizer, and decode loop all hold together
    /// before the server starts accepting uploads.
    pub fn validate(&mut self, language: Option<&str>) -> Result<()> {
        tracing::debug!("Validating Whisper model with 1s of silence...");
        let test_audio = vec![0.0f32; NATIVE_SAMPLE_RATE as usize];
        let result = self.transcribe(&test_audio, language)?;
        tracing::debug!("Model validation successful, test result: '{}'", result);
        Ok(())
    }

    /// Transcribe a complete audio buffer to text.
    ///
    /// ## Audio Requirements:
    /// - 16kHz mono, 32-bit float in [-1.0, 1.0] (the engine converts)
    /// - One 30-second window; longer input is truncated to the window
    ///
    /// Decoding is greedy (temperature 0) so the same buffer always yields
    /// the same transcript.
    pub fn transcribe(&mut self, audio: &[f32], language: Option<&str>) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        let mel = self.pcm_to_mel(audio)?;
        let mel = mel.unsqueeze(0)?; // Batch dimension

        let encoder_output = self.model.encoder.forward(&mel, false)?;

        // Prompt: start-of-transcript, optional language, transcribe task.
        let mut tokens = vec![self.sot_token()];
        if let Some(lang) = language {
            if let Some(lang_token) = self.language_token(lang) {
                tokens.push(lang_token);
            }
        }
        tokens.push(self.transcribe_token());

        let mut output_tokens = Vec::new();

        for _ in 0..MAX_DECODE_TOKENS {
            let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.decoder.forward(&token_tensor, &encoder_output, false)?;

            let last_logits = logits.i((.., tokens.len() - 1, ..))?;
            let next_token = last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?;

            if next_token == self.eot_token() {
                break;
            }

            // A model stuck repeating itself will never emit end-of-text.
            if Self::is_repetitive(&output_tokens, next_token) {
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        self.decode_tokens(&output_tokens)
    }

    /// Convert float PCM to the model's log-mel spectrogram input.
    ///
    /// Simplified energy-based features over the fixed 30-second window,
    /// padded with silence or truncated as needed.
    fn pcm_to_mel(&self, audio: &[f32]) -> Result<Tensor> {
        let target_len = WINDOW_SECONDS * NATIVE_SAMPLE_RATE as usize;
        let mut padded = vec![0.0f32; target_len];
        let copy_len = audio.len().min(target_len);
        padded[..copy_len].copy_from_slice(&audio[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let mut mel_data = vec![0.0f32; n_mels * N_FRAMES];

        let frame_size = padded.len() / N_FRAMES;
        for frame in 0..N_FRAMES {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());

            let mut energy = 0.0f32;
            for sample in &padded[start..end] {
                energy += sample.abs();
            }
            let feature = (energy / frame_size as f32).ln().max(-11.5129); // -80 dB floor

            for mel_bin in 0..n_mels {
                let weight = self.mel_filters[mel_bin * N_FFT + (frame % N_FFT)];
                mel_data[mel_bin * N_FRAMES + frame] = feature * weight.max(0.1);
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, N_FRAMES), &self.device)?)
    }

    /// Triangular mel filter bank across the FFT bins.
    fn create_mel_filter_bank(n_fft: usize, n_mels: usize) -> Vec<f32> {
        let mut filters = vec![0.0f32; n_fft * n_mels];

        for i in 0..n_mels {
            let center = (i + 1) * n_fft / (n_mels + 1);
            let width = n_fft / (n_mels + 1);

            for j in 0..n_fft {
                if j >= center.saturating_sub(width) && j <= center + width {
                    let distance = (j as i32 - center as i32).abs() as f32;
                    filters[i * n_fft + j] = (1.0 - distance / width as f32).max(0.0);
                }
            }
        }

        filters
    }

    /// Detect a decode loop stuck on repeating token patterns.
    fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
        if tokens.len() >= 3 && tokens[tokens.len() - 3..] == [new_token, new_token, new_token] {
            return true;
        }

        if tokens.len() >= 6 {
            let last_3 = &tokens[tokens.len() - 3..];
            let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
            if last_3 == prev_3 {
                return true;
            }
        }

        false
    }

    /// Decode token ids to text and strip special-token artifacts.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }

    /// Start-of-transcript token id.
    fn sot_token(&self) -> u32 {
        50258
    }

    /// End-of-text token id.
    fn eot_token(&self) -> u32 {
        50257
    }

    /// Transcribe-task token id.
    fn transcribe_token(&self) -> u32 {
        50359
    }

    /// Language token id for a language hint, if we know it.
    fn language_token(&self, language: &str) -> Option<u32> {
        match language.to_lowercase().as_str() {
            "en" | "english" => Some(50259),
            "zh" | "chinese" => Some(50260),
            "de" | "german" => Some(50261),
            "es" | "spanish" => Some(50262),
            "ru" | "russian" => Some(50263),
            "ko" | "korean" => Some(50264),
            "fr" | "french" => Some(50265),
            "ja" | "japanese" => Some(50266),
            "pt" | "portuguese" => Some(50267),
            "it" | "italian" => Some(50274),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_contents_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = match WhisperModel::load(dir.path(), Device::Cpu) {
            Ok(_) => panic!("loading an empty model directory must fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_repetition_guard_catches_immediate_runs() {
        assert!(WhisperModel::is_repetitive(&[5, 9, 9, 9], 9));
        assert!(!WhisperModel::is_repetitive(&[5, 9, 9], 7));
    }

    #[test]
    fn test_repetition_guard_catches_patterns() {
        assert!(WhisperModel::is_repetitive(&[1, 2, 3, 1, 2, 3], 4));
        assert!(!WhisperModel::is_repetitive(&[1, 2, 3, 4, 5, 6], 7));
    }

    #[test]
    fn test_mel_filter_bank_shape() {
        let filters = WhisperModel::create_mel_filter_bank(N_FFT, 80);
        assert_eq!(filters.len(), N_FFT * 80);
        // Filters are normalized triangles
        assert!(filters.iter().all(|&f| (0.0..=1.0).contains(&f)));
        assert!(filters.iter().any(|&f| f > 0.0));
    }
}
