//! # Transcription Module
//!
//! Speech-to-text for complete audio buffers, one-shot and non-streaming.
//!
//! ## Key Components:
//! - **engine**: the `RecognitionEngine` seam the HTTP layer talks to, plus
//!   the Whisper-backed implementation
//! - **model**: Whisper model loading (from a local directory) and inference
//!   via the Candle framework
//!
//! ## Candle Integration:
//! Pure Rust inference - no FFI bindings to whisper.cpp, no network access.
//! The model directory must contain `config.json`, `tokenizer.json`, and
//! `model.safetensors`; it is resolved once at startup and never reloaded.

pub mod engine; // Engine trait + Whisper implementation
pub mod model;  // Candle Whisper model internals

pub use engine::{RecognitionEngine, Transcript, WhisperEngine};
