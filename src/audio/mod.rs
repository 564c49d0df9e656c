//! # Audio Intake Module
//!
//! Everything between the HTTP request and the recognition engine:
//!
//! - **upload**: drains the `audioFile` multipart field into memory
//! - **temp**: scoped on-disk scratch file, unique per request, deleted on
//!   drop on every exit path
//! - **wav**: RIFF/WAVE container parsing and the format gate
//!
//! ## Accepted Audio Format:
//! - **Channels**: Mono (1 channel)
//! - **Bit Depth**: 16-bit PCM
//! - **Encoding**: Uncompressed (WAVE format code 1), little-endian
//!
//! The sample rate is not gated; it is passed through to the engine, which
//! resamples to its native rate internally.

pub mod temp;   // Scoped per-request scratch file
pub mod upload; // Multipart field extraction
pub mod wav;    // Container parsing and format validation
