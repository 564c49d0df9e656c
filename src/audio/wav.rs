//! # WAV Container Parsing and Format Validation
//!
//! Reads the RIFF/WAVE container the client uploaded and exposes exactly the
//! metadata the validation gate needs: format code, channel count, sample
//! rate, and bit depth. Parsing is deliberately split from validation:
//!
//! - A container we cannot parse at all (bad magic, truncated chunks) is a
//!   **decode failure** - the caller maps it to a server error.
//! - A container we can parse but whose format is not mono/16-bit/PCM fails
//!   the **format gate** - the caller maps it to a client error.
//!
//! The distinction matters: a compressed WAV must tell the client to re-encode,
//! not claim the server broke.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// WAVE format code for uncompressed integer PCM.
pub const WAVE_FORMAT_PCM: u16 = 1;

/// Container metadata read from the `fmt ` chunk.
///
/// Used only for the validation gate and the engine's sample-rate argument;
/// not retained beyond the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// WAVE format code (1 = uncompressed PCM)
    pub format_code: u16,
    /// Number of interleaved channels
    pub channels: u16,
    /// Frames per second
    pub sample_rate: u32,
    /// Bits per sample (16 = 2-byte sample width)
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// The format gate: mono, 16-bit, uncompressed PCM - or a message telling
    /// the client what to send instead.
    pub fn validate_for_recognition(&self) -> Result<(), String> {
        if self.channels != 1
            || self.bits_per_sample != 16
            || self.format_code != WAVE_FORMAT_PCM
        {
            return Err(
                "The audio file must be mono, 16-bit PCM, and uncompressed (WAV).".to_string(),
            );
        }
        Ok(())
    }
}

/// Errors produced while reading a WAV container.
#[derive(Debug)]
pub enum WavError {
    /// The bytes do not form a readable RIFF/WAVE container
    Malformed(String),
    /// Underlying file I/O failed
    Io(io::Error),
}

impl fmt::Display for WavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WavError::Malformed(msg) => write!(f, "malformed WAV container: {}", msg),
            WavError::Io(err) => write!(f, "I/O error reading WAV container: {}", err),
        }
    }
}

impl std::error::Error for WavError {}

impl From<io::Error> for WavError {
    fn from(err: io::Error) -> Self {
        // Running out of bytes mid-structure means the container is cut
        // short, which is a shape problem, not a filesystem problem.
        if err.kind() == io::ErrorKind::UnexpectedEof {
            WavError::Malformed("unexpected end of file".to_string())
        } else {
            WavError::Io(err)
        }
    }
}

/// A parsed WAV file: container metadata plus the raw `data` chunk payload.
#[derive(Debug)]
pub struct WavFile {
    spec: WavSpec,
    data: Vec<u8>,
}

impl WavFile {
    /// Open and parse a WAV file from disk.
    pub fn open(path: &Path) -> Result<Self, WavError> {
        let file = File::open(path).map_err(WavError::Io)?;
        Self::read(BufReader::new(file))
    }

    /// Parse a WAV container from any seekable reader.
    ///
    /// Walks the chunk list until both the `fmt ` and `data` chunks have been
    /// seen; unknown chunks (`LIST`, `fact`, ...) are skipped. Chunks are
    /// word-aligned, so odd-sized ones carry a pad byte.
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Self, WavError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != b"RIFF" {
            return Err(WavError::Malformed("missing RIFF header".to_string()));
        }

        let _riff_size = reader.read_u32::<LittleEndian>()?;

        reader.read_exact(&mut magic)?;
        if &magic != b"WAVE" {
            return Err(WavError::Malformed("not a WAVE container".to_string()));
        }

        let mut spec: Option<WavSpec> = None;

        loop {
            let mut chunk_id = [0u8; 4];
            match reader.read_exact(&mut chunk_id) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let chunk_size = reader.read_u32::<LittleEndian>()?;

            match &chunk_id {
                b"fmt " => {
                    if chunk_size < 16 {
                        return Err(WavError::Malformed("fmt chunk too small".to_string()));
                    }

                    let format_code = reader.read_u16::<LittleEndian>()?;
                    let channels = reader.read_u16::<LittleEndian>()?;
                    let sample_rate = reader.read_u32::<LittleEndian>()?;
                    let _byte_rate = reader.read_u32::<LittleEndian>()?;
                    let _block_align = reader.read_u16::<LittleEndian>()?;
                    let bits_per_sample = reader.read_u16::<LittleEndian>()?;

                    if channels == 0 {
                        return Err(WavError::Malformed(
                            "fmt chunk declares zero channels".to_string(),
                        ));
                    }
                    if sample_rate == 0 {
                        return Err(WavError::Malformed(
                            "fmt chunk declares a zero sample rate".to_string(),
                        ));
                    }

                    // Skip any fmt extension bytes (non-PCM codecs carry them).
                    Self::skip_chunk_remainder(&mut reader, chunk_size, 16)?;

                    spec = Some(WavSpec {
                        format_code,
                        channels,
                        sample_rate,
                        bits_per_sample,
                    });
                }
                b"data" => {
                    let spec = spec.ok_or_else(|| {
                        WavError::Malformed("data chunk appears before fmt chunk".to_string())
                    })?;

                    // The declared length is untrusted; read what is actually
                    // there instead of allocating the header's size up front.
                    let mut data = Vec::new();
                    reader
                        .by_ref()
                        .take(chunk_size as u64)
                        .read_to_end(&mut data)?;
                    if data.len() < chunk_size as usize {
                        return Err(WavError::Malformed("truncated data chunk".to_string()));
                    }

                    return Ok(Self { spec, data });
                }
                _ => {
                    Self::skip_chunk_remainder(&mut reader, chunk_size, 0)?;
                }
            }
        }

        Err(WavError::Malformed("no data chunk found".to_string()))
    }

    /// Skip the unread remainder of a chunk, including the alignment pad byte.
    fn skip_chunk_remainder<R: Read + Seek>(
        reader: &mut R,
        chunk_size: u32,
        consumed: u32,
    ) -> Result<(), WavError> {
        let mut remainder = chunk_size.saturating_sub(consumed) as i64;
        if chunk_size % 2 == 1 {
            remainder += 1; // Chunks are word-aligned
        }
        if remainder > 0 {
            reader.seek(SeekFrom::Current(remainder))?;
        }
        Ok(())
    }

    /// The container metadata, for the format gate.
    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Decode the data chunk into 16-bit little-endian samples.
    ///
    /// Only meaningful after the format gate has passed; a 16-bit PCM data
    /// chunk whose length is not sample-aligned is considered corrupt.
    pub fn into_samples(self) -> Result<Vec<i16>, WavError> {
        if self.data.len() % 2 != 0 {
            return Err(WavError::Malformed(
                "data chunk length is not sample-aligned".to_string(),
            ));
        }

        let samples = self
            .data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(samples)
    }
}
