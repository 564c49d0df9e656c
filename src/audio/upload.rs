//! # Multipart Upload Intake
//!
//! Drains the `audioFile` multipart form field into memory. This is the very
//! first stage of a transcription request: nothing has touched the disk yet,
//! so a missing field is the one rejection that needs no cleanup.

use crate::error::AppError;
use actix_multipart::{Field, Multipart};
use futures_util::stream::StreamExt;

/// The multipart form field name clients upload the WAV under.
pub const AUDIO_FIELD: &str = "audioFile";

/// One uploaded audio file: the raw bytes plus whatever filename the client
/// declared. Transient - owned exclusively by the request that received it.
#[derive(Debug)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

/// Errors while draining the upload out of the request body.
#[derive(Debug)]
pub enum UploadError {
    /// The request carried no `audioFile` field
    MissingField,
    /// The upload exceeded the configured size cap
    TooLarge { limit: usize },
    /// The multipart stream itself was unreadable
    Transport(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingField => {
                AppError::MissingUpload("No audio file uploaded.".to_string())
            }
            UploadError::TooLarge { limit } => AppError::InvalidFormat(format!(
                "The audio file exceeds the maximum upload size of {} bytes.",
                limit
            )),
            UploadError::Transport(msg) => {
                AppError::MissingUpload(format!("Could not read the uploaded form data: {}", msg))
            }
        }
    }
}

/// Read the `audioFile` field out of the multipart payload.
///
/// Fields with other names are drained and ignored so a client that sends
/// extra form data is not punished for it. The size cap is enforced while
/// streaming, before the whole body has been buffered.
pub async fn read_audio_field(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<AudioUpload, UploadError> {
    let mut audio: Option<AudioUpload> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| UploadError::Transport(format!("multipart error: {}", e)))?;

        // Copy the metadata out first; reading chunks needs the field mutably.
        let (is_audio, filename) = {
            let disposition = field.content_disposition().ok_or_else(|| {
                UploadError::Transport("missing content disposition".to_string())
            })?;
            (
                disposition.get_name() == Some(AUDIO_FIELD),
                disposition.get_filename().map(|s| s.to_string()),
            )
        };

        if !is_audio {
            // Drain the unrelated field so the stream can continue.
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Transport(format!("chunk error: {}", e)))?;
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| UploadError::Transport(format!("chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(UploadError::TooLarge { limit: max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        audio = Some(AudioUpload { bytes, filename });
    }

    audio.ok_or(UploadError::MissingField)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_missing_field_maps_to_400_input_error() {
        let err: AppError = UploadError::MissingField.into();
        match err {
            AppError::MissingUpload(msg) => assert!(msg.contains("No audio file")),
            other => panic!("expected MissingUpload, got {:?}", other),
        }
    }

    #[test]
    fn test_oversize_maps_to_client_error_with_limit() {
        let err: AppError = UploadError::TooLarge { limit: 1024 }.into();
        match err {
            AppError::InvalidFormat(msg) => assert!(msg.contains("1024")),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }
}
