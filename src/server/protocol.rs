use super::WebError;
use crate::worker::WorkerStatus;
use anyhow::anyhow;
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

/// Prefix marking a data URL image payload
const DATA_URL_PREFIX: &str = "data:image";

/// Where the image in a request came from
pub enum ImageSource {
    /// A multipart file field
    FileUpload { bytes: Vec<u8>, filename: String },

    /// The `image` string of a JSON body, raw base64 or a data URL
    Base64Payload(String),
}

impl ImageSource {
    /// Identifies the source in logs
    pub fn describe(&self) -> &str {
        match self {
            ImageSource::FileUpload { filename, .. } => filename,
            ImageSource::Base64Payload(_) => "base64 image data",
        }
    }

    /// The encoded image bytes. Base64 may be wrapped across lines, so all
    /// whitespace is dropped before decoding.
    pub fn into_bytes(self) -> Result<Vec<u8>, WebError> {
        match self {
            ImageSource::FileUpload { bytes, .. } => Ok(bytes),
            ImageSource::Base64Payload(payload) => {
                let data: String = strip_data_url(&payload)?
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                Ok(general_purpose::STANDARD.decode(data)?)
            }
        }
    }
}

/// Strip a `data:image/...;base64,` prefix up to and including the first
/// comma. Anything else is returned unchanged.
pub fn strip_data_url(payload: &str) -> Result<&str, WebError> {
    if !payload.starts_with(DATA_URL_PREFIX) {
        return Ok(payload);
    }

    match payload.split_once(',') {
        Some((_, data)) => Ok(data),
        None => Err(anyhow!("data URL has no ',' before its payload").into()),
    }
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub remove_background: &'static str,
}

/// Service descriptor served on `/`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub message: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct WorkerInfo {
    pub id: usize,
    pub status: WorkerStatus,
}
