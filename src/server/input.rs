//! Extracts the image a caller sent. The request is classified once by its
//! `Content-Type`: multipart bodies are searched for an `image` file field,
//! JSON bodies for an `image` string. Nothing else can carry an image.

use super::protocol::ImageSource;
use super::WebError;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::web::{self, Bytes};
use actix_web::HttpRequest;
use anyhow::{anyhow, Context};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;

/// Name of the form field or JSON key holding the image
pub const IMAGE_FIELD: &str = "image";

/// Room in a JSON body for the envelope and a data URL prefix
const JSON_ENVELOPE_BYTES: usize = 4096;

/// The shape of a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Multipart,
    Json,
    Other,
}

impl BodyKind {
    pub fn of(req: &HttpRequest) -> Self {
        let mime = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|essence| essence.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if mime == "multipart/form-data" {
            BodyKind::Multipart
        } else if mime == "application/json"
            || (mime.starts_with("application/") && mime.ends_with("+json"))
        {
            BodyKind::Json
        } else {
            BodyKind::Other
        }
    }
}

/// Find the image in a request. Fails with `WebError::InputMissing` when the
/// request carries none.
pub async fn resolve(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> Result<ImageSource, WebError> {
    let source = match BodyKind::of(req) {
        BodyKind::Multipart => from_multipart(req, payload, limit).await?,
        BodyKind::Json => from_json(payload, limit).await?,
        BodyKind::Other => None,
    };

    source.ok_or(WebError::InputMissing)
}

/// Take the first `image` field that carries a non-empty filename. A field
/// without a filename is a plain form value, not an upload.
async fn from_multipart(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> Result<Option<ImageSource>, WebError> {
    let mut multipart = Multipart::new(req.headers(), payload);

    while let Some(field) = multipart.next().await {
        let field = field.map_err(|e| anyhow!("malformed multipart body: {e}"))?;

        let disposition = field.content_disposition();
        if disposition.get_name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = match disposition.get_filename() {
            Some(filename) if !filename.is_empty() => filename.to_owned(),
            _ => continue,
        };

        let bytes = read_limited(field, limit).await?;
        return Ok(Some(ImageSource::FileUpload { bytes, filename }));
    }

    Ok(None)
}

/// Largest JSON body accepted for an image of `limit` bytes: its base64
/// encoding, escaped line breaks every 76 columns, and the envelope
pub fn json_body_limit(limit: usize) -> usize {
    limit
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(limit / 16)
        .saturating_add(JSON_ENVELOPE_BYTES)
}

/// A JSON body without an `image` key carries no image. Unparseable JSON, or
/// an `image` that is not a string, is a processing failure.
async fn from_json(payload: web::Payload, limit: usize) -> Result<Option<ImageSource>, WebError> {
    let body = read_limited(payload, json_body_limit(limit))
        .await
        .map_err(|e| match e {
            WebError::PayloadTooLarge { .. } => WebError::PayloadTooLarge { limit },
            e => e,
        })?;
    let value: Value = serde_json::from_slice(&body).context("malformed JSON body")?;

    match value.get(IMAGE_FIELD) {
        None => Ok(None),
        Some(Value::String(image)) => Ok(Some(ImageSource::Base64Payload(image.clone()))),
        Some(other) => Err(anyhow!("`{IMAGE_FIELD}` must be a string, got {other}").into()),
    }
}

/// Collect a body stream, failing once it grows past `limit` bytes
pub async fn read_limited<S, E>(stream: S, limit: usize) -> Result<Vec<u8>, WebError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| anyhow!("failed to read request body: {e}"))?;
        if body.len() + chunk.len() > limit {
            return Err(WebError::PayloadTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
