//! The user-facing web server routes. `/remove-background` resolves the
//! request's image, runs it through the worker pool and answers with a PNG.

use super::input;
use super::protocol::{Endpoints, HealthResponse, ServiceInfo, WorkerInfo};
use super::WebError;
use crate::codec;
use crate::config::{ServerSettings, SERVICE_NAME};
use crate::manager::Manager;
use actix_web::http::header::{self, ContentType};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use anyhow::Context;
use image::GenericImageView;
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

/// Filename suggested to clients for the processed image
pub const OUTPUT_FILENAME: &str = "processed_image.png";

/// Register every route on an app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(root)
        .service(health)
        .service(remove_background)
        .service(workers);
}

#[get("/")]
pub async fn root() -> impl Responder {
    web::Json(ServiceInfo {
        status: "OK",
        service: SERVICE_NAME,
        message: "Rembg Background Removal Service is running!",
        endpoints: Endpoints {
            health: "/health",
            remove_background: "/remove-background",
        },
    })
}

#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(HealthResponse {
        status: "OK",
        service: SERVICE_NAME,
    })
}

/// HTTP request to remove the background of one image
#[post("/remove-background")]
pub async fn remove_background(
    req: HttpRequest,
    payload: web::Payload,
    manager: web::Data<Manager>,
    settings: web::Data<ServerSettings>,
) -> Result<HttpResponse> {
    process(&req, payload, &manager, settings.max_payload_bytes)
        .await
        .inspect_err(|e| match e {
            WebError::Processing(err) => error!("error in background removal: {err:?}"),
            _ => warn!("rejected background removal request: {e}"),
        })
}

async fn process(
    req: &HttpRequest,
    payload: web::Payload,
    manager: &Manager,
    limit: usize,
) -> Result<HttpResponse> {
    // Parse the input request
    let source = input::resolve(req, payload, limit).await?;
    let label = source.describe().to_owned();

    let image = codec::decode(&source.into_bytes()?)?;
    info!("processing {label}");
    let (width, height) = image.dimensions();
    info!(
        "image size: {width}x{height}, mode: {}",
        codec::color_mode(&image)
    );

    // Run the model on an idle worker
    let output = manager
        .remove_background(image)
        .await
        .context("inference failed")?;
    info!("background removed successfully");

    let png = codec::encode_png(&output)?;
    Ok(HttpResponse::Ok()
        .content_type(ContentType::png())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={OUTPUT_FILENAME}"),
        ))
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .body(png))
}

/// HTTP request to get the status of all workers
#[get("/workers")]
pub async fn workers(manager: web::Data<Manager>) -> impl Responder {
    let workers: Vec<WorkerInfo> = manager
        .all_status()
        .into_iter()
        .map(|(id, status)| WorkerInfo { id, status })
        .collect();

    web::Json(workers)
}
