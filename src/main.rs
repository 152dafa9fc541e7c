use actix_web::{middleware, web, App, HttpServer};
use rembg_service::config::Settings;
use rembg_service::manager::Manager;
use rembg_service::server::{self, routes};
use rembg_service::torch::TorchLoader;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io, process};
use tracing::*;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./rembg-service [config file]";

fn get_args() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    args.get(1).map(PathBuf::from)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config_file = get_args();
    let settings = match Settings::load(config_file.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter)),
        )
        .init();

    info!("starting rembg background removal service");

    let loader = TorchLoader::new(settings.model.clone());
    let model_path = loader.path().display().to_string();
    let manager = web::Data::new(Manager::new(Arc::new(loader), settings.model.workers));

    // Load the model before taking traffic. Failure is not fatal: every
    // worker retries on its first request.
    let pool = manager.clone();
    match web::block(move || pool.warm_up()).await {
        Ok(Ok(())) => info!("model {model_path} ready on {} worker(s)", manager.size()),
        Ok(Err(e)) => warn!("could not load model {model_path}, retrying on first request: {e:#}"),
        Err(e) => warn!("model warm-up did not complete: {e}"),
    }

    let server_settings = web::Data::new(settings.server.clone());
    let (host, port) = settings.server.bind_address();
    info!("listening on {host}:{port}");

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(manager.clone())
            .app_data(server_settings.clone())
            .wrap(server::cors())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
