use actix_web::{middleware, App, HttpServer};
use anyhow::Result;
use receipt_ocr::config::Settings;
use receipt_ocr::inference::{parse_device, TorchModel};
use receipt_ocr::server::{self, Model};
use receipt_ocr::util::init_tracing;
use std::sync::Arc;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load()?;

    // Load the model before accepting any traffic
    let device = parse_device(&settings.device)?;
    let model: Model = Arc::new(TorchModel::new(
        &settings.model,
        device,
        settings.image_width,
        settings.image_height,
    )?);

    let body_limit = settings.body_limit();
    let mut http = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(server::configure(model.clone(), body_limit))
    });
    if let Some(workers) = settings.workers {
        http = http.workers(workers);
    }

    let (host, port) = settings.addr();
    info!("listening on {host}:{port}");

    // Start the HTTP server
    http.bind((host, port))?.run().await?;
    Ok(())
}
