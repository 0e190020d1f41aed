//! HTTP routes: the liveness check and receipt analysis

use super::protocol::{AnalyzeRequest, AnalyzeResponse, HealthResponse};
use super::{ApiError, Model, Result};
use crate::inference::ImageToText;
use actix_web::{get, post, web, Responder};
use tracing::{error, info};

/// Liveness check. Never touches the model.
#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(HealthResponse {
        status: "ok".into(),
    })
}

/// Extract the text of a base 64 receipt image
#[post("/analyze-receipt")]
pub async fn analyze_receipt(
    body: web::Bytes,
    model: web::Data<dyn ImageToText>,
) -> Result<impl Responder> {
    match analyze(&body, model.into_inner()).await {
        Ok(extracted_text) => {
            info!("finished serving inference request");
            Ok(web::Json(AnalyzeResponse {
                success: true,
                extracted_text,
            }))
        }
        Err(ApiError::MissingImage) => Err(ApiError::MissingImage),
        Err(err) => {
            error!("Error analyzing receipt: {err}");
            Err(err)
        }
    }
}

async fn analyze(body: &[u8], model: Model) -> Result<String> {
    let image = AnalyzeRequest::parse(body)?.into_image()?;

    // Decoding and inference are CPU bound
    let inference = web::block(move || -> Result<_> {
        let image = image.decode()?;
        Ok(model.generate(&image)?)
    })
    .await??;

    Ok(inference.extracted_text())
}
