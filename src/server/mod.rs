//! The user-facing JSON web server. Every failure in the analyze path is
//! reported as a 500 with its message; only a missing image is a 400.

use crate::inference::ImageToText;
use crate::payload::PayloadError;
use actix_cors::Cors;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use thiserror::Error;

pub mod protocol;
pub mod routes;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Message returned when the request carries no image
pub const NO_IMAGE: &str = "No image provided";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", NO_IMAGE)]
    MissingImage,

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image must be a base64 string")]
    InvalidImageField,

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Inference(#[from] anyhow::Error),

    #[error("inference task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl actix_web::error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(protocol::ErrorResponse {
                error: self.to_string(),
            })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingImage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Shared, read-only handle to the loaded model
pub type Model = Arc<dyn ImageToText>;

/// Register the routes, CORS policy and body limit on an `App`
pub fn configure(model: Model, body_limit: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::from(model))
            .app_data(web::PayloadConfig::new(body_limit))
            .service(
                web::scope("")
                    .wrap(Cors::permissive())
                    .service(routes::health)
                    .service(routes::analyze_receipt),
            );
    }
}
