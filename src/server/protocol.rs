use crate::payload::B64Image;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// Body of `POST /analyze-receipt`. The body is parsed loosely so that a
/// missing image can be told apart from one of the wrong type.
#[derive(Debug)]
pub struct AnalyzeRequest {
    pub image: Option<Value>,
}

impl AnalyzeRequest {
    /// Parse a raw request body. An empty body, `null`, a non-object and an
    /// object without `image` are all a missing image.
    pub fn parse(body: &[u8]) -> super::Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::MissingImage);
        }
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(map) => Ok(AnalyzeRequest {
                image: map.get("image").cloned(),
            }),
            _ => Err(ApiError::MissingImage),
        }
    }

    pub fn into_image(self) -> super::Result<B64Image> {
        match self.image {
            None => Err(ApiError::MissingImage),
            Some(Value::String(image)) => Ok(image.into()),
            Some(_) => Err(ApiError::InvalidImageField),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub extracted_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
