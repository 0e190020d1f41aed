//! Turning the base 64 text of a request into an in-memory image

use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use std::fmt::Debug;
use thiserror::Error;

/// Why a payload could not be turned into an image
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cannot identify image file: {0}")]
    Image(#[from] image::ImageError),
}

/// A base 64 image, optionally prefixed with a data URL marker such as
/// `data:image/png;base64,`
pub struct B64Image {
    pub image: String,
}

impl Debug for B64Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B64Image {{ image: <{} chars> }}", self.image.len())
    }
}

impl From<String> for B64Image {
    fn from(image: String) -> Self {
        B64Image { image }
    }
}

impl B64Image {
    /// Decode the payload into raw bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode_base64(strip_data_url(&self.image))
    }

    /// Decode the payload and parse it as an image
    pub fn decode(&self) -> Result<DynamicImage, PayloadError> {
        let bytes = self.to_bytes()?;
        Ok(load_image(&bytes)?)
    }
}

/// Drop everything up to and including the first comma. The prefix is not
/// checked.
pub fn strip_data_url(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Decode standard, padded base 64. ASCII whitespace is skipped so
/// line-wrapped payloads decode.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        general_purpose::STANDARD.decode(compact)
    } else {
        general_purpose::STANDARD.decode(data)
    }
}

/// Parse an encoded image, guessing its format from the content
pub fn load_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}
