//! Service configuration. Settings are layered: built-in defaults, then an
//! optional `receipt-ocr.toml` in the working directory, then environment
//! variables prefixed with `RECEIPT_OCR_`, and finally `PORT`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use std::env;

/// Name of the optional settings file (any extension `config` understands)
pub const CONFIG_FILE: &str = "receipt-ocr";

/// Prefix for environment overrides, e.g. `RECEIPT_OCR_MODEL`
pub const ENV_PREFIX: &str = "RECEIPT_OCR";

/// Environment variable that overrides the bound port
pub const PORT_VAR: &str = "PORT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Path to the exported TorchScript image-to-text model
pub const DEFAULT_MODEL: &str = "models/donut-base.pt";

/// Donut's encoder input resolution
pub const DEFAULT_IMAGE_WIDTH: u32 = 1920;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 2560;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// TorchScript model file
    pub model: String,

    /// Width the image is resized to before inference
    pub image_width: u32,

    /// Height the image is resized to before inference
    pub image_height: u32,

    /// `cpu`, `cuda` or `cuda:<n>`
    pub device: String,

    /// Number of HTTP worker threads. Defaults to one per core.
    pub workers: Option<usize>,

    /// Maximum request body size in bytes. Unlimited when unset.
    pub body_limit: Option<usize>,
}

impl Settings {
    /// Load settings from `receipt-ocr.toml` and the process environment
    pub fn load() -> Result<Self> {
        Self::build(Some(CONFIG_FILE), None)
    }

    /// Load settings from the settings `file`, if any, reading environment
    /// variables from `vars` instead of the process environment when given
    pub fn build(file: Option<&str>, vars: Option<Map<String, String>>) -> Result<Self> {
        let port = match &vars {
            Some(vars) => vars.get(PORT_VAR).cloned(),
            None => env::var(PORT_VAR).ok(),
        };

        let mut builder = Config::builder()
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", DEFAULT_PORT as i64)?
            .set_default("model", DEFAULT_MODEL)?
            .set_default("image_width", DEFAULT_IMAGE_WIDTH as i64)?
            .set_default("image_height", DEFAULT_IMAGE_HEIGHT as i64)?
            .set_default("device", "cpu")?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
            .set_override_option("port", port)?
            .build()?
            .try_deserialize()
            .context("invalid service configuration")
    }

    /// The `host:port` pair the server binds to
    pub fn addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit.unwrap_or(usize::MAX)
    }
}
