//! Service configuration. Every value has a default, so the service starts
//! with no configuration at all; a `rembg.toml` in the working directory, an
//! explicit file, and `REMBG_`-prefixed environment variables override them
//! in that order (`REMBG_SERVER__PORT=6000`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name reported by the status endpoints
pub const SERVICE_NAME: &str = "rembg-background-removal";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "rembg";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "REMBG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on an uploaded file or a JSON body, in bytes
    pub max_payload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".into(),
            port: 5001,
            max_payload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    /// CUDA when available, CPU otherwise
    #[default]
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// TorchScript export of a U2-Net style matting model
    pub path: PathBuf,
    /// Side of the square input the model was traced with
    pub input_size: u32,
    pub device: DeviceKind,
    /// Number of model replicas, i.e. the inference concurrency bound
    pub workers: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            path: PathBuf::from("models/u2net.pt"),
            input_size: 320,
            device: DeviceKind::Auto,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            filter: "info".into(),
        }
    }
}

impl Settings {
    /// Load settings from the default file, `path` if given, and the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
