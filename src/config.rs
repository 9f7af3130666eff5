use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL_PATH: &str = "models/fr_FR-siwis-medium.onnx";
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;

/// Server settings, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub max_text_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Unset variables
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Config(format!("PORT must be a number, got '{}'", raw)))?,
            None => defaults.port,
        };

        let model_path = lookup("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);

        let max_text_chars = match lookup("MAX_TEXT_CHARS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(AppError::Config(format!(
                        "MAX_TEXT_CHARS must be a positive number, got '{}'",
                        raw
                    )))
                }
            },
            None => defaults.max_text_chars,
        };

        Ok(Self {
            host,
            port,
            model_path,
            max_text_chars,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address {}:{}: {}", self.host, self.port, e)))
    }
}
