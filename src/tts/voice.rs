use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Contents of a Piper `<voice>.onnx.json` file. Only the fields the
/// synthesizer uses are read; everything else is ignored.
#[derive(Debug, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    /// Absent for voices that expect pre-phonemized input; those fall back
    /// to `en-us`.
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    /// Older exports omit the block entirely; missing scales take Piper's defaults.
    #[serde(default)]
    pub inference: InferenceConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

/// VITS sampling scales fed to the model's `scales` input.
#[derive(Debug, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

impl VoiceConfig {
    /// espeak-ng voice used for phonemization.
    pub fn espeak_voice(&self) -> &str {
        self.espeak
            .as_ref()
            .map(|e| e.voice.as_str())
            .unwrap_or("en-us")
    }
}

#[derive(Debug)]
pub struct Voice {
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    /// Loads the voice at `model_path`, reading its config from the sibling
    /// `<model_path>.json` file.
    pub fn load(model_path: &Path) -> Result<Self, AppError> {
        let config_path = config_path_for(model_path);

        if !model_path.is_file() {
            return Err(AppError::ModelNotFound(model_path.to_path_buf()));
        }

        if !config_path.is_file() {
            return Err(AppError::ModelNotFound(config_path));
        }

        let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)
            .map_err(|e| {
                AppError::ModelLoad(format!("{}: {}", config_path.display(), e))
            })?;

        if config.audio.sample_rate == 0 {
            return Err(AppError::ModelLoad(format!(
                "{}: sample_rate must be positive",
                config_path.display()
            )));
        }

        Ok(Self {
            config,
            model_path: model_path.to_path_buf(),
        })
    }
}

pub fn config_path_for(model_path: &Path) -> PathBuf {
    let mut path = model_path.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}
