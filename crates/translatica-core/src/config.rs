//! Configuration types for the translation core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Where inference should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Prefer an accelerator when one is available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    /// CUDA or Metal, whichever this build and host provide.
    #[serde(alias = "cuda", alias = "metal", alias = "mps", alias = "gpu")]
    Accelerator,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Accelerator => "accelerator",
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevicePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "accelerator" | "cuda" | "metal" | "mps" | "gpu" => Ok(DevicePreference::Accelerator),
            other => Err(Error::ConfigError(format!(
                "Unknown device '{other}', expected auto, cpu or accelerator"
            ))),
        }
    }
}

/// Translator configuration, fixed for the lifetime of the process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Directory holding config.json, model.safetensors and tokenizer files
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Source tokens beyond this length are truncated
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Upper bound on the generated sequence length
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,

    /// Number of hypotheses kept during beam search
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,

    /// Exponent applied to hypothesis length when ranking finished beams
    #[serde(default = "default_length_penalty")]
    pub length_penalty: f32,

    #[serde(default)]
    pub device: DevicePreference,

    /// Load the model on the first inference call instead of failing with `NotLoaded`
    #[serde(default)]
    pub load_on_demand: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            max_input_length: default_max_input_length(),
            max_output_length: default_max_output_length(),
            beam_width: default_beam_width(),
            length_penalty: default_length_penalty(),
            device: DevicePreference::default(),
            load_on_demand: false,
        }
    }
}

impl TranslatorConfig {
    /// Reject settings that would make generation meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_input_length < 2 {
            return Err(Error::ConfigError(
                "max_input_length must leave room for at least one token and EOS".to_string(),
            ));
        }
        if self.max_output_length < 2 {
            return Err(Error::ConfigError(
                "max_output_length must be at least 2".to_string(),
            ));
        }
        if self.beam_width == 0 {
            return Err(Error::ConfigError("beam_width must be at least 1".to_string()));
        }
        if !self.length_penalty.is_finite() {
            return Err(Error::ConfigError("length_penalty must be finite".to_string()));
        }
        Ok(())
    }
}

fn default_artifact_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("TRANSLATICA_MODEL_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("translatica")
        .join("models")
        .join("opus-mt-en-es")
}

fn default_max_input_length() -> usize {
    512
}

fn default_max_output_length() -> usize {
    256
}

fn default_beam_width() -> usize {
    8
}

fn default_length_penalty() -> f32 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TranslatorConfig::default();
        assert_eq!(config.max_input_length, 512);
        assert_eq!(config.max_output_length, 256);
        assert_eq!(config.beam_width, 8);
        assert_eq!(config.device, DevicePreference::Auto);
        assert!(!config.load_on_demand);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TranslatorConfig =
            serde_json::from_str(r#"{"beam_width": 4, "device": "cuda"}"#).unwrap();
        assert_eq!(config.beam_width, 4);
        assert_eq!(config.device, DevicePreference::Accelerator);
        assert_eq!(config.max_output_length, 256);
    }

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("AUTO".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!(
            "metal".parse::<DevicePreference>().unwrap(),
            DevicePreference::Accelerator
        );
        assert!(matches!(
            "tpu".parse::<DevicePreference>(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_beam_width() {
        let config = TranslatorConfig {
            beam_width: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }
}
