//! Narrow capability interface over the translation model library.
//!
//! The resource manager only ever talks to a [`TranslationBackend`] produced by
//! an [`ArtifactLoader`]. The candle Marian implementation lives in [`marian`];
//! tests substitute deterministic stubs.

pub mod marian;

use std::path::Path;
use std::sync::Arc;

use crate::config::TranslatorConfig;
use crate::device::DeviceProfile;
use crate::error::Result;
use crate::generation::CancellationFlag;

pub use marian::{MarianBackend, MarianLoader};

/// Limits applied when turning text into source token ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeLimits {
    /// Maximum number of source tokens, EOS included.
    pub max_input_length: usize,
}

/// Limits applied to generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationLimits {
    /// Maximum decoder length, start token included.
    pub max_output_length: usize,
    pub beam_width: usize,
    pub length_penalty: f32,
}

impl From<&TranslatorConfig> for EncodeLimits {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            max_input_length: config.max_input_length,
        }
    }
}

impl From<&TranslatorConfig> for GenerationLimits {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            max_output_length: config.max_output_length,
            beam_width: config.beam_width,
            length_penalty: config.length_penalty,
        }
    }
}

/// A loaded tokenizer + model pair bound to a device.
///
/// Implementations must be safe to call from several threads at once; they
/// may serialize forward passes internally.
pub trait TranslationBackend: Send + Sync {
    fn encode(&self, text: &str, limits: &EncodeLimits) -> Result<Vec<u32>>;

    /// Generate target token ids for already-encoded source ids.
    fn generate(
        &self,
        input_ids: &[u32],
        limits: &GenerationLimits,
        cancel: &CancellationFlag,
    ) -> Result<Vec<u32>>;

    /// Decode target ids, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Release device-side memory held outside of reference counting.
    fn release(&self) {}
}

/// Acquires backend artifacts from storage.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, artifact_dir: &Path, device: &DeviceProfile)
        -> Result<Arc<dyn TranslationBackend>>;
}
