//! Marian (OPUS-MT) encoder-decoder backend on candle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use candle_core::{DType, IndexOp, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::marian::{self, MTModel};
use tracing::{debug, info};

use super::{ArtifactLoader, EncodeLimits, GenerationLimits, TranslationBackend};
use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::generation::{beam_search, BeamSearchParams, CancellationFlag, StepScorer};
use crate::tokenizer::{SpecialTokens, TextTokenizer};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const SOURCE_TOKENIZER_FILES: [&str; 2] = ["source_tokenizer.json", "tokenizer.json"];
const TARGET_TOKENIZER_FILES: [&str; 2] = ["target_tokenizer.json", "tokenizer.json"];

/// Files making up a Marian checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarianArtifacts {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub source_tokenizer: PathBuf,
    pub target_tokenizer: PathBuf,
}

impl MarianArtifacts {
    pub fn locate(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::ModelLoadError(format!(
                "Artifact directory {:?} does not exist",
                dir
            )));
        }

        let required = |name: &str| {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(Error::ModelLoadError(format!("Missing {} in {:?}", name, dir)))
            }
        };
        let first_existing = |names: &[&str]| {
            names
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())
                .ok_or_else(|| {
                    Error::ModelLoadError(format!("No tokenizer ({}) in {:?}", names.join(" or "), dir))
                })
        };

        Ok(Self {
            config: required(CONFIG_FILE)?,
            weights: required(WEIGHTS_FILE)?,
            source_tokenizer: first_existing(&SOURCE_TOKENIZER_FILES[..])?,
            target_tokenizer: first_existing(&TARGET_TOKENIZER_FILES[..])?,
        })
    }
}

/// Loads [`MarianBackend`]s from a checkpoint directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarianLoader;

impl ArtifactLoader for MarianLoader {
    fn load(
        &self,
        artifact_dir: &Path,
        device: &DeviceProfile,
    ) -> Result<Arc<dyn TranslationBackend>> {
        Ok(Arc::new(MarianBackend::load(artifact_dir, device)?))
    }
}

pub struct MarianBackend {
    /// The decoder keeps its KV cache inside the model, so forward passes take the lock.
    model: Mutex<MTModel>,
    config: marian::Config,
    source: TextTokenizer,
    target: TextTokenizer,
    device: DeviceProfile,
}

impl MarianBackend {
    pub fn load(artifact_dir: &Path, device: &DeviceProfile) -> Result<Self> {
        let artifacts = MarianArtifacts::locate(artifact_dir)?;

        let config_str = std::fs::read_to_string(&artifacts.config)?;
        let config: marian::Config = serde_json::from_str(&config_str)
            .map_err(|e| Error::ModelLoadError(format!("Invalid {}: {}", CONFIG_FILE, e)))?;

        let special_tokens = SpecialTokens {
            eos_id: config.eos_token_id,
            pad_id: config.pad_token_id,
        };
        info!("Loading tokenizers from {:?}", artifacts.source_tokenizer);
        let source = TextTokenizer::from_file(&artifacts.source_tokenizer, special_tokens)?;
        let target = TextTokenizer::from_file(&artifacts.target_tokenizer, special_tokens)?;

        info!("Loading Marian weights from {:?} onto {}", artifacts.weights, device.kind);
        // SAFETY: the weights file is memory-mapped read-only and must not be
        // modified while the model is loaded.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[artifacts.weights.clone()], DType::F32, &device.device)
        }
        .map_err(|e| Error::ModelLoadError(format!("Failed to map weights: {}", e)))?;
        let model = MTModel::new(&config, vb)
            .map_err(|e| Error::ModelLoadError(format!("Failed to build Marian model: {}", e)))?;

        debug!(
            "Marian model ready: d_model={}, encoder_layers={}, decoder_layers={}",
            config.d_model, config.encoder_layers, config.decoder_layers
        );

        Ok(Self {
            model: Mutex::new(model),
            config,
            source,
            target,
            device: device.clone(),
        })
    }
}

impl TranslationBackend for MarianBackend {
    fn encode(&self, text: &str, limits: &EncodeLimits) -> Result<Vec<u32>> {
        self.source.encode(text, limits.max_input_length)
    }

    fn generate(
        &self,
        input_ids: &[u32],
        limits: &GenerationLimits,
        cancel: &CancellationFlag,
    ) -> Result<Vec<u32>> {
        if input_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::InferenceError("Model lock poisoned".to_string()))?;
        model.reset_kv_cache();

        let input = Tensor::new(input_ids, &self.device.device)?.unsqueeze(0)?;
        let encoder_xs = model.encoder().forward(&input, 0)?;

        let params = BeamSearchParams {
            beam_width: limits.beam_width,
            max_length: limits.max_output_length,
            start_token: self.config.decoder_start_token_id,
            eos_token: self.config.eos_token_id,
            length_penalty: limits.length_penalty,
            banned_tokens: vec![self.config.pad_token_id],
        };

        let mut scorer = MarianScorer {
            model: &mut *model,
            encoder_xs,
            expanded: None,
        };
        let result = beam_search(&mut scorer, &params, cancel);
        drop(scorer);
        model.reset_kv_cache();
        result
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.target.decode(ids)
    }

    fn release(&self) {
        if let Ok(mut model) = self.model.lock() {
            model.reset_kv_cache();
        }
        self.device.synchronize();
    }
}

/// Scores beams by re-running the decoder over each full prefix.
///
/// Beams are reordered every step, which the model's internal KV cache can't
/// follow, so the cache is cleared before each call.
struct MarianScorer<'a> {
    model: &'a mut MTModel,
    encoder_xs: Tensor,
    /// Encoder output repeated for the current number of beams.
    expanded: Option<(usize, Tensor)>,
}

impl MarianScorer<'_> {
    fn encoder_states(&mut self, batch: usize) -> Result<Tensor> {
        match &self.expanded {
            Some((cached, states)) if *cached == batch => Ok(states.clone()),
            _ => {
                let states = self.encoder_xs.repeat((batch, 1, 1))?;
                self.expanded = Some((batch, states.clone()));
                Ok(states)
            }
        }
    }
}

impl StepScorer for MarianScorer<'_> {
    fn next_log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let batch = prefixes.len();
        let seq_len = prefixes.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || seq_len == 0 {
            return Ok(Vec::new());
        }

        let flat: Vec<u32> = prefixes.iter().flatten().copied().collect();
        let input = Tensor::from_vec(flat, (batch, seq_len), self.encoder_xs.device())?;
        let encoder_states = self.encoder_states(batch)?;

        self.model.reset_kv_cache();
        let logits = self.model.decode(&input, &encoder_states, 0)?;
        let last = logits.i((.., seq_len - 1, ..))?.to_dtype(DType::F32)?;
        let log_probs = candle_nn::ops::log_softmax(&last, D::Minus1)?;
        Ok(log_probs.to_vec2::<f32>()?)
    }
}
