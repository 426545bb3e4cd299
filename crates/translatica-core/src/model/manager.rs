//! Lifecycle of the process-wide translation model.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::backend::{
    ArtifactLoader, EncodeLimits, GenerationLimits, MarianLoader, TranslationBackend,
};
use crate::config::TranslatorConfig;
use crate::device::{DeviceProfile, DeviceSelector};
use crate::error::{Error, Result};
use crate::generation::CancellationFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Unloaded,
    Loading,
    Loaded,
}

impl ResourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ResourceState::Loading,
            2 => ResourceState::Loaded,
            _ => ResourceState::Unloaded,
        }
    }
}

/// Owns the single tokenizer + model instance shared by all requests.
///
/// `load` and `unload` are serialized by a transition lock. Each inference
/// worker owns a read guard on the loaded backend until it returns, so
/// `unload` waits for in-flight generation before releasing anything, even
/// when the caller already gave up on it.
pub struct ResourceManager {
    config: TranslatorConfig,
    loader: Arc<dyn ArtifactLoader>,
    device: OnceLock<DeviceProfile>,
    backend: Arc<RwLock<Option<Arc<dyn TranslationBackend>>>>,
    transition: Mutex<()>,
    state: AtomicU8,
}

impl ResourceManager {
    /// Create a manager backed by the candle Marian loader. Nothing is loaded yet.
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        Self::with_loader(config, Arc::new(MarianLoader))
    }

    pub fn with_loader(config: TranslatorConfig, loader: Arc<dyn ArtifactLoader>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loader,
            device: OnceLock::new(),
            backend: Arc::new(RwLock::new(None)),
            transition: Mutex::new(()),
            state: AtomicU8::new(ResourceState::Unloaded as u8),
        })
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.config.artifact_dir
    }

    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ResourceState::Loaded
    }

    fn set_state(&self, state: ResourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Resolved compute device. Detection runs once; later calls reuse it.
    pub fn device(&self) -> Result<DeviceProfile> {
        if let Some(profile) = self.device.get() {
            return Ok(profile.clone());
        }
        let resolved = DeviceSelector::resolve(self.config.device)?;
        Ok(self.device.get_or_init(|| resolved).clone())
    }

    /// Load tokenizer and model. A no-op when already loaded.
    pub async fn load(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.is_loaded() {
            info!("Model already loaded.");
            return Ok(());
        }

        self.set_state(ResourceState::Loading);
        let started = Instant::now();
        match self.acquire().await {
            Ok(backend) => {
                *self.backend.write().await = Some(backend);
                self.set_state(ResourceState::Loaded);
                info!(
                    "Model loaded successfully from {:?} in {:.2}s",
                    self.config.artifact_dir,
                    started.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(ResourceState::Unloaded);
                error!("Failed to load model from {:?}: {}", self.config.artifact_dir, err);
                Err(err)
            }
        }
    }

    async fn acquire(&self) -> Result<Arc<dyn TranslationBackend>> {
        let device = self.device()?;
        info!(
            "Loading model from {:?} on {}",
            self.config.artifact_dir, device.kind
        );

        let loader = self.loader.clone();
        let artifact_dir = self.config.artifact_dir.clone();
        tokio::task::spawn_blocking(move || loader.load(&artifact_dir, &device))
            .await
            .map_err(|e| Error::ModelLoadError(e.to_string()))?
    }

    /// Drop tokenizer and model and release device memory. Safe to call repeatedly.
    pub async fn unload(&self) {
        let _transition = self.transition.lock().await;
        let backend = self.backend.write().await.take();
        self.set_state(ResourceState::Unloaded);

        match backend {
            Some(backend) => {
                // release may block on the model's forward-pass lock
                let released = tokio::task::spawn_blocking(move || backend.release()).await;
                if let Err(e) = released {
                    warn!("Releasing model resources failed: {}", e);
                }
                info!("Model resources cleaned up.");
            }
            None => debug!("Unload requested but no model is loaded"),
        }
    }

    /// Translate already-validated text.
    pub async fn infer(&self, text: &str) -> Result<String> {
        self.infer_with_timeout(text, None).await
    }

    /// Translate with an optional deadline. On expiry generation is told to
    /// stop at its next decoding step and `Timeout` is returned.
    pub async fn infer_with_timeout(&self, text: &str, timeout: Option<Duration>) -> Result<String> {
        if self.config.load_on_demand && !self.is_loaded() {
            self.load().await?;
        }

        let guard = self.backend.clone().read_owned().await;
        if guard.is_none() {
            return Err(Error::NotLoaded);
        }

        let encode_limits = EncodeLimits::from(&self.config);
        let generation_limits = GenerationLimits::from(&self.config);
        let cancel = CancelOnDrop(CancellationFlag::new());
        let worker_cancel = cancel.0.clone();
        let input = text.to_string();
        let started = Instant::now();

        // The guard moves into the worker so `unload` waits for it to finish.
        let handle = tokio::task::spawn_blocking(move || match guard.as_ref() {
            Some(backend) => run_inference(
                backend.as_ref(),
                &input,
                &encode_limits,
                &generation_limits,
                &worker_cancel,
            ),
            None => Err(Error::NotLoaded),
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Translation exceeded {:?}, cancelling generation", limit);
                    return Err(Error::Timeout(limit.as_millis() as u64));
                }
            },
            None => handle.await,
        };

        let output =
            joined.map_err(|e| Error::InferenceError(format!("Inference worker failed: {}", e)))??;
        debug!(
            "Inference finished in {:.1} ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }
}

/// Cancels generation when the awaiting side goes away, whether it timed out
/// or its request was dropped.
struct CancelOnDrop(CancellationFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn run_inference(
    backend: &dyn TranslationBackend,
    text: &str,
    encode_limits: &EncodeLimits,
    generation_limits: &GenerationLimits,
    cancel: &CancellationFlag,
) -> Result<String> {
    let input_ids = backend.encode(text, encode_limits)?;
    let output_ids = backend.generate(&input_ids, generation_limits, cancel)?;
    backend.decode(&output_ids)
}
