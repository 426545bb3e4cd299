//! Deterministic stand-ins for the model library used across unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{ArtifactLoader, EncodeLimits, GenerationLimits, TranslationBackend};
use crate::device::{DeviceKind, DeviceProfile};
use crate::error::{Error, Result};
use crate::generation::CancellationFlag;

/// Shared observations of everything the stub was asked to do.
#[derive(Default)]
pub struct StubCalls {
    pub loads: AtomicUsize,
    pub releases: AtomicUsize,
    pub generating: AtomicBool,
    pub released_while_generating: AtomicBool,
    pub cancelled_seen: AtomicUsize,
    pub encoded: Mutex<Vec<String>>,
    pub load_paths: Mutex<Vec<PathBuf>>,
    pub load_devices: Mutex<Vec<DeviceKind>>,
}

impl StubCalls {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn cancelled_seen(&self) -> usize {
        self.cancelled_seen.load(Ordering::SeqCst)
    }

    pub fn encoded(&self) -> Vec<String> {
        self.encoded.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct StubLoader {
    pub calls: Arc<StubCalls>,
    pub dictionary: HashMap<String, String>,
    pub load_delay: Duration,
    pub generate_delay: Duration,
    /// How long generation runs between cancellation checks.
    pub generate_step: Duration,
    pub fail_load: bool,
}

impl StubLoader {
    pub fn new() -> Self {
        let dictionary = [("Hello world", "Hola mundo"), ("Hi", "Hola")]
            .into_iter()
            .map(|(en, es)| (en.to_string(), es.to_string()))
            .collect();
        Self {
            calls: Arc::new(StubCalls::default()),
            dictionary,
            load_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
            generate_step: Duration::from_millis(5),
            fail_load: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    pub fn with_generate_step(mut self, step: Duration) -> Self {
        self.generate_step = step;
        self
    }
}

impl ArtifactLoader for StubLoader {
    fn load(
        &self,
        artifact_dir: &Path,
        device: &DeviceProfile,
    ) -> Result<Arc<dyn TranslationBackend>> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        self.calls
            .load_paths
            .lock()
            .unwrap()
            .push(artifact_dir.to_path_buf());
        self.calls.load_devices.lock().unwrap().push(device.kind);
        std::thread::sleep(self.load_delay);

        if self.fail_load {
            return Err(Error::ModelLoadError(format!(
                "Missing model.safetensors in {:?}",
                artifact_dir
            )));
        }

        Ok(Arc::new(StubBackend {
            calls: self.calls.clone(),
            dictionary: self.dictionary.clone(),
            generate_delay: self.generate_delay,
            generate_step: self.generate_step,
        }))
    }
}

/// Encodes text as UTF-8 bytes and "translates" by dictionary lookup.
pub struct StubBackend {
    calls: Arc<StubCalls>,
    dictionary: HashMap<String, String>,
    generate_delay: Duration,
    generate_step: Duration,
}

impl StubBackend {
    fn run_steps(&self, cancel: &CancellationFlag) -> Result<()> {
        let mut waited = Duration::ZERO;
        while waited < self.generate_delay {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let step = self.generate_step.min(self.generate_delay - waited);
            std::thread::sleep(step);
            waited += step;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

impl TranslationBackend for StubBackend {
    fn encode(&self, text: &str, limits: &EncodeLimits) -> Result<Vec<u32>> {
        self.calls.encoded.lock().unwrap().push(text.to_string());
        Ok(text
            .bytes()
            .take(limits.max_input_length)
            .map(u32::from)
            .collect())
    }

    fn generate(
        &self,
        input_ids: &[u32],
        limits: &GenerationLimits,
        cancel: &CancellationFlag,
    ) -> Result<Vec<u32>> {
        self.calls.generating.store(true, Ordering::SeqCst);
        let stepped = self.run_steps(cancel);
        self.calls.generating.store(false, Ordering::SeqCst);
        if let Err(err) = stepped {
            self.calls.cancelled_seen.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }

        let source: String = input_ids.iter().map(|&id| id as u8 as char).collect();
        Ok(self
            .dictionary
            .get(&source)
            .map(|target| {
                target
                    .bytes()
                    .take(limits.max_output_length)
                    .map(u32::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let bytes: Vec<u8> = ids.iter().map(|&id| id as u8).collect();
        String::from_utf8(bytes).map_err(|e| Error::TokenizationError(e.to_string()))
    }

    fn release(&self) {
        if self.calls.generating.load(Ordering::SeqCst) {
            self.calls
                .released_while_generating
                .store(true, Ordering::SeqCst);
        }
        self.calls.releases.fetch_add(1, Ordering::SeqCst);
    }
}
