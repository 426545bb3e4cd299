//! Translatica Core - English to Spanish translation on candle
//!
//! This crate owns the single shared translation model and the request-facing
//! service built on top of it.
//!
//! # Architecture
//!
//! - [`ResourceManager`] loads, serves and unloads the model on a resolved device
//! - [`TranslationService`] validates input and forwards it to the manager
//! - [`HistoryRecorder`] persists successful translations off the request path
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use translatica_core::{ResourceManager, TranslationService, TranslatorConfig};
//!
//! let manager = Arc::new(ResourceManager::new(TranslatorConfig::default())?);
//! manager.load().await?;
//!
//! let service = TranslationService::new(manager.clone());
//! let spanish = service.translate(Some("Hello world")).await?;
//! manager.unload().await;
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod generation;
pub mod history;
pub mod model;
pub mod service;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{ArtifactLoader, EncodeLimits, GenerationLimits, TranslationBackend};
pub use config::{DevicePreference, TranslatorConfig};
pub use device::{DeviceKind, DeviceProfile};
pub use error::{Error, Result};
pub use generation::CancellationFlag;
pub use history::{
    HistoryRecorder, HistoryStore, NewTranslation, SqliteHistoryStore, TranslationRecord,
};
pub use model::{ResourceManager, ResourceState};
pub use service::TranslationService;
