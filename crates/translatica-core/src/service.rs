//! Request-facing translation service.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{Error, Result};
use crate::model::ResourceManager;

/// Validates caller input and forwards it to the [`ResourceManager`].
///
/// Manager errors pass through untouched so the caller can tell an
/// unloaded model apart from a failed generation.
#[derive(Clone)]
pub struct TranslationService {
    manager: Arc<ResourceManager>,
    timeout: Option<Duration>,
}

impl TranslationService {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self {
            manager,
            timeout: None,
        }
    }

    /// Abort translations that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    /// Trim the input, rejecting missing and blank text.
    pub fn validate(text: Option<&str>) -> Result<String> {
        let text = text.ok_or_else(|| Error::InvalidInput("Text cannot be None".to_string()))?;
        let cleaned = text.trim();
        if cleaned.is_empty() {
            return Err(Error::InvalidInput("Text cannot be empty".to_string()));
        }
        Ok(cleaned.to_string())
    }

    /// Translate English text to Spanish.
    pub async fn translate(&self, text: Option<&str>) -> Result<String> {
        let cleaned = Self::validate(text)?;
        info!("Translating text of length {}", cleaned.chars().count());

        let translation = self
            .manager
            .infer_with_timeout(&cleaned, self.timeout)
            .await?;

        info!(
            "Translation completed, output length {}",
            translation.chars().count()
        );
        Ok(translation)
    }
}
