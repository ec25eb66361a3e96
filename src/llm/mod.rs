//! Completion backends.
//!
//! Everything that talks to a language model goes through the [`Completer`]
//! trait, so the dispatcher and the boundaries can be exercised against a
//! scripted backend in tests.

pub mod openai;

#[cfg(test)]
pub mod mock;

use crate::config::CompletionConfig;
use crate::error::{CompletionError, ConfigError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A single "send prompt, get text" capability.
///
/// Implementations must honor `cancel`: once it fires, an in-flight call
/// should resolve promptly with [`CompletionError::Cancelled`].
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;
}

/// Build the production completer from configuration.
///
/// `model` overrides the configured model (the terminal uses a smaller one).
pub fn create_completer(
    config: &CompletionConfig,
    api_key: String,
    model: Option<&str>,
) -> Result<Arc<dyn Completer>, ConfigError> {
    let model = model.unwrap_or(&config.model).to_string();
    let completer = openai::OpenAiCompleter::new(
        config.base_url.clone(),
        model,
        api_key,
        config.timeout(),
    )?;
    Ok(Arc::new(completer))
}
