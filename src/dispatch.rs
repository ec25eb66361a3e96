//! Concurrent fan-out/collect of question batches.
//!
//! [`Dispatcher::dispatch`] spawns one task per question, waits for every
//! task, and returns one [`Outcome`] per question in input order. A failing
//! question never affects its siblings, and `dispatch` itself cannot fail.

use crate::config::{DispatchConfig, QUESTION_PLACEHOLDER};
use crate::error::CompletionError;
use crate::llm::Completer;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Result for a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answer(String),
    Failure(CompletionError),
}

impl Outcome {
    pub fn is_answer(&self) -> bool {
        matches!(self, Outcome::Answer(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_answer()
    }
}

impl From<Result<String, CompletionError>> for Outcome {
    fn from(result: Result<String, CompletionError>) -> Self {
        match result {
            Ok(text) => Outcome::Answer(text),
            Err(e) => Outcome::Failure(e),
        }
    }
}

/// Fans a batch of questions out to a [`Completer`].
pub struct Dispatcher {
    completer: Arc<dyn Completer>,
    prompt_template: String,
    max_tokens: u32,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Create an unbounded dispatcher: every question in a batch is in flight
    /// at once.
    pub fn new(completer: Arc<dyn Completer>, prompt_template: String, max_tokens: u32) -> Self {
        Self {
            completer,
            prompt_template,
            max_tokens,
            limiter: None,
        }
    }

    pub fn from_config(
        completer: Arc<dyn Completer>,
        config: &DispatchConfig,
        max_tokens: u32,
    ) -> Self {
        let dispatcher = Self::new(completer, config.prompt_template.clone(), max_tokens);
        match config.max_concurrency {
            Some(limit) => dispatcher.with_max_concurrency(limit),
            None => dispatcher,
        }
    }

    /// Cap the number of simultaneous completion calls. The cap is shared by
    /// all batches running through this dispatcher.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn completer(&self) -> &Arc<dyn Completer> {
        &self.completer
    }

    /// Wrap a question in the prompt template.
    pub fn render_prompt(&self, question: &str) -> String {
        self.prompt_template.replace(QUESTION_PLACEHOLDER, question)
    }

    /// Answer every question concurrently.
    ///
    /// Returns exactly `questions.len()` outcomes, slot `i` belonging to
    /// `questions[i]`. Returns only after every question has resolved. Once
    /// `cancel` fires, questions still pending resolve to
    /// [`CompletionError::Cancelled`].
    pub async fn dispatch(&self, cancel: &CancellationToken, questions: &[String]) -> Vec<Outcome> {
        if questions.is_empty() {
            return Vec::new();
        }

        info!(count = questions.len(), "Processing questions concurrently");

        let handles: Vec<_> = questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                debug!(index, question = %preview(question), "Spawning question");
                tokio::spawn(answer_one(
                    index,
                    Arc::clone(&self.completer),
                    self.limiter.clone(),
                    cancel.clone(),
                    self.render_prompt(question),
                    self.max_tokens,
                ))
            })
            .collect();

        // Awaiting handles in spawn order keeps slot i bound to question i.
        let outcomes: Vec<Outcome> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| {
                joined.unwrap_or_else(|e| {
                    error!(index, error = %e, "Question task aborted");
                    Outcome::Failure(CompletionError::Internal(e.to_string()))
                })
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(total = outcomes.len(), failed, "All questions processed");
        outcomes
    }
}

async fn answer_one(
    index: usize,
    completer: Arc<dyn Completer>,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    prompt: String,
    max_tokens: u32,
) -> Outcome {
    let _permit = match acquire(limiter, &cancel).await {
        Ok(permit) => permit,
        Err(e) => {
            debug!(index, error = %e, "Question dropped before sending");
            return Outcome::Failure(e);
        }
    };

    info!(index, "Processing question");

    // The completer is expected to honor the token itself; racing it here
    // keeps the join bounded even if it does not.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CompletionError::Cancelled),
        result = completer.complete(&cancel, None, &prompt, max_tokens) => result,
    };

    match &result {
        Ok(answer) => info!(index, answer_len = answer.len(), "Question answered successfully"),
        Err(e) => info!(index, error = %e, "Error processing question"),
    }
    result.into()
}

async fn acquire(
    limiter: Option<Arc<Semaphore>>,
    cancel: &CancellationToken,
) -> Result<Option<OwnedSemaphorePermit>, CompletionError> {
    let Some(limiter) = limiter else {
        return Ok(None);
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CompletionError::Cancelled),
        permit = limiter.acquire_owned() => permit
            .map(Some)
            .map_err(|e| CompletionError::Internal(e.to_string())),
    }
}

/// Shorten text for log lines.
pub fn preview(text: &str) -> String {
    const MAX: usize = 60;
    if text.chars().count() > MAX {
        text.chars().take(MAX).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
