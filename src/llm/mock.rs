//! Scripted completer for tests.

use super::Completer;
use crate::error::CompletionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Script = dyn Fn(&str) -> (Duration, Result<String, CompletionError>) + Send + Sync;

/// A completer whose latency and result are computed from the prompt.
pub struct MockCompleter {
    script: Box<Script>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    systems: Mutex<Vec<Option<String>>>,
}

impl MockCompleter {
    pub fn new(
        script: impl Fn(&str) -> (Duration, Result<String, CompletionError>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt with the prompt itself.
    pub fn echo() -> Self {
        Self::new(|prompt| (Duration::ZERO, Ok(prompt.to_string())))
    }

    /// Answers every prompt with the same text.
    pub fn with_text(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| (Duration::ZERO, Ok(text.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn systems(&self) -> Vec<Option<String>> {
        self.systems.lock().unwrap().clone()
    }
}

/// Decrements the in-flight counter even when the call is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(
        &self,
        cancel: &CancellationToken,
        system: Option<&str>,
        prompt: &str,
        _max_tokens: u32,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.systems
            .lock()
            .unwrap()
            .push(system.map(str::to_string));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let (latency, result) = (self.script)(prompt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            _ = tokio::time::sleep(latency) => result,
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
