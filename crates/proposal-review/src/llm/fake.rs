//! Scripted gateway for tests and offline runs.
//!
//! Replies are chosen in this order: the next queued reply, the first
//! registered substring that the prompt contains (case-insensitive),
//! then the default reply.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationConfig, GenerationError, LlmGateway};

type Reply = Result<String, GenerationError>;

#[derive(Debug)]
pub struct FakeGateway {
    queued: Mutex<VecDeque<Reply>>,
    responses: Mutex<Vec<(String, Reply)>>,
    default_reply: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            responses: Mutex::new(Vec::new()),
            default_reply: Some("_No analysis available from the offline provider._".to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGateway {
    /// A gateway with no replies configured. Unmatched prompts fail.
    pub fn new() -> Self {
        Self {
            default_reply: None,
            ..Self::default()
        }
    }

    pub fn with_response(prompt_contains: &str, response: &str) -> Self {
        let gateway = Self::new();
        gateway.add_response(prompt_contains, response);
        gateway
    }

    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_reply = Some(response.to_string());
        self
    }

    /// Sleeps before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_response(&self, prompt_contains: &str, response: &str) {
        lock(&self.responses).push((prompt_contains.to_lowercase(), Ok(response.to_string())));
    }

    pub fn add_failure(&self, prompt_contains: &str, error: GenerationError) {
        lock(&self.responses).push((prompt_contains.to_lowercase(), Err(error)));
    }

    /// Queues a one-shot reply served before any substring match.
    pub fn push_reply(&self, response: &str) {
        lock(&self.queued).push_back(Ok(response.to_string()));
    }

    pub fn push_failure(&self, error: GenerationError) {
        lock(&self.queued).push_back(Err(error));
    }

    /// Prompts received so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        if let Some(reply) = lock(&self.queued).pop_front() {
            return reply;
        }

        let prompt_lower = prompt.to_lowercase();
        let responses = lock(&self.responses);
        if let Some((_, reply)) = responses
            .iter()
            .find(|(pattern, _)| prompt_lower.contains(pattern.as_str()))
        {
            return reply.clone();
        }

        match &self.default_reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(GenerationError::RemoteFailure(format!(
                "FakeGateway: no response configured for prompt starting with: {}",
                prompt.chars().take(100).collect::<String>()
            ))),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LlmGateway for FakeGateway {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        lock(&self.calls).push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.reply_for(prompt)
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
