use super::LlmClient;
use crate::errors::ProviderError;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ProviderError),
}

enum Mode {
    /// Replies in order; the last one repeats.
    Script(Vec<Reply>),
    /// Answers with the mapped SQL for the question found at the end of the prompt.
    Oracle(HashMap<String, String>),
}

/// Offline client for dry runs and tests.
pub struct FakeClient {
    model: String,
    mode: Mode,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn scripted(replies: Vec<Reply>) -> Self {
        Self::new(Mode::Script(replies))
    }

    pub fn always(text: &str) -> Self {
        Self::scripted(vec![Reply::Text(text.to_string())])
    }

    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(texts.into_iter().map(|t| Reply::Text(t.into())).collect())
    }

    pub fn oracle(answers: HashMap<String, String>) -> Self {
        Self::new(Mode::Oracle(answers))
    }

    fn new(mode: Mode) -> Self {
        Self {
            model: "fake".to_string(),
            mode,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// The text after the final `Question:` marker, up to the end of that line.
pub fn last_question(prompt: &str) -> Option<&str> {
    let start = prompt.rfind("Question:")? + "Question:".len();
    let rest = &prompt[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }

        let text = match &self.mode {
            Mode::Script(replies) => {
                let reply = replies
                    .get(n)
                    .or_else(|| replies.last())
                    .ok_or_else(|| anyhow::anyhow!("fake client has no scripted replies"))?;
                match reply {
                    Reply::Text(t) => t.clone(),
                    Reply::Fail(e) => return Err(e.clone().into()),
                }
            }
            Mode::Oracle(answers) => last_question(prompt)
                .and_then(|q| answers.get(q))
                .cloned()
                .unwrap_or_else(|| "SELECT 1".to_string()),
        };

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            cached: false,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
