//! Scripted text generator for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;

use super::client::TextGenerator;

/// Replies from a queue; an empty queue is an error. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, u32)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn push(&self, reply: Result<String, String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.iter().map(|(s, _)| s.clone()).collect())
            .unwrap_or_default()
    }

    pub fn max_tokens(&self) -> Vec<u32> {
        self.prompts
            .lock()
            .map(|p| p.iter().map(|(_, t)| *t).collect())
            .unwrap_or_default()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn complete(&self, prompt: &str, _temperature: f32, max_tokens: u32) -> anyhow::Result<String> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push((prompt.to_string(), max_tokens));
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}
