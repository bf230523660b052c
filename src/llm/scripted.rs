use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BackendError, CompletionBackend, CompletionRequest, Stage};

/// A canned reply for one call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Completion(String),
    Empty,
    Timeout,
}

/// A backend that replays queued completions per stage.
///
/// Each stage has its own queue, so a test can script the overview call and
/// the detail call independently. Every request is recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<Stage, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a completion for a stage.
    pub fn with_reply(self, stage: Stage, completion: impl Into<String>) -> Self {
        self.push(stage, ScriptedReply::Completion(completion.into()));
        self
    }

    /// Queue a failure (or any other reply) for a stage.
    pub fn with(self, stage: Stage, reply: ScriptedReply) -> Self {
        self.push(stage, reply);
        self
    }

    pub fn push(&self, stage: Stage, reply: ScriptedReply) {
        self.replies
            .lock()
            .expect("scripted backend lock poisoned")
            .entry(stage)
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("scripted backend lock poisoned")
            .clone()
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.requests
            .lock()
            .expect("scripted backend lock poisoned")
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.requests
            .lock()
            .expect("scripted backend lock poisoned")
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .expect("scripted backend lock poisoned")
            .get_mut(&request.stage)
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(ScriptedReply::Completion(text)) => Ok(text),
            Some(ScriptedReply::Empty) => Err(BackendError::EmptyCompletion),
            Some(ScriptedReply::Timeout) => {
                Err(BackendError::Timeout(std::time::Duration::from_secs(0)))
            }
            None => Err(BackendError::Exhausted(request.stage)),
        }
    }
}
