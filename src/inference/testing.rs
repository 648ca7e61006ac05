//! Scripted engine for unit tests
//!
//! Records every engine call in order and replays a configured completion.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::inference::engine::{
    ChatCompletion, ChatCompletionChunk, CompletionRequest, CompletionResponse, EngineError,
    EngineHandle, InferenceEngine, InitProgressReport, LoadOptions,
};
use crate::inference::streaming;

#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these delta contents, then finish
    Deltas(Vec<String>),
    /// Stream these delta contents, then fail
    DeltasThenError(Vec<String>, EngineError),
    /// Stream these delta contents, then drop the sender without finishing
    DeltasThenDrop(Vec<String>),
    /// Single-shot reply
    Reply(Option<String>),
    /// The completion call itself fails
    Fail(EngineError),
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<String>>,
    missed: AtomicU32,
    fail_loads: AtomicBool,
}

impl Shared {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct ScriptedEngine {
    shared: Arc<Shared>,
    script: Arc<Mutex<Script>>,
    progress: Vec<String>,
    completion_delay: Duration,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            script: Arc::new(Mutex::new(script)),
            progress: Vec::new(),
            completion_delay: Duration::ZERO,
        }
    }

    /// Sleep before answering each completion, leaving the request in flight
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    pub fn with_progress(mut self, stages: &[&str]) -> Self {
        self.progress = stages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn fail_loads(&self, fail: bool) {
        self.shared.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn set_missed_heartbeats(&self, missed: u32) {
        self.shared.missed.store(missed, Ordering::Relaxed);
    }

    /// Calls in the order they happened: `load:<id>`, `completion:<stream>`, `interrupt`
    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn load_count(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("load:")).count()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(
        &self,
        model_id: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        self.shared.record(format!("load:{model_id}"));
        for (i, text) in self.progress.iter().enumerate() {
            options.report(&InitProgressReport {
                progress: (i + 1) as f32 / self.progress.len() as f32,
                time_elapsed: 0.0,
                text: text.clone(),
            });
        }

        if self.shared.fail_loads.load(Ordering::Relaxed) {
            return Err(EngineError::ModelLoad(format!("cannot fetch {model_id}")));
        }

        Ok(Arc::new(ScriptedHandle {
            model_id: model_id.to_string(),
            shared: self.shared.clone(),
            script: self.script.clone(),
            completion_delay: self.completion_delay,
        }))
    }
}

enum End {
    Finish,
    Fail(EngineError),
    Drop,
}

struct ScriptedHandle {
    model_id: String,
    shared: Arc<Shared>,
    script: Arc<Mutex<Script>>,
    completion_delay: Duration,
}

#[async_trait]
impl EngineHandle for ScriptedHandle {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn missed_heartbeats(&self) -> u32 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, EngineError> {
        self.shared.record(format!("completion:{}", request.stream));
        if !self.completion_delay.is_zero() {
            tokio::time::sleep(self.completion_delay).await;
        }
        let script = self.script.lock().unwrap().clone();

        let (deltas, end) = match script {
            Script::Fail(error) => return Err(error),
            Script::Reply(content) => {
                return Ok(CompletionResponse::Single(ChatCompletion::from_reply(
                    self.model_id.clone(),
                    content,
                )));
            }
            Script::Deltas(deltas) => (deltas, End::Finish),
            Script::DeltasThenError(deltas, error) => (deltas, End::Fail(error)),
            Script::DeltasThenDrop(deltas) => (deltas, End::Drop),
        };

        let (tx, stream) = streaming::channel(deltas.len() + 1);
        for delta in deltas {
            tx.send(ChatCompletionChunk::from_content(self.model_id.as_str(), delta))
                .await?;
        }
        match end {
            End::Finish => tx.finish().await,
            End::Fail(error) => tx.fail(error).await,
            End::Drop => drop(tx),
        }
        Ok(CompletionResponse::Stream(stream))
    }

    async fn interrupt(&self) {
        self.shared.record("interrupt".to_string());
    }
}
