//! Loopback engine
//!
//! A weight-free [`InferenceEngine`] that answers by echoing the last user
//! message back one word at a time. It walks through the same load stages a
//! real engine reports, honours interrupts, and lets callers set the
//! missed-heartbeat counter, so UI and session code can run end to end
//! without model files.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::inference::engine::{
    ChatCompletion, ChatCompletionChunk, CompletionRequest, CompletionResponse, EngineError,
    EngineHandle, InferenceEngine, InitProgressReport, LoadOptions,
};
use crate::inference::streaming::{self, DeltaSender};
use crate::types::Role;

const LOAD_STAGES: u32 = 4;

pub struct LoopbackEngine {
    stage_delay: Duration,
    token_delay: Duration,
    stream_buffer: usize,
    missed_heartbeats: Arc<AtomicU32>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            stage_delay: Duration::from_millis(50),
            token_delay: Duration::from_millis(30),
            stream_buffer: 64,
            missed_heartbeats: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Delay between load stages and between streamed words
    pub fn with_delays(mut self, stage_delay: Duration, token_delay: Duration) -> Self {
        self.stage_delay = stage_delay;
        self.token_delay = token_delay;
        self
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    /// Simulate a stalled worker. Applies to every handle this engine loaded.
    pub fn set_missed_heartbeats(&self, missed: u32) {
        self.missed_heartbeats.store(missed, Ordering::Relaxed);
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for LoopbackEngine {
    async fn load(
        &self,
        model_id: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        if model_id.trim().is_empty() {
            return Err(EngineError::ModelLoad("model id is empty".to_string()));
        }

        let started = Instant::now();
        for stage in 1..=LOAD_STAGES {
            tokio::time::sleep(self.stage_delay).await;
            let text = if stage == LOAD_STAGES {
                format!(
                    "Finish loading {model_id} ({} cache)",
                    if options.cache.uses_indexed_db() { "indexed" } else { "artifact" }
                )
            } else {
                format!("Fetching param cache[{stage}/{}]", LOAD_STAGES - 1)
            };
            options.report(&InitProgressReport {
                progress: stage as f32 / LOAD_STAGES as f32,
                time_elapsed: started.elapsed().as_secs_f64(),
                text,
            });
        }

        tracing::info!("Loopback model ready: {}", model_id);
        Ok(Arc::new(LoopbackHandle {
            model_id: model_id.to_string(),
            token_delay: self.token_delay,
            stream_buffer: self.stream_buffer,
            interrupted: Arc::new(AtomicBool::new(false)),
            missed_heartbeats: self.missed_heartbeats.clone(),
        }))
    }
}

struct LoopbackHandle {
    model_id: String,
    token_delay: Duration,
    stream_buffer: usize,
    interrupted: Arc<AtomicBool>,
    missed_heartbeats: Arc<AtomicU32>,
}

impl LoopbackHandle {
    fn reply_for(request: &CompletionRequest) -> String {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EngineHandle for LoopbackHandle {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats.load(Ordering::Relaxed)
    }

    async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, EngineError> {
        self.interrupted.store(false, Ordering::Relaxed);
        let reply = Self::reply_for(&request);

        if !request.stream {
            let content = (!reply.is_empty()).then_some(reply);
            return Ok(CompletionResponse::Single(ChatCompletion::from_reply(
                self.model_id.clone(),
                content,
            )));
        }

        let (tx, stream) = streaming::channel(self.stream_buffer);
        tokio::spawn(echo_words(
            tx,
            self.model_id.clone(),
            reply,
            self.token_delay,
            self.interrupted.clone(),
        ));
        Ok(CompletionResponse::Stream(stream))
    }

    async fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }
}

async fn echo_words(
    tx: DeltaSender,
    model_id: String,
    reply: String,
    token_delay: Duration,
    interrupted: Arc<AtomicBool>,
) {
    for word in reply.split_inclusive(' ') {
        if interrupted.load(Ordering::Relaxed) {
            tracing::debug!("Loopback generation interrupted");
            break;
        }
        tokio::time::sleep(token_delay).await;
        if tx
            .send(ChatCompletionChunk::from_content(model_id.as_str(), word))
            .await
            .is_err()
        {
            tracing::debug!("Delta stream closed, stopping generation");
            return;
        }
    }
    tx.finish().await;
}
