//! Completion dispatcher
//!
//! Drives one chat request through
//! `model check → (load) → generate → finish | error`.
//!
//! The model check is a separate phase with a recorded [`LoadOutcome`]. A
//! failed load is logged and the request still proceeds to generation, where
//! the missing handle surfaces as the request's error. Whatever happens, the
//! listener sees exactly one of `on_finish` or `on_error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::inference::{
    CompletionRequest, CompletionResponse, DeltaStream, EngineError, InitProgressReport,
    ProgressCallback,
};
use crate::session::listener::ChatListener;
use crate::session::manager::EngineHandleManager;
use crate::types::{Message, ModelConfig};

/// Errors delivered to `on_error`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Completion(#[from] EngineError),

    #[error("Empty response generated by LLM")]
    EmptyResponse,

    #[error("Another chat request is already running on this session")]
    Busy,
}

/// Result of the model check phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The requested model was already loaded; no reload happened
    AlreadyLoaded,
    Loaded,
    Failed(EngineError),
}

/// One user turn: the conversation so far and the model to answer with
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ModelConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, config: ModelConfig) -> Self {
        Self { messages, config }
    }
}

pub struct CompletionDispatcher {
    manager: Arc<EngineHandleManager>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the request resolves
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CompletionDispatcher {
    pub fn new(manager: Arc<EngineHandleManager>) -> Self {
        Self {
            manager,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one chat request to its terminal callback.
    ///
    /// A request issued while another is running on this dispatcher is
    /// rejected with [`ChatError::Busy`] without touching the engine.
    pub async fn chat(&self, request: ChatRequest, listener: Arc<dyn ChatListener>) {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("chat", %request_id, model = %request.config.model);

        async move {
            let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
                tracing::warn!("Rejecting overlapping chat request");
                listener.on_error(ChatError::Busy);
                return;
            };

            if let LoadOutcome::Failed(e) = self.ensure_model(&request.config, &listener).await {
                tracing::error!("Error in model load, attempting completion anyway: {}", e);
            }

            match self.generate(&request, listener.as_ref()).await {
                Ok(reply) => {
                    tracing::debug!("Chat finished with {} bytes", reply.len());
                    listener.on_finish(reply);
                }
                Err(e) => {
                    tracing::debug!("Chat failed: {}", e);
                    listener.on_error(e);
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Model check phase: reload when the requested model is not the loaded one.
    ///
    /// Load progress is forwarded to `listener.on_update` as `(text, text)`.
    pub async fn ensure_model(
        &self,
        config: &ModelConfig,
        listener: &Arc<dyn ChatListener>,
    ) -> LoadOutcome {
        if self.manager.current_model_id().as_deref() == Some(config.model.as_str()) {
            return LoadOutcome::AlreadyLoaded;
        }

        match self
            .manager
            .load_model(config, Some(progress_to_listener(listener.clone())))
            .await
        {
            Ok(_) => LoadOutcome::Loaded,
            Err(e) => LoadOutcome::Failed(e),
        }
    }

    /// Asks the engine to stop generating. Does not resolve the pending request;
    /// it finishes with whatever the engine produced before stopping.
    pub async fn abort(&self) {
        self.manager.interrupt().await;
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        listener: &dyn ChatListener,
    ) -> Result<String, ChatError> {
        let handle = self.manager.handle()?;
        let response = handle
            .completion(CompletionRequest {
                stream: request.config.stream,
                messages: request.messages.clone(),
            })
            .await
            .map_err(|e| {
                tracing::error!("Error in chat completion: {}", e);
                e
            })?;

        let reply = match response {
            CompletionResponse::Single(completion) => {
                completion.reply().unwrap_or_default().to_string()
            }
            CompletionResponse::Stream(stream) => consume_stream(stream, listener).await?,
        };

        if reply.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(reply)
    }
}

fn progress_to_listener(listener: Arc<dyn ChatListener>) -> ProgressCallback {
    Arc::new(move |report: &InitProgressReport| listener.on_update(&report.text, &report.text))
}

/// Accumulates non-empty deltas, reporting each one as it arrives
async fn consume_stream(
    mut stream: DeltaStream,
    listener: &dyn ChatListener,
) -> Result<String, ChatError> {
    let mut reply = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if let Some(delta) = chunk.content() {
                    reply.push_str(delta);
                    listener.on_update(&reply, delta);
                }
            }
            Err(e) => {
                tracing::error!("Error in streaming chat completion: {}", e);
                stream.close();
                return Err(e.into());
            }
        }
    }

    Ok(reply)
}
