//! Chat session over an in-process engine
//!
//! [`LocalLlmApi`] is the object a UI holds. It owns the
//! [`EngineHandleManager`], the [`CompletionDispatcher`] that drives requests
//! against it, and the [`LivenessWatchdog`] that reports engine death.

pub mod dispatcher;
pub mod listener;
pub mod manager;
pub mod watchdog;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::inference::{EngineError, InferenceEngine, InitProgressReport, ProgressCallback};
use crate::storage::models::catalog_models;
use crate::storage::settings::SessionSettings;
use crate::types::{LlmModel, LlmUsage, ModelConfig};

pub use dispatcher::{ChatError, ChatRequest, CompletionDispatcher, LoadOutcome};
pub use listener::{event_channel, ChatEvent, ChatListener};
pub use manager::{EngineHandleManager, ModelState, DEFAULT_MAX_MISSED_HEARTBEATS};
pub use watchdog::{CrashCallback, LivenessFailure, LivenessWatchdog, DEFAULT_WATCHDOG_INTERVAL};

/// What a chat UI needs from a model backend
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn chat(&self, request: ChatRequest, listener: Arc<dyn ChatListener>);
    async fn abort(&self);
    async fn usage(&self) -> LlmUsage;
    async fn models(&self) -> Vec<LlmModel>;
}

pub struct LocalLlmApi {
    manager: Arc<EngineHandleManager>,
    dispatcher: CompletionDispatcher,
    watchdog: LivenessWatchdog,
}

impl LocalLlmApi {
    /// Creates a session with the default heartbeat policy. Must be called
    /// inside a tokio runtime; the watchdog starts immediately.
    pub fn new(engine: Arc<dyn InferenceEngine>, on_crash: CrashCallback) -> Self {
        Self::build(
            engine,
            DEFAULT_MAX_MISSED_HEARTBEATS,
            DEFAULT_WATCHDOG_INTERVAL,
            on_crash,
        )
    }

    pub fn with_settings(
        engine: Arc<dyn InferenceEngine>,
        settings: &SessionSettings,
        on_crash: CrashCallback,
    ) -> Self {
        Self::build(
            engine,
            settings.max_missed_heartbeats,
            settings.watchdog_interval(),
            on_crash,
        )
    }

    fn build(
        engine: Arc<dyn InferenceEngine>,
        max_missed_heartbeats: u32,
        watchdog_interval: Duration,
        on_crash: CrashCallback,
    ) -> Self {
        let manager = Arc::new(
            EngineHandleManager::new(engine).with_heartbeat_threshold(max_missed_heartbeats),
        );
        let dispatcher = CompletionDispatcher::new(manager.clone());
        let watchdog = LivenessWatchdog::spawn(manager.clone(), watchdog_interval, on_crash);
        tracing::info!("Local LLM session initialized");

        Self {
            manager,
            dispatcher,
            watchdog,
        }
    }

    /// Loads `config.model` outside of a chat, e.g. to warm up at startup or
    /// to recover after a liveness failure. Progress goes to `listener.on_update`.
    pub async fn init_model(
        &self,
        config: &ModelConfig,
        listener: Option<Arc<dyn ChatListener>>,
    ) -> Result<(), EngineError> {
        let progress = listener.map(|listener| -> ProgressCallback {
            Arc::new(move |report: &InitProgressReport| {
                listener.on_update(&report.text, &report.text)
            })
        });
        self.manager.load_model(config, progress).await.map(|_| ())
    }

    /// Session reset: drops the loaded model
    pub fn clear(&self) {
        self.manager.clear();
    }

    pub fn manager(&self) -> &Arc<EngineHandleManager> {
        &self.manager
    }

    pub fn current_model_id(&self) -> Option<String> {
        self.manager.current_model_id()
    }

    pub fn is_alive(&self) -> bool {
        self.manager.is_alive()
    }

    /// Stops the liveness watchdog. Also happens on drop.
    pub fn shutdown(&mut self) {
        self.watchdog.stop();
    }
}

#[async_trait]
impl LlmApi for LocalLlmApi {
    async fn chat(&self, request: ChatRequest, listener: Arc<dyn ChatListener>) {
        self.dispatcher.chat(request, listener).await;
    }

    async fn abort(&self) {
        self.dispatcher.abort().await;
    }

    async fn usage(&self) -> LlmUsage {
        LlmUsage::default()
    }

    async fn models(&self) -> Vec<LlmModel> {
        catalog_models()
    }
}
