//! Engine handle manager
//!
//! Owns at most one loaded [`EngineHandle`]. Loading a model discards the
//! previous handle before the new one is requested, so a failed load leaves
//! the session unloaded rather than pointing at a stale model. A dead handle
//! is reported by [`EngineHandleManager::is_alive`] but never replaced here;
//! reloading is the caller's decision.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::inference::{EngineError, EngineHandle, InferenceEngine, LoadOptions, ProgressCallback};
use crate::types::ModelConfig;

/// Missed heartbeats tolerated before a handle counts as dead
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 2;

/// Represents the current state of the model
#[derive(Clone, PartialEq, Debug)]
pub enum ModelState {
    NotLoaded,
    Loading(String),
    Loaded(String),
    Error(String),
}

struct LoadedHandle {
    model_id: String,
    handle: Arc<dyn EngineHandle>,
}

struct Slot {
    loaded: Option<LoadedHandle>,
    state: ModelState,
    /// Bumped by every load and clear; a load only installs its handle if
    /// nothing newer has happened meanwhile.
    generation: u64,
}

pub struct EngineHandleManager {
    engine: Arc<dyn InferenceEngine>,
    slot: Mutex<Slot>,
    max_missed_heartbeats: u32,
}

impl EngineHandleManager {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            slot: Mutex::new(Slot {
                loaded: None,
                state: ModelState::NotLoaded,
                generation: 0,
            }),
            max_missed_heartbeats: DEFAULT_MAX_MISSED_HEARTBEATS,
        }
    }

    pub fn with_heartbeat_threshold(mut self, max_missed_heartbeats: u32) -> Self {
        self.max_missed_heartbeats = max_missed_heartbeats;
        self
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads `config.model` with the config's generation parameters and cache mode.
    ///
    /// Reloading the model that is already loaded is allowed and simply
    /// replaces the handle.
    pub async fn load_model(
        &self,
        config: &ModelConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let generation = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.loaded = None;
            slot.state = ModelState::Loading(config.model.clone());
            slot.generation
        };
        tracing::info!("Loading model {}", config.model);

        let mut options = LoadOptions::from_config(config);
        if let Some(progress) = progress {
            options = options.with_progress(progress);
        }

        let result = self.engine.load(&config.model, options).await;

        let mut slot = self.slot();
        if slot.generation != generation {
            tracing::warn!("Discarding load of {}: superseded", config.model);
            return Err(EngineError::ModelLoad(format!(
                "load of {} was superseded",
                config.model
            )));
        }

        match result {
            Ok(handle) => {
                slot.loaded = Some(LoadedHandle {
                    model_id: config.model.clone(),
                    handle: handle.clone(),
                });
                slot.state = ModelState::Loaded(config.model.clone());
                tracing::info!("Model loaded: {}", config.model);
                Ok(handle)
            }
            Err(e) => {
                slot.state = ModelState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Drops the current handle. Operations fail until the next successful load.
    pub fn clear(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        slot.loaded = None;
        slot.state = ModelState::NotLoaded;
        tracing::info!("Engine handle cleared");
    }

    pub fn current_model_id(&self) -> Option<String> {
        self.slot().loaded.as_ref().map(|l| l.model_id.clone())
    }

    pub fn state(&self) -> ModelState {
        self.slot().state.clone()
    }

    /// The active handle, for issuing completions
    pub fn handle(&self) -> Result<Arc<dyn EngineHandle>, EngineError> {
        self.slot()
            .loaded
            .as_ref()
            .map(|l| l.handle.clone())
            .ok_or(EngineError::NoModelLoaded)
    }

    /// Missed heartbeats of the active handle; zero without one
    pub fn missed_heartbeats(&self) -> u32 {
        self.slot()
            .loaded
            .as_ref()
            .map(|l| l.handle.missed_heartbeats())
            .unwrap_or(0)
    }

    pub fn heartbeat_threshold(&self) -> u32 {
        self.max_missed_heartbeats
    }

    pub fn is_alive(&self) -> bool {
        self.missed_heartbeats() <= self.max_missed_heartbeats
    }

    /// Asks the active handle to stop generating. No-op without a handle.
    pub async fn interrupt(&self) {
        let handle = self.slot().loaded.as_ref().map(|l| l.handle.clone());
        match handle {
            Some(handle) => {
                tracing::info!("Interrupting generation on {}", handle.model_id());
                handle.interrupt().await;
            }
            None => tracing::debug!("Interrupt requested with no model loaded"),
        }
    }
}
