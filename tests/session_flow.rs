use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use localm_session::inference::LoopbackEngine;
use localm_session::session::{event_channel, ChatEvent, LivenessFailure, ModelState};
use localm_session::types::{CacheMode, Message, ModelConfig};
use localm_session::{ChatError, ChatRequest, LlmApi, LocalLlmApi};
use tokio::sync::mpsc::UnboundedReceiver;

fn fast_engine() -> Arc<LoopbackEngine> {
    Arc::new(LoopbackEngine::new().with_delays(Duration::ZERO, Duration::ZERO))
}

fn quiet_session(engine: Arc<LoopbackEngine>) -> LocalLlmApi {
    LocalLlmApi::new(engine, Arc::new(|_failure: LivenessFailure| {}))
}

async fn collect(mut rx: UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_streaming_reply_matches_concatenated_deltas() {
    let api = quiet_session(fast_engine());
    let (listener, rx) = event_channel();
    let request = ChatRequest::new(
        vec![
            Message::system("echo"),
            Message::user("the quick brown fox"),
        ],
        ModelConfig::new("tiny").with_cache(CacheMode::IndexDb),
    );

    api.chat(request, listener).await;
    let events = collect(rx).await;

    let Some(ChatEvent::Finish { message }) = events.last() else {
        panic!("expected finish, got {events:?}");
    };
    assert_eq!(message, "the quick brown fox");

    // The loopback engine reports four load stages before the first delta
    let (progress, deltas) = events[..events.len() - 1].split_at(4);
    assert!(progress
        .iter()
        .all(|e| matches!(e, ChatEvent::Update { message, chunk } if message == chunk)));
    let deltas: String = deltas
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Update { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(&deltas, message);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(api.manager().state(), ModelState::Loaded("tiny".to_string()));
}

#[tokio::test]
async fn test_non_streaming_reply() {
    let api = quiet_session(fast_engine());
    api.init_model(&ModelConfig::new("tiny"), None).await.unwrap();

    let (listener, rx) = event_channel();
    let config = ModelConfig::new("tiny").with_stream(false);
    api.chat(ChatRequest::new(vec![Message::user("ping")], config), listener)
        .await;

    assert_eq!(
        collect(rx).await,
        vec![ChatEvent::Finish {
            message: "ping".to_string()
        }]
    );
}

#[tokio::test]
async fn test_blank_prompt_is_empty_response() {
    let api = quiet_session(fast_engine());
    api.init_model(&ModelConfig::new("tiny"), None).await.unwrap();

    let (listener, rx) = event_channel();
    let config = ModelConfig::new("tiny").with_stream(false);
    api.chat(ChatRequest::new(vec![Message::user("   ")], config), listener)
        .await;

    assert_eq!(
        collect(rx).await,
        vec![ChatEvent::Error {
            error: ChatError::EmptyResponse
        }]
    );
}

#[tokio::test]
async fn test_switching_models_reloads() {
    let api = quiet_session(fast_engine());
    api.init_model(&ModelConfig::new("first"), None).await.unwrap();

    let (listener, rx) = event_channel();
    let config = ModelConfig::new("second").with_stream(false);
    api.chat(ChatRequest::new(vec![Message::user("hi")], config), listener)
        .await;

    let events = collect(rx).await;
    assert!(matches!(events.first(), Some(ChatEvent::Update { .. })));
    assert!(matches!(events.last(), Some(ChatEvent::Finish { .. })));
    assert_eq!(api.current_model_id().as_deref(), Some("second"));
}

#[tokio::test]
async fn test_abort_with_no_engine_loaded() {
    let api = quiet_session(fast_engine());
    api.abort().await;
    assert_eq!(api.current_model_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_abort_truncates_stream() {
    let engine = Arc::new(
        LoopbackEngine::new().with_delays(Duration::ZERO, Duration::from_millis(20)),
    );
    let api = quiet_session(engine);
    api.init_model(&ModelConfig::new("tiny"), None).await.unwrap();

    let long_prompt = "word ".repeat(200);
    let (listener, rx) = event_channel();
    let request = ChatRequest::new(
        vec![Message::user(long_prompt.clone())],
        ModelConfig::new("tiny"),
    );

    let abort = async {
        tokio::time::sleep(Duration::from_millis(110)).await;
        api.abort().await;
    };
    tokio::join!(api.chat(request, listener), abort);

    let events = collect(rx).await;
    let Some(ChatEvent::Finish { message }) = events.last() else {
        panic!("expected truncated finish, got {:?}", events.last());
    };
    assert!(!message.is_empty());
    assert!(message.len() < long_prompt.trim().len());
}

#[tokio::test(start_paused = true)]
async fn test_crash_notification_leaves_chat_alone() {
    let engine = fast_engine();
    let crashes = Arc::new(AtomicUsize::new(0));
    let sink = crashes.clone();
    let api = LocalLlmApi::new(
        engine.clone(),
        Arc::new(move |failure: LivenessFailure| {
            assert_eq!(failure.missed_heartbeats, 3);
            sink.fetch_add(1, Ordering::SeqCst);
        }),
    );
    api.init_model(&ModelConfig::new("tiny"), None).await.unwrap();

    engine.set_missed_heartbeats(3);
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(crashes.load(Ordering::SeqCst), 1);
    assert!(!api.is_alive());

    // The dead handle is not replaced automatically and chats still resolve
    let (listener, rx) = event_channel();
    let config = ModelConfig::new("tiny").with_stream(false);
    api.chat(ChatRequest::new(vec![Message::user("still here")], config), listener)
        .await;
    assert_eq!(
        collect(rx).await,
        vec![ChatEvent::Finish {
            message: "still here".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_crash_during_stream_does_not_touch_pending_chat() {
    let engine = Arc::new(
        LoopbackEngine::new().with_delays(Duration::ZERO, Duration::from_secs(1)),
    );
    let crashes = Arc::new(AtomicUsize::new(0));
    let sink = crashes.clone();
    let api = LocalLlmApi::new(
        engine.clone(),
        Arc::new(move |_failure: LivenessFailure| {
            sink.fetch_add(1, Ordering::SeqCst);
        }),
    );
    api.init_model(&ModelConfig::new("tiny"), None).await.unwrap();
    engine.set_missed_heartbeats(3);

    // Twenty words at one second each keeps the stream open past the first tick
    let prompt = "word ".repeat(20);
    let (listener, mut rx) = event_channel();
    let request = ChatRequest::new(vec![Message::user(prompt.clone())], ModelConfig::new("tiny"));

    let observe = async {
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(crashes.load(Ordering::SeqCst), 1);
        let mut early = Vec::new();
        while let Ok(event) = rx.try_recv() {
            early.push(event);
        }
        early
    };
    let ((), early) = tokio::join!(api.chat(request, listener), observe);

    assert!(!early.is_empty());
    assert!(early.iter().all(|e| !e.is_terminal()));

    let rest = collect(rx).await;
    assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(
        rest.last(),
        Some(&ChatEvent::Finish {
            message: prompt.trim().to_string()
        })
    );
    assert_eq!(api.current_model_id().as_deref(), Some("tiny"));
}
