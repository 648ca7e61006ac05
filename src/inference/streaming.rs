//! Streaming delta channel
//!
//! A streaming completion is a bounded producer/consumer channel. The engine
//! holds the [`DeltaSender`], the dispatcher holds the [`DeltaStream`]. The
//! stream is finite and single-use: once it yields its terminal item, or the
//! consumer closes it, every further `next()` returns `None`.

use tokio::sync::mpsc;

use crate::inference::engine::{ChatCompletionChunk, EngineError};

/// Items carried over the channel
#[derive(Debug, Clone, PartialEq)]
pub enum StreamToken {
    Delta(ChatCompletionChunk),
    Done,
    Error(EngineError),
}

/// Creates a delta channel with room for `capacity` undelivered chunks
pub fn channel(capacity: usize) -> (DeltaSender, DeltaStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DeltaSender { tx },
        DeltaStream {
            rx,
            finished: false,
        },
    )
}

/// Producer half, owned by the engine
#[derive(Debug, Clone)]
pub struct DeltaSender {
    tx: mpsc::Sender<StreamToken>,
}

impl DeltaSender {
    /// Send one chunk. Fails once the consumer has closed or dropped the stream,
    /// which is the producer's cue to stop generating.
    pub async fn send(&self, chunk: ChatCompletionChunk) -> Result<(), EngineError> {
        self.tx
            .send(StreamToken::Delta(chunk))
            .await
            .map_err(|_| EngineError::StreamClosed)
    }

    /// Terminate the stream normally
    pub async fn finish(self) {
        let _ = self.tx.send(StreamToken::Done).await;
    }

    /// Terminate the stream with an error
    pub async fn fail(self, error: EngineError) {
        let _ = self.tx.send(StreamToken::Error(error)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the dispatcher
#[derive(Debug)]
pub struct DeltaStream {
    rx: mpsc::Receiver<StreamToken>,
    finished: bool,
}

impl DeltaStream {
    /// Next chunk, an engine error, or `None` once the stream has ended.
    ///
    /// A producer that drops its sender without finishing yields a
    /// [`EngineError::WorkerError`] as the stream's last item.
    pub async fn next(&mut self) -> Option<Result<ChatCompletionChunk, EngineError>> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(StreamToken::Delta(chunk)) => Some(Ok(chunk)),
            Some(StreamToken::Error(error)) => {
                self.close();
                Some(Err(error))
            }
            Some(StreamToken::Done) => {
                self.close();
                None
            }
            None => {
                self.close();
                Some(Err(EngineError::WorkerError(
                    "delta producer dropped before finishing".to_string(),
                )))
            }
        }
    }

    /// Stop consuming. Pending chunks are discarded and the producer's next
    /// send fails.
    pub fn close(&mut self) {
        self.finished = true;
        self.rx.close();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
