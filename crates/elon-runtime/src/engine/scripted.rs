use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::engine::{EngineFactory, EngineFuture, RoutingEngine};
use crate::error::EngineError;

/// Which phase a [`ScriptedFactory`] engine should fail in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Script {
    pub fail_build: bool,
    pub fail_start: bool,
    pub fail_close: bool,
    pub start_delay: Option<Duration>,
}

/// Counters and tokens recorded by every engine a [`ScriptedFactory`] builds.
#[derive(Debug, Default)]
pub struct Recorder {
    built: AtomicUsize,
    started: AtomicUsize,
    closed: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl Recorder {
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many handed-out tokens have fired.
    ///
    /// Counted by a watcher task per token, so callers must yield to the
    /// runtime after a cancellation before reading it.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancellation tokens handed to `build`, in call order.
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens
            .lock()
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }
}

/// An engine factory with no I/O whose failures are scripted up front.
///
/// Used to exercise the lifecycle protocol without binding sockets.
pub struct ScriptedFactory {
    script: Script,
    recorder: Arc<Recorder>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Script::default())
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }
}

impl EngineFactory for ScriptedFactory {
    fn name(&self) -> &str {
        "scripted"
    }

    fn build(
        &self,
        _options: Options,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RoutingEngine>, EngineError> {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let watched = cancel.clone();
            let cancelled = Arc::clone(&self.recorder.cancelled);
            runtime.spawn(async move {
                watched.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
            });
        }
        if let Ok(mut tokens) = self.recorder.tokens.lock() {
            tokens.push(cancel);
        }
        if self.script.fail_build {
            return Err(EngineError::InvalidConfig("scripted build failure".into()));
        }
        self.recorder.built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            script: self.script,
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct ScriptedEngine {
    script: Script,
    recorder: Arc<Recorder>,
}

impl RoutingEngine for ScriptedEngine {
    fn start(&mut self) -> EngineFuture<'_> {
        Box::pin(async move {
            if let Some(delay) = self.script.start_delay {
                tokio::time::sleep(delay).await;
            }
            if self.script.fail_start {
                return Err(EngineError::Task("scripted start failure".into()));
            }
            self.recorder.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn close(&mut self) -> EngineFuture<'_> {
        Box::pin(async move {
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_close {
                return Err(EngineError::Task("scripted close failure".into()));
            }
            Ok(())
        })
    }
}
