pub mod direct;
pub mod scripted;

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::error::EngineError;

pub type EngineFuture<'a> = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>>;

/// A runnable routing engine runtime.
///
/// Construction and start are separate, fallible phases: a runtime may hold
/// live resources as soon as it is built, so `close` must be safe to call
/// whether or not `start` ever succeeded.
pub trait RoutingEngine: Send {
    fn start(&mut self) -> EngineFuture<'_>;

    fn close(&mut self) -> EngineFuture<'_>;
}

/// Builds routing engine runtimes from an options document.
///
/// The `cancel` token belongs to the instance's execution context; engines
/// should tie their background work to it.
pub trait EngineFactory: Send + Sync {
    /// The display name of this engine (reported in version info).
    fn name(&self) -> &str;

    fn build(
        &self,
        options: Options,
        cancel: CancellationToken,
    ) -> Result<Box<dyn RoutingEngine>, EngineError>;
}
