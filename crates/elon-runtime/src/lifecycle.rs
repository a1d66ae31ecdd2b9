use std::sync::Arc;

use crate::config;
use crate::context::ExecutionContext;
use crate::engine::EngineFactory;
use crate::error::LifecycleError;
use crate::registry::{Handle, Instance, InstanceInfo, Registry};
use crate::version::VersionInfo;

/// Starts, tracks and stops routing engine instances.
///
/// Start runs decode → construct → start → register; only the final
/// register step touches the shared registry. Stop runs unregister → cancel
/// → close, so a handle disappears before its engine begins closing.
///
/// # Threading
///
/// `LifecycleController` is `Send + Sync` and can be shared behind an `Arc`;
/// concurrent starts never collide on a handle, and of several concurrent
/// stops for the same handle exactly one wins.
pub struct LifecycleController {
    registry: Arc<Registry>,
    factory: Arc<dyn EngineFactory>,
}

impl LifecycleController {
    pub fn new(registry: Arc<Registry>, factory: Arc<dyn EngineFactory>) -> Self {
        Self { registry, factory }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start an instance from a base64-encoded JSON configuration.
    pub async fn start_base64(&self, encoded: &str) -> Result<Handle, LifecycleError> {
        let json = config::decode_base64(encoded)?;
        self.start_json(json).await
    }

    /// Start an instance from JSON configuration text.
    ///
    /// On success the text is retained byte-for-byte as the instance's
    /// `raw_config`. On failure no handle is consumed.
    ///
    /// If this future is dropped before the instance is registered, the
    /// execution context cancels itself and the engine is dropped unclosed;
    /// engines must release their resources on drop as well as on `close`.
    pub async fn start_json(&self, json: impl Into<String>) -> Result<Handle, LifecycleError> {
        let json = json.into();
        let options = config::parse_json(&json)?;

        let context = ExecutionContext::new();
        let mut engine = match self.factory.build(options, context.token()) {
            Ok(engine) => engine,
            Err(e) => {
                context.cancel();
                tracing::warn!(engine = self.factory.name(), "Failed to create instance: {e}");
                return Err(LifecycleError::Construction(e));
            }
        };

        if let Err(e) = engine.start().await {
            context.cancel();
            // The start error is what the caller sees; a close failure here is only logged.
            if let Err(close_err) = engine.close().await {
                tracing::warn!("Cleanup after failed start could not close instance: {close_err}");
            }
            tracing::warn!(engine = self.factory.name(), "Failed to start instance: {e}");
            return Err(LifecycleError::Start(e));
        }

        let handle = self
            .registry
            .insert(Instance::new(engine, context, json))
            .await;

        tracing::info!(handle, engine = self.factory.name(), "Instance started");
        Ok(handle)
    }

    /// Stop and remove the instance registered under `handle`.
    ///
    /// The handle is gone from the registry even if closing the engine fails.
    pub async fn stop(&self, handle: Handle) -> Result<(), LifecycleError> {
        let Some(mut instance) = self.registry.remove(handle).await else {
            tracing::debug!(handle, "Stop requested for unknown instance");
            return Err(LifecycleError::NotFound(handle));
        };

        tracing::debug!(handle, "Instance unregistered");

        instance.context.cancel();

        instance.engine.close().await.map_err(|source| {
            tracing::error!(handle, "Failed to close instance: {source}");
            LifecycleError::Close { handle, source }
        })?;

        tracing::info!(handle, "Instance stopped");
        Ok(())
    }

    /// Read-only view of a running instance.
    pub async fn instance(&self, handle: Handle) -> Option<InstanceInfo> {
        self.registry.get(handle).await
    }

    pub fn version_info(&self) -> VersionInfo {
        VersionInfo::new(self.factory.name())
    }

    /// Version info as JSON, base64 encoded.
    pub fn version_base64(&self) -> Result<String, LifecycleError> {
        Ok(config::encode_base64(&self.version_info())?)
    }
}
