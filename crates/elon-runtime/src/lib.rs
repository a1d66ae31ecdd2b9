//! Instance lifecycle manager for the elon routing engine.
//!
//! Provides [`LifecycleController`], which turns an encoded configuration
//! into a running engine instance identified by a numeric [`Handle`], and
//! tears that instance down again on request. The engine itself sits behind
//! the [`EngineFactory`] / [`RoutingEngine`] capability traits; the crate
//! ships a small TCP forwarding engine, [`DirectFactory`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use elon_runtime::{DirectFactory, LifecycleController, Registry};
//!
//! # async fn run() -> Result<(), elon_runtime::LifecycleError> {
//! let controller = LifecycleController::new(Arc::new(Registry::new()), Arc::new(DirectFactory));
//!
//! let handle = controller
//!     .start_json(r#"{
//!         "inbounds": [{
//!             "type": "direct",
//!             "listen": "127.0.0.1",
//!             "listen_port": 5353,
//!             "override_address": "1.1.1.1",
//!             "override_port": 53
//!         }]
//!     }"#)
//!     .await?;
//!
//! assert!(controller.instance(handle).await.is_some());
//! controller.stop(handle).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod version;

pub use config::Options;
pub use context::ExecutionContext;
pub use engine::direct::{DirectEngine, DirectFactory};
pub use engine::{EngineFactory, RoutingEngine};
pub use error::{DecodeError, EngineError, LifecycleError};
pub use lifecycle::LifecycleController;
pub use registry::{Handle, Instance, InstanceInfo, Registry};
pub use version::VersionInfo;
