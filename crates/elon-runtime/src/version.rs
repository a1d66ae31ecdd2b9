use serde::{Deserialize, Serialize};

/// Static build metadata reported by `--version` and embedding callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub engine: String,
}

impl VersionInfo {
    pub fn new(engine: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").into(),
            engine: engine.into(),
        }
    }
}
