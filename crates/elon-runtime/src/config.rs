use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DecodeError;

type Extra = serde_json::Map<String, serde_json::Value>;

/// Structured options document handed to the routing engine.
///
/// Sections the built-in engine understands are typed; everything else is
/// carried through untouched in `extra` so that a document is never rejected
/// here for fields only some other engine knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogOptions>,
    #[serde(default)]
    pub inbounds: Vec<InboundOptions>,
    #[serde(default)]
    pub outbounds: Vec<OutboundOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogOptions {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundOptions {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub listen_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_port: Option<u16>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_listen() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundOptions {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tag: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Decode a base64 (standard alphabet, padded) blob into the JSON text it
/// carries. Surrounding whitespace is not stripped and fails to decode.
pub fn decode_base64(encoded: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD.decode(encoded)?;
    Ok(String::from_utf8(bytes)?)
}

/// Parse JSON text into an options document.
pub fn parse_json(json: &str) -> Result<Options, DecodeError> {
    Ok(serde_json::from_str(json)?)
}

/// Serialize a value to JSON and base64 encode it.
pub fn encode_base64<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// SHA-256 of the raw configuration text, hex encoded.
pub fn fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
