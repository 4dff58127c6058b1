//! JSON encode/decode seam.
//!
//! # Design
//! A `Codec` turns typed values into request text and response text back
//! into typed values. The client is generic over it, so the choice is made
//! once at construction and dispatched statically. Two implementations ship:
//!
//! - `JsonCodec` streams straight between text and the target type.
//! - `TreeCodec` goes through a `serde_json::Value` tree first, which
//!   tolerates the same inputs but reports shape errors against the parsed
//!   document rather than the raw text position.
//!
//! `None` in gives `None` out on encode. On decode a missing or blank body is
//! an error: every caller that decodes expects content.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MeiliError, Result};

/// Converts between typed values and JSON text.
///
/// `encode` always serializes, so a `&str` value comes out as a quoted JSON
/// string. Text that is already JSON never reaches a codec: the raw document
/// and request helpers hand it to `RequestFactory::create` unchanged.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: Option<&T>) -> Result<Option<String>>;

    fn decode<T: DeserializeOwned>(&self, text: Option<&str>) -> Result<T>;
}

fn require_text(text: Option<&str>) -> Result<&str> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(MeiliError::Decode("no content to decode".to_string())),
    }
}

/// Streaming codec: `serde_json::to_string` / `from_str`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: Option<&T>) -> Result<Option<String>> {
        value
            .map(|v| serde_json::to_string(v).map_err(|e| MeiliError::Encode(e.to_string())))
            .transpose()
    }

    fn decode<T: DeserializeOwned>(&self, text: Option<&str>) -> Result<T> {
        let text = require_text(text)?;
        serde_json::from_str(text).map_err(|e| MeiliError::Decode(e.to_string()))
    }
}

/// Tree codec: every value passes through `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeCodec;

impl Codec for TreeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: Option<&T>) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };
        let tree = serde_json::to_value(value).map_err(|e| MeiliError::Encode(e.to_string()))?;
        Ok(Some(tree.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: Option<&str>) -> Result<T> {
        let text = require_text(text)?;
        let tree: serde_json::Value =
            serde_json::from_str(text).map_err(|e| MeiliError::Decode(e.to_string()))?;
        serde_json::from_value(tree).map_err(|e| MeiliError::Decode(e.to_string()))
    }
}
