//! Upstream feed events
//!
//! Only one shape matters to the pipeline: a commit whose record embeds one or
//! more images. Everything else in the event is carried opaquely so it can be
//! forwarded to subscribers untouched.

use serde_json::Value;

const IMAGES_POINTER: &str = "/commit/record/embed/images";

/// Commit event carrying at least one image attachment
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    payload: Value,
}

impl InboundEvent {
    /// Parse a raw feed message
    ///
    /// Returns `Ok(None)` for well-formed messages the pipeline does not care
    /// about, and an error only when the message is not JSON at all.
    pub fn parse(message: &str) -> Result<Option<Self>, serde_json::Error> {
        let payload: Value = serde_json::from_str(message)?;
        Ok(Self::from_value(payload))
    }

    /// Keep `payload` only if it is a commit with image attachments
    pub fn from_value(payload: Value) -> Option<Self> {
        if payload.get("kind").and_then(Value::as_str) != Some("commit") {
            return None;
        }

        let has_images = payload
            .pointer(IMAGES_POINTER)
            .and_then(Value::as_array)
            .is_some_and(|images| !images.is_empty());

        has_images.then_some(Self { payload })
    }

    /// Image attachments in post order
    pub fn images(&self) -> &[Value] {
        self.payload
            .pointer(IMAGES_POINTER)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Alt text of an image attachment; missing or non-string counts as empty
pub fn alt_text(image: &Value) -> &str {
    image.get("alt").and_then(Value::as_str).unwrap_or("")
}
