//! Tolerant response-body decoding.

use serde::de::DeserializeOwned;

/// Wire format of a response body. JSON is the default everywhere a format
/// is not stated explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    #[default]
    Json,
    Xml,
}

/// Decode a response body into `T`, tolerating malformed input.
///
/// Returns `None` when the body does not parse or does not match the shape
/// of `T`. Callers treat that as "no structured payload present" rather than
/// a failure in its own right.
pub fn decode_body<T: DeserializeOwned>(body: &str, format: BodyFormat) -> Option<T> {
    match format {
        BodyFormat::Json => serde_json::from_str(body).ok(),
        BodyFormat::Xml => quick_xml::de::from_str(body).ok(),
    }
}
