//! Request payloads and response decode destinations.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// Chunked response body handed over to the caller on streaming requests.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, BoxError>> + Send>>;

/// Outgoing request payload.
pub enum Body<'a> {
    /// Raw bytes, sent as-is.
    Bytes(Vec<u8>),
    /// UTF-8 text, sent as-is.
    Text(String),
    /// Streaming payload, handed to the transport untouched.
    Stream(reqwest::Body),
    /// Typed value, marshaled according to the request content type.
    Structured(Box<dyn Encodable + 'a>),
}

impl From<Vec<u8>> for Body<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Body<'_> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body<'_> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<reqwest::Body> for Body<'_> {
    fn from(stream: reqwest::Body) -> Self {
        Self::Stream(stream)
    }
}

/// Marshal source for structured request bodies.
///
/// Implemented for every `Serialize + Send` value, so any serializable type
/// can be passed to [`Request::body`](crate::Request::body) directly.
pub trait Encodable: Send {
    /// Encode the value as JSON.
    fn encode_json(&self) -> std::result::Result<Vec<u8>, BoxError>;

    /// Encode the value as XML.
    fn encode_xml(&self) -> std::result::Result<Vec<u8>, BoxError>;
}

impl<T: Serialize + Send> Encodable for T {
    fn encode_json(&self) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn encode_xml(&self) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(quick_xml::se::to_string(self)?.into_bytes())
    }
}

/// Decode destination for response bodies.
pub trait DecodeTarget: Send {
    /// Decode `data` as JSON into the destination.
    fn put_json(&mut self, data: &[u8]) -> std::result::Result<(), BoxError>;

    /// Decode `data` as XML into the destination.
    fn put_xml(&mut self, data: &[u8]) -> std::result::Result<(), BoxError>;
}

/// Decode destination for error bodies, able to describe the decoded value.
pub trait ErrorDecodeTarget: DecodeTarget {
    /// Message of the decoded value, when the destination can render one.
    fn error_message(&self) -> Option<String>;

    /// Debug rendering of the decoded value.
    fn debug_render(&self) -> String;

    /// Detach the decoded value for error chaining, when the destination
    /// owns one.
    fn take_source(&mut self) -> Option<BoxError>;
}

/// Destination for a processed response body. Each request carries at most
/// one of these.
pub(crate) enum ResponseTarget<'a> {
    /// Typed destination decoded through the codec functions.
    Structured(Box<dyn DecodeTarget + 'a>),
    /// Raw copy of the buffered body.
    Bytes(&'a mut Vec<u8>),
    /// Live stream handed over on success.
    Stream(&'a mut Option<BodyStream>),
}

/// Adapter decoding into a caller-owned typed value.
pub(crate) struct TypedSlot<'d, T>(pub(crate) &'d mut T);

impl<T: DeserializeOwned + Send> DecodeTarget for TypedSlot<'_, T> {
    fn put_json(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        *self.0 = serde_json::from_slice(data)?;
        Ok(())
    }

    fn put_xml(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        *self.0 = quick_xml::de::from_reader(data)?;
        Ok(())
    }
}

/// Adapter decoding an error body into a caller-owned value.
pub(crate) struct BorrowedErrorSlot<'d, E>(pub(crate) &'d mut E);

impl<E: DeserializeOwned + Send> DecodeTarget for BorrowedErrorSlot<'_, E> {
    fn put_json(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        *self.0 = serde_json::from_slice(data)?;
        Ok(())
    }

    fn put_xml(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        *self.0 = quick_xml::de::from_reader(data)?;
        Ok(())
    }
}

impl<E: DeserializeOwned + Send + fmt::Debug> ErrorDecodeTarget for BorrowedErrorSlot<'_, E> {
    fn error_message(&self) -> Option<String> {
        None
    }

    fn debug_render(&self) -> String {
        format!("{:?}", self.0)
    }

    fn take_source(&mut self) -> Option<BoxError> {
        None
    }
}

/// Adapter decoding an error body into a client-owned value that becomes
/// the source of the returned status error.
pub(crate) struct ErrorCapture<E> {
    value: Option<E>,
}

impl<E> ErrorCapture<E> {
    pub(crate) fn new() -> Self {
        Self { value: None }
    }
}

impl<E: DeserializeOwned + Send> DecodeTarget for ErrorCapture<E> {
    fn put_json(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        self.value = Some(serde_json::from_slice(data)?);
        Ok(())
    }

    fn put_xml(&mut self, data: &[u8]) -> std::result::Result<(), BoxError> {
        self.value = Some(quick_xml::de::from_reader(data)?);
        Ok(())
    }
}

impl<E> ErrorDecodeTarget for ErrorCapture<E>
where
    E: std::error::Error + DeserializeOwned + Send + Sync + 'static,
{
    fn error_message(&self) -> Option<String> {
        self.value.as_ref().map(ToString::to_string)
    }

    fn debug_render(&self) -> String {
        self.value
            .as_ref()
            .map(|value| format!("{value:?}"))
            .unwrap_or_default()
    }

    fn take_source(&mut self) -> Option<BoxError> {
        self.value.take().map(|value| Box::new(value) as BoxError)
    }
}

/// Check whether a content type belongs to the JSON family.
///
/// The `/json` marker must appear past the first byte, so `application/json`
/// and `application/problem+json` match while a bare `/json` does not.
pub fn is_json_content_type(content_type: &str) -> bool {
    matches!(content_type.find("/json"), Some(index) if index > 0)
}

/// Check whether a content type belongs to the XML family.
pub fn is_xml_content_type(content_type: &str) -> bool {
    matches!(content_type.find("/xml"), Some(index) if index > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
    }

    #[test]
    fn test_json_content_type_family() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(is_json_content_type("text/json"));
        assert!(!is_json_content_type("/json"));
        assert!(!is_json_content_type("application/xml"));
        assert!(!is_json_content_type(""));
    }

    #[test]
    fn test_xml_content_type_family() {
        assert!(is_xml_content_type("text/xml"));
        assert!(is_xml_content_type("application/xml"));
        assert!(is_xml_content_type("application/atom+xml"));
        assert!(!is_xml_content_type("/xml"));
        assert!(!is_xml_content_type("application/json"));
    }

    #[test]
    fn test_typed_slot_decodes_json() {
        let mut item = Item::default();
        let mut slot = TypedSlot(&mut item);
        slot.put_json(br#"{"name": "screw", "count": 7}"#).unwrap();
        assert_eq!(
            item,
            Item {
                name: "screw".to_string(),
                count: 7
            }
        );
    }

    #[test]
    fn test_typed_slot_decodes_xml() {
        let mut item = Item::default();
        let mut slot = TypedSlot(&mut item);
        slot.put_xml(b"<Item><name>bolt</name><count>3</count></Item>")
            .unwrap();
        assert_eq!(item.name, "bolt");
        assert_eq!(item.count, 3);
    }

    #[test]
    fn test_typed_slot_reports_decode_failure() {
        let mut item = Item::default();
        let mut slot = TypedSlot(&mut item);
        assert!(slot.put_json(b"not json").is_err());
    }

    #[test]
    fn test_encodable_json_roundtrip() {
        let item = Item {
            name: "nut".to_string(),
            count: 2,
        };
        let encoded = item.encode_json().unwrap();
        let decoded: Item = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_error_capture_renders_and_detaches() {
        #[derive(Debug, Deserialize, thiserror::Error)]
        #[error("{message}")]
        struct ApiError {
            message: String,
        }

        let mut capture = ErrorCapture::<ApiError>::new();
        assert!(capture.error_message().is_none());

        capture.put_json(br#"{"message": "denied"}"#).unwrap();
        assert_eq!(capture.error_message().as_deref(), Some("denied"));
        assert!(capture.debug_render().contains("denied"));

        let source = capture.take_source().unwrap();
        assert_eq!(source.to_string(), "denied");
        assert!(capture.take_source().is_none());
    }

    #[test]
    fn test_borrowed_error_slot_has_no_detachable_source() {
        let mut item = Item::default();
        let mut slot = BorrowedErrorSlot(&mut item);
        slot.put_json(br#"{"name": "x", "count": 1}"#).unwrap();
        assert!(slot.error_message().is_none());
        assert!(slot.take_source().is_none());
        assert!(slot.debug_render().contains('x'));
    }
}
