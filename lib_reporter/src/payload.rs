//! # Payloads and Wire Frames
//!
//! A source hands the reporter a [`Payload`]; the reporter encodes it into a
//! [`Frame`] whose content type depends only on the payload's variant:
//!
//! | Payload        | Content-Type               | Socket frame |
//! |----------------|----------------------------|--------------|
//! | `Binary`       | `application/octet-stream` | binary       |
//! | `Text`         | `text/plain`               | text         |
//! | `Structured`   | `application/json`         | text         |

use serde::Serialize;
use serde_json::Value;

use crate::errors::ChannelError;

/// The serialized state of a statistics source.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Opaque bytes, sent as-is.
    Binary(Vec<u8>),
    /// Plain text, sent as-is.
    Text(String),
    /// A structured value, JSON-encoded on the way out.
    Structured(Value),
}

impl Payload {
    /// Builds a `Structured` payload from anything serde can serialize.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Payload::Structured(serde_json::to_value(value)?))
    }

    /// The content type this payload is sent with.
    pub fn content_type(&self) -> ContentType {
        match self {
            Payload::Binary(_) => ContentType::OctetStream,
            Payload::Text(_) => ContentType::PlainText,
            Payload::Structured(_) => ContentType::Json,
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

/// Wire content types, one per payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/octet-stream`
    OctetStream,
    /// `text/plain`
    PlainText,
    /// `application/json`
    Json,
}

impl ContentType {
    /// The MIME string used for the `Content-Type` header.
    pub fn as_mime(&self) -> &'static str {
        match self {
            ContentType::OctetStream => "application/octet-stream",
            ContentType::PlainText => "text/plain",
            ContentType::Json => "application/json",
        }
    }

    /// `true` when the body is UTF-8 text (sent as a socket text frame).
    pub fn is_textual(&self) -> bool {
        !matches!(self, ContentType::OctetStream)
    }
}

/// An encoded payload, ready for either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 body: plain text or JSON.
    Text {
        /// The body.
        body: String,
        /// `PlainText` or `Json`.
        content_type: ContentType,
    },
    /// A binary body.
    Binary(Vec<u8>),
}

impl Frame {
    /// Encodes `payload`, JSON-serializing structured values.
    ///
    /// # Errors
    /// `ChannelError::Encode` if a structured value cannot be serialized.
    pub fn encode(payload: Payload) -> Result<Self, ChannelError> {
        Ok(match payload {
            Payload::Binary(bytes) => Frame::Binary(bytes),
            Payload::Text(body) => Frame::Text {
                body,
                content_type: ContentType::PlainText,
            },
            Payload::Structured(value) => Frame::Text {
                body: serde_json::to_string(&value)?,
                content_type: ContentType::Json,
            },
        })
    }

    /// The content type of the body.
    pub fn content_type(&self) -> ContentType {
        match self {
            Frame::Text { content_type, .. } => *content_type,
            Frame::Binary(_) => ContentType::OctetStream,
        }
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text { body, .. } => body.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    /// `true` for an empty body.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the frame, returning its raw body.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Frame::Text { body, .. } => body.into_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_type_follows_payload_variant() {
        assert_eq!(
            Payload::Binary(vec![1, 2, 3]).content_type().as_mime(),
            "application/octet-stream"
        );
        assert_eq!(Payload::from("cpu=0.4").content_type().as_mime(), "text/plain");
        assert_eq!(
            Payload::from(json!({"cpu": 0.4})).content_type().as_mime(),
            "application/json"
        );
    }

    #[test]
    fn structured_payload_is_json_encoded() {
        let frame = Frame::encode(Payload::from(json!({"sessions": 3, "healthy": true}))).unwrap();
        assert_eq!(frame.content_type(), ContentType::Json);
        match frame {
            Frame::Text { body, .. } => {
                let back: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(back, json!({"sessions": 3, "healthy": true}));
            }
            Frame::Binary(_) => panic!("structured payload must encode as text"),
        }
    }

    #[test]
    fn text_and_binary_pass_through_untouched() {
        let text = Frame::encode(Payload::from("uptime 42")).unwrap();
        assert_eq!(text.content_type(), ContentType::PlainText);
        assert_eq!(text.clone().into_bytes(), b"uptime 42".to_vec());

        let bin = Frame::encode(Payload::Binary(vec![0, 159, 146, 150])).unwrap();
        assert_eq!(bin.content_type(), ContentType::OctetStream);
        assert!(!bin.content_type().is_textual());
        assert_eq!(bin.len(), 4);
    }

    #[test]
    fn serializable_structs_become_structured() {
        #[derive(Serialize)]
        struct Snapshot {
            pid: u32,
            host: &'static str,
        }
        let payload = Payload::structured(&Snapshot { pid: 7, host: "edge-1" }).unwrap();
        assert_eq!(payload, Payload::Structured(json!({"pid": 7, "host": "edge-1"})));
    }
}
