use std::fmt;

use hyper::body::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Payload kind, used for the `Content-Type` header of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Text,
    Json,
    Html,
    Binary,
}

impl ContentKind {
    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Text => "text/plain",
            ContentKind::Json => "application/json",
            ContentKind::Html => "text/html",
            ContentKind::Binary => "application/octet-stream",
        }
    }

    /// Classifies an inbound `Content-Type` value. Unknown types are treated
    /// as text.
    pub(crate) fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || mime.ends_with("+json") {
            ContentKind::Json
        } else if mime == "text/html" {
            ContentKind::Html
        } else if mime == "application/octet-stream" {
            ContentKind::Binary
        } else {
            ContentKind::Text
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A request or response body together with its content kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Data {
    bytes: Bytes,
    kind: ContentKind,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Bytes>, kind: ContentKind) -> Self {
        Data {
            bytes: bytes.into(),
            kind,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Data::from_bytes(text, ContentKind::Text)
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        *self = Data::text(text);
    }

    pub fn set_html(&mut self, html: impl Into<String>) {
        let html: String = html.into();
        *self = Data::from_bytes(html, ContentKind::Html);
    }

    pub fn set_bytes(&mut self, bytes: impl Into<Bytes>) {
        *self = Data::from_bytes(bytes, ContentKind::Binary);
    }

    /// Serializes `value` as the JSON payload.
    ///
    /// # Errors
    /// Returns the serializer error; the previous payload is kept in that case.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> serde_json::Result<()> {
        let encoded = serde_json::to_vec(value)?;
        *self = Data::from_bytes(encoded, ContentKind::Json);
        Ok(())
    }

    /// Parses the payload as JSON, whatever its declared kind.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.bytes)
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
