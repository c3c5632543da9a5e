use std::collections::BTreeMap;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

/// Name of the synthetic request header holding the peer address.
pub const CLIENT: &str = "client";

/// A case-insensitive header map with last-write-wins semantics.
///
/// Names are stored lowercased. Inbound headers repeated on the wire collapse
/// to the value that arrived last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: BTreeMap<String, String>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies hyper's header map. Values that are not valid UTF-8 are
    /// converted lossily.
    pub(crate) fn from_hyper(map: &HeaderMap) -> Self {
        let mut header = Header::new();
        for (name, value) in map {
            header.set(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        header
    }

    /// Returns the value of `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every entry into an outgoing hyper header map. Entries that are
    /// not valid HTTP header names or values are skipped with a warning.
    pub(crate) fn write_to(&self, map: &mut HeaderMap) {
        for (name, value) in &self.entries {
            let parsed = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => log::warn!("Skipping invalid response header {:?}: {:?}", name, value),
            }
        }
    }
}
