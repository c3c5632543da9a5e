use std::net::SocketAddr;

use hyper::body::Bytes;
use hyper::http::request::Parts;
use hyper::Method;

use super::data::{ContentKind, Data};
use super::header::{Header, CLIENT};
use super::uri::Uri;

/// An inbound HTTP request, detached from the engine that received it.
///
/// Handlers see requests through a shared reference; only the dispatcher
/// writes to the [`Uri`] to record the capture groups of the matched route.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    header: Header,
    data: Data,
}

impl Request {
    /// Creates a request for `method` and `url` with no headers and an empty
    /// body. Useful for exercising handlers without a socket.
    pub fn new(method: Method, url: &str) -> Self {
        Request {
            method,
            uri: Uri::parse(url),
            header: Header::new(),
            data: Data::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.header.set(name, value);
        self
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    /// Translates the parts of a hyper request plus its collected body.
    ///
    /// The peer IP address is recorded under the synthetic `client` header.
    pub(crate) fn from_parts(parts: &Parts, body: Bytes, peer: SocketAddr) -> Self {
        let mut header = Header::from_hyper(&parts.headers);
        header.set(CLIENT, peer.ip().to_string());

        let kind = header
            .get("content-type")
            .map(ContentKind::from_content_type)
            .unwrap_or_default();

        let request = Request {
            method: parts.method.clone(),
            uri: Uri::from_hyper(&parts.uri),
            header,
            data: Data::from_bytes(body, kind),
        };

        log::info!(
            "HTTP request {} {} from client {}",
            request.method,
            request.uri.url(),
            request.client()
        );
        if !request.data.is_empty() {
            log::debug!("Request body size: {}", request.data.len());
        }

        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub(crate) fn uri_mut(&mut self) -> &mut Uri {
        &mut self.uri
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// The peer address, or an empty string for requests built in memory.
    pub fn client(&self) -> &str {
        self.header.get(CLIENT).unwrap_or("")
    }
}
