//! Engine-agnostic request and response model.
//!
//! Requests are translated from hyper's request parts and collected body;
//! responses are built by handlers and converted back into hyper responses
//! by the worker that received the request.

mod data;
mod header;
mod request;
mod response;
mod uri;

pub use self::data::{ContentKind, Data};
pub use self::header::{Header, CLIENT};
pub use self::request::Request;
pub use self::response::Response;
pub use self::uri::Uri;

pub use hyper::body::Bytes;
pub use hyper::{Method, StatusCode};
