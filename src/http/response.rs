use hyper::{Body, StatusCode};

use super::data::Data;
use super::header::Header;

/// An outgoing HTTP response.
///
/// Starts as `200 OK` with an empty text body and a permissive CORS header.
/// A handler fills it in; the worker then converts it with
/// [`Response::into_hyper`], which consumes it, so it is sent exactly once.
#[derive(Debug, Clone)]
pub struct Response {
    code: StatusCode,
    header: Header,
    data: Data,
    client: String,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        let mut header = Header::new();
        header.set("Access-Control-Allow-Origin", "*");

        Response {
            code: StatusCode::OK,
            header,
            data: Data::new(),
            client: String::new(),
        }
    }

    /// A response addressed to `client`, which is only used for logging.
    pub(crate) fn for_client(client: &str) -> Self {
        Response {
            client: client.to_string(),
            ..Response::new()
        }
    }

    pub fn set_code(&mut self, code: StatusCode) {
        self.code = code;
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Data {
        &mut self.data
    }

    /// Sets `code` and a JSON body `{"message": <message>}`.
    pub fn set_error(&mut self, code: StatusCode, message: &str) {
        self.code = code;
        if let Err(e) = self
            .data
            .set_json(&serde_json::json!({ "message": message }))
        {
            log::error!("Failed to encode error message: {}", e);
        }
    }

    /// Serializes the response for hyper.
    ///
    /// The `Content-Type` header is derived from the payload kind here,
    /// replacing any value a handler may have set.
    pub fn into_hyper(mut self) -> hyper::Response<Body> {
        log::info!(
            "HTTP response {} to client {}",
            self.code.as_u16(),
            self.client
        );

        self.header.set(
            "Content-Type",
            format!("{}; charset=UTF-8", self.data.kind().mime()),
        );

        let mut response = hyper::Response::new(Body::from(self.data.into_bytes()));
        *response.status_mut() = self.code;
        self.header.write_to(response.headers_mut());
        response
    }
}
