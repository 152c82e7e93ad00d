use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

const OFFLINE_IMAGE_SVG: &str = concat!(
    "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"200\" viewBox=\"0 0 200 200\">",
    "<rect width=\"200\" height=\"200\" fill=\"#f0f0f0\"/>",
    "<text x=\"100\" y=\"105\" text-anchor=\"middle\" font-family=\"sans-serif\" ",
    "font-size=\"16\" fill=\"#999\">Sin conexi\u{f3}n</text>",
    "</svg>"
);

/// A fully buffered response.
///
/// The body is an owned immutable buffer, so a clone is an independent copy:
/// one can go back to the page while the other is written to a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body)
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), Bytes::new())
    }

    /// Empty-bodied 404 used when neither cache nor network can answer.
    pub fn not_found() -> Self {
        Self::empty(StatusCode::NOT_FOUND)
    }

    /// Placeholder served for images when no offline image has been cached.
    pub fn offline_image_placeholder() -> Self {
        Self::ok(OFFLINE_IMAGE_SVG).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("image/svg+xml"),
        )
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }
}
