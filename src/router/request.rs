use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

const SEC_FETCH_MODE: &str = "sec-fetch-mode";
const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// Request mode as reported by the page (`Sec-Fetch-Mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
    WebSocket,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Self::Navigate,
            "same-origin" => Self::SameOrigin,
            "cors" => Self::Cors,
            "websocket" => Self::WebSocket,
            _ => Self::NoCors,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::NoCors => "no-cors",
            Self::Cors => "cors",
            Self::WebSocket => "websocket",
        }
    }
}

/// Request destination as reported by the page (`Sec-Fetch-Dest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    /// Plain `fetch()`/XHR calls carry no destination.
    #[default]
    Empty,
    Document,
    Style,
    Script,
    Font,
    Image,
    Manifest,
    Audio,
    Video,
    Worker,
    Other,
}

impl RequestDestination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "empty" => Self::Empty,
            "document" | "iframe" | "frame" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "font" => Self::Font,
            "image" => Self::Image,
            "manifest" => Self::Manifest,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "worker" | "sharedworker" | "serviceworker" => Self::Worker,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Document => "document",
            Self::Style => "style",
            Self::Script => "script",
            Self::Font => "font",
            Self::Image => "image",
            Self::Manifest => "manifest",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Worker => "worker",
            Self::Other => "other",
        }
    }
}

/// An intercepted request.
///
/// The URI is either absolute (`https://fonts.googleapis.com/...`) or
/// origin-relative (`/css/styles.css`); relative URIs belong to the site origin
/// and are resolved by the [`Fetcher`](super::fetch::Fetcher).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub mode: RequestMode,
    pub destination: RequestDestination,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            mode: RequestMode::default(),
            destination: RequestDestination::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: &str) -> Result<Self, http::uri::InvalidUri> {
        let uri = url.parse::<Uri>()?;
        Ok(Self::new(Method::GET, uri))
    }

    /// Builds a request from fetch metadata headers, the way a browser tags
    /// outgoing requests.
    pub fn from_fetch_metadata(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let mode = headers
            .get(SEC_FETCH_MODE)
            .and_then(|value| value.to_str().ok())
            .map(RequestMode::from_header)
            .unwrap_or_default();
        let destination = headers
            .get(SEC_FETCH_DEST)
            .and_then(|value| value.to_str().ok())
            .map(RequestDestination::from_header)
            .unwrap_or_default();
        Self {
            method,
            uri,
            mode,
            destination,
            headers,
            body,
        }
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The cache key for this request, without any fragment.
    pub fn url(&self) -> String {
        let url = self.uri.to_string();
        match url.split_once('#') {
            Some((base, _fragment)) => base.to_string(),
            None => url,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Relative URIs are same-origin HTTP requests.
    pub fn is_http(&self) -> bool {
        match self.uri.scheme_str() {
            None => true,
            Some(scheme) => {
                scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
            }
        }
    }
}
