use super::request::{Request, RequestDestination, RequestMode};

/// What kind of request the router is looking at. Each variant maps to one
/// strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not HTTP; the router stays out of the way.
    Ignored,
    Navigation,
    StaticAsset,
    Image,
    ApiData,
    Other,
}

impl RequestClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestClass::Ignored => "ignored",
            RequestClass::Navigation => "navigation",
            RequestClass::StaticAsset => "static_asset",
            RequestClass::Image => "image",
            RequestClass::ApiData => "api_data",
            RequestClass::Other => "other",
        }
    }
}

/// First matching rule wins.
pub fn classify(request: &Request) -> RequestClass {
    if !request.is_http() {
        return RequestClass::Ignored;
    }
    if request.mode == RequestMode::Navigate {
        return RequestClass::Navigation;
    }
    match request.destination {
        RequestDestination::Style | RequestDestination::Script | RequestDestination::Font => {
            return RequestClass::StaticAsset;
        }
        RequestDestination::Image => return RequestClass::Image,
        _ => {}
    }
    let path = request.path();
    if path.contains("/api/") || path.contains("/data/") {
        return RequestClass::ApiData;
    }
    RequestClass::Other
}
