use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use http::header::AsHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::RequestAuthInfo;

/// The in-flight request, as seen by authentication.
///
/// The HTTP layer implements this over its own request type.
pub trait CurrentRequest: Debug {
    /// The request path.
    fn loc(&self) -> &str;

    /// The request method.
    fn method(&self) -> &Method;

    /// When the request was received.
    fn timestamp(&self) -> SystemTime;

    /// The media ranges the client accepts, in preference order.
    fn acceptable_mediaranges(&self) -> &[String] {
        &[]
    }

    /// The request headers.
    fn headers(&self) -> &HeaderMap;

    /// The first value of a request header, if it is visible ASCII.
    fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// A request cookie.
    fn cookie(&self, name: &str) -> Option<&str>;

    /// A method argument taken from the query or a form body.
    fn method_arg(&self, name: &str) -> Option<&str>;

    /// The request body.
    fn body(&self) -> &[u8] {
        &[]
    }

    /// The entity tag of the addressed resource, if known.
    fn etag(&self) -> Option<&str> {
        None
    }
}

/// A cookie change the response must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    /// Set a cookie.
    Set {
        /// The cookie name.
        name: String,
        /// The cookie value.
        value: String,
        /// How long the client should keep it.
        max_age: Option<Duration>,
    },
    /// Expire a cookie.
    Clear {
        /// The cookie name.
        name: String,
    },
}

/// Headers and cookies that authentication wants on the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDirectives {
    headers: HeaderMap,
    cookies: Vec<CookieDirective>,
}

impl ResponseDirectives {
    /// Appends a header, keeping earlier values of the same name.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Every header added so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The values of the headers called `name`, in insertion order.
    pub fn header_values<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
    }

    /// Sets a cookie.
    pub fn set_cookie(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        max_age: Option<Duration>,
    ) {
        self.cookies.push(CookieDirective::Set {
            name: name.into(),
            value: value.into(),
            max_age,
        });
    }

    /// Expires a cookie.
    pub fn clear_cookie(&mut self, name: impl Into<String>) {
        self.cookies.push(CookieDirective::Clear { name: name.into() });
    }

    /// Every cookie change in insertion order.
    pub fn cookies(&self) -> &[CookieDirective] {
        &self.cookies
    }
}

/// The location patterns of the space that governs the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceBinding {
    /// The space key, i.e. its primary pattern.
    pub key: String,
    /// Every pattern mapped to the space.
    pub locs: Vec<String>,
}

/// Per-request authentication state: the request itself, the response
/// directives produced so far and the current auth info.
#[derive(Debug)]
pub struct Exchange<'r> {
    request: &'r dyn CurrentRequest,
    response: ResponseDirectives,
    auth_info: Option<RequestAuthInfo>,
    space: Option<SpaceBinding>,
}

impl<'r> Exchange<'r> {
    /// Starts an exchange for `request`.
    pub fn new(request: &'r dyn CurrentRequest) -> Self {
        Self {
            request,
            response: ResponseDirectives::default(),
            auth_info: None,
            space: None,
        }
    }

    /// Starts an exchange that already carries auth info, e.g. restored from
    /// an earlier step of the same request.
    pub fn with_auth_info(request: &'r dyn CurrentRequest, auth_info: RequestAuthInfo) -> Self {
        Self {
            auth_info: Some(auth_info),
            ..Self::new(request)
        }
    }

    /// The request.
    pub fn request(&self) -> &'r dyn CurrentRequest {
        self.request
    }

    /// The response directives.
    pub fn response(&self) -> &ResponseDirectives {
        &self.response
    }

    /// Mutable access to the response directives.
    pub fn response_mut(&mut self) -> &mut ResponseDirectives {
        &mut self.response
    }

    /// Consumes the exchange, returning the response directives.
    pub fn into_response(self) -> ResponseDirectives {
        self.response
    }

    /// The current auth info, if negotiation has run.
    pub fn auth_info(&self) -> Option<&RequestAuthInfo> {
        self.auth_info.as_ref()
    }

    pub(crate) fn set_auth_info(&mut self, auth_info: RequestAuthInfo) {
        self.auth_info = Some(auth_info);
    }

    /// The space governing this request, once negotiation has located it.
    pub fn space(&self) -> Option<&SpaceBinding> {
        self.space.as_ref()
    }

    pub(crate) fn set_space(&mut self, space: Option<SpaceBinding>) {
        self.space = space;
    }
}
