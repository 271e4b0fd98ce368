//! Request doubles and minimal connectors for exercising negotiation without
//! an HTTP layer.

use std::collections::BTreeMap;
use std::time::SystemTime;

use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use portico_affordance::{ProcessAffordanceSet, TokenMap, TokenNames, USet};

use crate::{
    AlgorithmHandler, AuthError, Clerk, CurrentRequest, Exchange, InputSource, OutputTarget,
    Participant, ProvisionSetHandler, RealmHandler, RequestAuthInfo, Scanner, TokenHandler,
    Unauthenticated,
};

/// The response header [`ChallengeClerk`] writes its challenges to.
pub const CHALLENGE_HEADER: HeaderName = HeaderName::from_static("x-challenge");

/// An in-memory request.
#[derive(Debug, Clone)]
pub struct MockRequest {
    loc: String,
    method: Method,
    timestamp: SystemTime,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    args: BTreeMap<String, String>,
    body: Vec<u8>,
    etag: Option<String>,
}

impl MockRequest {
    /// A request for `loc` with `method`, received now.
    pub fn new(method: Method, loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            method,
            timestamp: SystemTime::now(),
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            args: BTreeMap::new(),
            body: Vec::new(),
            etag: None,
        }
    }

    /// A `GET` request.
    pub fn get(loc: impl Into<String>) -> Self {
        Self::new(Method::GET, loc)
    }

    /// A `POST` request.
    pub fn post(loc: impl Into<String>) -> Self {
        Self::new(Method::POST, loc)
    }

    /// Replaces the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replaces the time the request was received.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Appends a header.
    ///
    /// # Panics
    ///
    /// When `value` is not a valid header value.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: impl AsRef<str>) -> Self {
        let value = HeaderValue::from_str(value.as_ref()).expect("valid header value");
        self.headers.append(name, value);
        self
    }

    /// Adds a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Adds a method argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the entity tag of the addressed resource.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

impl CurrentRequest for MockRequest {
    fn loc(&self) -> &str {
        &self.loc
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn method_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// Challenges by writing `"{name} realm={realm}"` to [`CHALLENGE_HEADER`].
#[derive(Debug, Clone)]
pub struct ChallengeClerk {
    name: String,
}

impl ChallengeClerk {
    /// A clerk called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RealmHandler for ChallengeClerk {}

impl ProvisionSetHandler for ChallengeClerk {}

impl AlgorithmHandler for ChallengeClerk {}

impl TokenHandler for ChallengeClerk {
    fn input_source(&self) -> InputSource {
        InputSource::Algorithm
    }

    fn output_target(&self) -> OutputTarget {
        OutputTarget::Scanner
    }

    fn declared_inputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(TokenNames::new())
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::Universal
    }

    fn handle_tokens(
        &self,
        _input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let realm = affordances.realms.first()?.cloned().unwrap_or_default();
        let challenge = HeaderValue::try_from(format!("{} realm={realm}", self.name))
            .map_err(|error| AuthError::configuration(error.to_string()))?;
        exchange
            .response_mut()
            .append_header(CHALLENGE_HEADER, challenge);
        Err(Unauthenticated::tokens_not_given()
            .with_realm(realm)
            .into())
    }
}

impl Participant for ChallengeClerk {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Clerk for ChallengeClerk {}

/// Scans fixed method arguments.
#[derive(Debug, Clone)]
pub struct ArgsScanner {
    name: String,
    names: TokenNames,
}

impl ArgsScanner {
    /// A scanner called `name` that requires every argument in `names`.
    pub fn new<const N: usize>(name: impl Into<String>, names: [&str; N]) -> Self {
        Self {
            name: name.into(),
            names: TokenNames::from(names),
        }
    }
}

impl RealmHandler for ArgsScanner {}

impl ProvisionSetHandler for ArgsScanner {}

impl AlgorithmHandler for ArgsScanner {}

impl TokenHandler for ArgsScanner {
    fn input_source(&self) -> InputSource {
        InputSource::Clerk
    }

    fn output_target(&self) -> OutputTarget {
        OutputTarget::Algorithm
    }

    fn declared_inputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(self.names.clone())
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(self.names.clone())
    }

    fn handle_tokens(
        &self,
        _input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let request = exchange.request();
        let mut tokens = TokenMap::new();
        for name in self.names.iter() {
            let value = request
                .method_arg(name)
                .ok_or(AuthError::NoValidTokensScanned)?;
            tokens.insert(name, value);
        }
        Ok(RequestAuthInfo::new(tokens))
    }
}

impl Participant for ArgsScanner {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Scanner for ArgsScanner {}
