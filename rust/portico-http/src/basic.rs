//! HTTP Basic authentication over the `plain` algorithm.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use portico_affordance::{ProcessAffordanceSet, TokenMap, TokenNames, USet};
use portico_auth::{
    AuthError, Clerk, Exchange, InputSource, OutputTarget, RequestAuthInfo, Scanner,
    TokenHandler, Unauthenticated,
};

use crate::header::send_challenge;
use crate::{Challenge, split_scheme};

fn challenge(exchange: &mut Exchange<'_>, realm: &str) -> Result<(), AuthError> {
    send_challenge(exchange, &Challenge::new("Basic").quoted("realm", realm))
}

/// Challenges with `WWW-Authenticate: Basic realm="…"`.
#[derive(Debug, Clone)]
pub struct BasicClerk {
    name: String,
}

impl BasicClerk {
    /// A clerk called `basic`.
    pub fn new() -> Self {
        Self {
            name: "basic".into(),
        }
    }
}

impl Default for BasicClerk {
    fn default() -> Self {
        Self::new()
    }
}

http_connector!(BasicClerk, "plain");

impl TokenHandler for BasicClerk {
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
        let realm = affordances
            .realms
            .first()?
            .cloned()
            .ok_or_else(|| AuthError::internal("no realm to challenge for"))?;
        challenge(exchange, &realm)?;
        Err(Unauthenticated::tokens_not_given().with_realm(realm).into())
    }
}

impl Clerk for BasicClerk {
    fn confirm_auth_info(
        &self,
        info: &RequestAuthInfo,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if info.is_accepted() {
            return Ok(());
        }
        let mut rejection = Unauthenticated::tokens_not_accepted().with_affordances(affordances.clone());
        if let Some(realm) = info.realm.as_deref() {
            challenge(exchange, realm)?;
            rejection = rejection.with_realm(realm);
        }
        Err(rejection.into())
    }
}

/// Reads `Authorization: Basic base64(user:password)`.
#[derive(Debug, Clone)]
pub struct BasicScanner {
    name: String,
}

impl BasicScanner {
    /// A scanner called `basic`.
    pub fn new() -> Self {
        Self {
            name: "basic".into(),
        }
    }

    fn credentials(header: &str) -> Option<(String, String)> {
        let (scheme, encoded) = split_scheme(header)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

impl Default for BasicScanner {
    fn default() -> Self {
        Self::new()
    }
}

http_connector!(BasicScanner, "plain");

impl TokenHandler for BasicScanner {
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
        USet::single(TokenNames::new())
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(TokenNames::from(["user", "password"]))
    }

    fn handle_tokens(
        &self,
        _input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let header = exchange
            .request()
            .header(&AUTHORIZATION)
            .ok_or(AuthError::NoValidTokensScanned)?;
        let Some((user, password)) = Self::credentials(header) else {
            tracing::debug!(scanner = %self.name, "ignoring malformed basic credentials");
            return Err(AuthError::NoValidTokensScanned);
        };
        let tokens = [("user", user), ("password", password)].into_iter().collect();
        Ok(RequestAuthInfo::new(tokens))
    }
}

impl Scanner for BasicScanner {}
