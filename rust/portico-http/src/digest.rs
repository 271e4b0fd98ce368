//! HTTP Digest authentication over the `digest` algorithm.

use http::header::AUTHORIZATION;
use portico_affordance::{OPAQUE_TOKEN, ProcessAffordanceSet, TokenMap, TokenNames, USet};
use portico_auth::{
    AuthError, Clerk, Exchange, InputSource, OutputTarget, RequestAuthInfo, Scanner,
    TokenHandler, Unauthenticated,
};

use crate::header::send_challenge;
use crate::{Challenge, parse_auth_params, split_scheme};

/// `Authorization: Digest` parameters and the tokens they carry.
const RESPONSE_FIELDS: &[(&str, &str)] = &[
    ("username", "user"),
    ("realm", "realm"),
    ("nonce", "server_nonce"),
    ("uri", "digest_uri"),
    ("response", "digest"),
    ("algorithm", "digest_algorithm"),
    ("cnonce", "client_nonce"),
    ("nc", "server_nonce_use_count"),
    ("qop", "qop"),
    ("opaque", OPAQUE_TOKEN),
];

/// Renders the challenge tokens of the `digest` algorithm.
fn challenge(tokens: &TokenMap) -> Result<Challenge, AuthError> {
    let mut challenge = Challenge::new("Digest").quoted("realm", tokens.require("realm")?);
    if let Some(domain) = tokens.get("space_uris") {
        challenge = challenge.quoted("domain", domain);
    }
    challenge = challenge.quoted("nonce", tokens.require("server_nonce")?);
    if let Some(opaque) = tokens.opaque() {
        challenge = challenge.quoted("opaque", opaque);
    }
    if let Some(stale) = tokens.get("stale") {
        challenge = challenge.token("stale", stale);
    }
    if let Some(algorithm) = tokens.get("digest_algorithm") {
        challenge = challenge.token("algorithm", algorithm);
    }
    if let Some(qop) = tokens.get("qop") {
        challenge = challenge.quoted("qop", qop);
    }
    Ok(challenge)
}

/// Challenges with `WWW-Authenticate: Digest …`, and again with a fresh
/// nonce whenever a response is rejected.
#[derive(Debug, Clone)]
pub struct DigestClerk {
    name: String,
}

impl DigestClerk {
    /// A clerk called `digest`.
    pub fn new() -> Self {
        Self {
            name: "digest".into(),
        }
    }
}

impl Default for DigestClerk {
    fn default() -> Self {
        Self::new()
    }
}

http_connector!(DigestClerk, "digest");

impl TokenHandler for DigestClerk {
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
        USet::single(TokenNames::from(["realm", "server_nonce"]))
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::Universal
    }

    fn opaque_passthrough(&self) -> bool {
        true
    }

    fn handle_tokens(
        &self,
        input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let realm = input.require("realm")?.to_string();
        send_challenge(exchange, &challenge(input)?)?;
        Err(Unauthenticated::tokens_not_given().with_realm(realm).into())
    }
}

impl Clerk for DigestClerk {
    fn confirm_auth_info(
        &self,
        info: &RequestAuthInfo,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if info.is_accepted() {
            return Ok(());
        }
        if info.tokens.contains("server_nonce") {
            send_challenge(exchange, &challenge(&info.tokens)?)?;
        }
        Err(Unauthenticated::tokens_not_accepted()
            .with_affordances(affordances.clone())
            .into())
    }
}

/// Reads `Authorization: Digest …`.
#[derive(Debug, Clone)]
pub struct DigestScanner {
    name: String,
}

impl DigestScanner {
    /// A scanner called `digest`.
    pub fn new() -> Self {
        Self {
            name: "digest".into(),
        }
    }
}

impl Default for DigestScanner {
    fn default() -> Self {
        Self::new()
    }
}

http_connector!(DigestScanner, "digest");

impl TokenHandler for DigestScanner {
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
        USet::single(
            RESPONSE_FIELDS
                .iter()
                .map(|(_, token)| *token)
                .filter(|token| *token != OPAQUE_TOKEN)
                .collect(),
        )
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
        let params = match split_scheme(header) {
            Some((scheme, params)) if scheme.eq_ignore_ascii_case("digest") => {
                parse_auth_params(params).map_err(|error| {
                    tracing::debug!(scanner = %self.name, %error, "ignoring malformed digest credentials");
                    AuthError::NoValidTokensScanned
                })?
            }
            _ => return Err(AuthError::NoValidTokensScanned),
        };
        let tokens: TokenMap = params
            .into_iter()
            .filter_map(|(name, value)| {
                RESPONSE_FIELDS
                    .iter()
                    .find(|(field, _)| *field == name)
                    .map(|(_, token)| (*token, value))
            })
            .collect();
        if !tokens.contains("user") {
            return Err(AuthError::NoValidTokensScanned);
        }
        Ok(RequestAuthInfo::new(tokens))
    }
}

impl Scanner for DigestScanner {}
