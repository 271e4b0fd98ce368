//! HTTP digest authentication as in RFC 2617.
//!
//! The algorithm challenges with a server nonce, lets a supplicant look up
//! the user's secret and recomputes the client's digest. It supports the
//! legacy form without `qop`, `auth` and `auth-int`, with either `MD5` or
//! `MD5-sess`. The secret may come from the backend as the plain password
//! (`actual_password`), the hashed A1 (`actual_a1`) or the final digest
//! (`actual_digest`).
//!
//! Rejections answer with a fresh challenge. A challenge is stale when the
//! client computed the right digest with a nonce that is no longer good.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use portico_affordance::{
    ProcessAffordanceSet, ProvisionSet, SECPROV_CLIENT_AUTH, SECPROV_CLIENT_ENCRYPTED_SECRET,
    SECPROV_CLIENT_NEVER_SENDS_SECRET, SECPROV_CLIENT_NONCE, SECPROV_REQUEST_ENTITY_INTEGRITY,
    SECPROV_SERVER_NONCE, SECPROV_SERVER_NONCE_PER_REQUEST, SECPROV_SERVER_NONCE_PER_RESOURCE,
    SECPROV_SERVER_NONCE_USE_COUNT, TokenMap, TokenNames, USet,
};
use serde::{Deserialize, Serialize};

use crate::{
    Algorithm, AuthError, CurrentRequest, Exchange, InputSource, NoncePolicy, NonceStatus,
    NonceTable, OutputTarget, PhaseSpec, RequestAuthInfo,
};

/// A digest quality of protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DigestQop {
    /// Authentication only.
    #[serde(rename = "auth")]
    Auth,
    /// Authentication with request body integrity.
    #[serde(rename = "auth-int")]
    AuthInt,
}

impl DigestQop {
    /// The name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthInt => "auth-int",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "auth" => Some(Self::Auth),
            "auth-int" => Some(Self::AuthInt),
            _ => None,
        }
    }
}

/// How A1 is built.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DigestHash {
    /// `H(user:realm:password)`.
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    /// `H(H(user:realm:password):nonce:cnonce)`.
    #[serde(rename = "MD5-sess")]
    Md5Sess,
}

impl DigestHash {
    /// The name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
        }
    }

    /// Parses a wire name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("md5") {
            Some(Self::Md5)
        } else if name.eq_ignore_ascii_case("md5-sess") {
            Some(Self::Md5Sess)
        } else {
            None
        }
    }
}

/// Digest tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    /// How long a server nonce is good for.
    pub server_nonce_lifespan: Duration,
    /// How often the key nonces are derived from is replaced.
    pub private_key_lifespan: Duration,
    /// The qualities of protection offered. Without any, only the legacy
    /// form is spoken.
    pub qop: Vec<DigestQop>,
    /// The A1 construction announced in challenges.
    pub digest_algorithm: DigestHash,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            server_nonce_lifespan: Duration::from_secs(60),
            private_key_lifespan: Duration::from_secs(3600),
            qop: vec![DigestQop::Auth, DigestQop::AuthInt],
            digest_algorithm: DigestHash::Md5,
        }
    }
}

const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new("solicit_creds", InputSource::Start, OutputTarget::Clerk),
    PhaseSpec::new(
        "verify_creds_with_backend",
        InputSource::Scanner,
        OutputTarget::Supplicant,
    ),
    PhaseSpec::new(
        "verify_backend_response",
        InputSource::Supplicant,
        OutputTarget::End,
    ),
];

const CHALLENGE_TOKENS: &[&str] = &[
    "realm",
    "space_uris",
    "server_nonce",
    "qop",
    "digest_algorithm",
];

const RESPONSE_TOKENS: &[&str] = &["user", "realm", "server_nonce", "digest_uri", "digest"];

const QOP_RESPONSE_TOKENS: &[&str] = &["client_nonce", "server_nonce_use_count", "qop"];

const SECRET_TOKENS: &[&str] = &["actual_password", "actual_a1", "actual_digest"];

const ENTITY_HASH_TOKEN: &str = "request_entity_hash";

fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data))
}

fn legacy_provisions() -> ProvisionSet {
    SECPROV_CLIENT_AUTH
        | SECPROV_CLIENT_ENCRYPTED_SECRET
        | SECPROV_CLIENT_NEVER_SENDS_SECRET
        | SECPROV_SERVER_NONCE
}

fn qop_provisions(qop: Option<DigestQop>) -> ProvisionSet {
    match qop {
        None => legacy_provisions(),
        Some(DigestQop::Auth) => {
            legacy_provisions() | SECPROV_SERVER_NONCE_USE_COUNT | SECPROV_CLIENT_NONCE
        }
        Some(DigestQop::AuthInt) => {
            qop_provisions(Some(DigestQop::Auth)) | SECPROV_REQUEST_ENTITY_INTEGRITY
        }
    }
}

fn nonce_provisions(policy: NoncePolicy) -> ProvisionSet {
    let mut provisions = ProvisionSet::empty();
    if policy.per_resource || policy.per_request {
        provisions |= SECPROV_SERVER_NONCE_PER_RESOURCE;
    }
    if policy.per_request {
        provisions |= SECPROV_SERVER_NONCE_PER_REQUEST;
    }
    provisions
}

fn names(groups: &[&[&str]]) -> TokenNames {
    groups.iter().flat_map(|group| group.iter().copied()).collect()
}

/// The parameters a digest is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestInputs<'a> {
    /// The request method.
    pub method: &'a str,
    /// The request URI as the client sent it.
    pub uri: &'a str,
    /// The user name.
    pub user: &'a str,
    /// The realm.
    pub realm: &'a str,
    /// The server nonce.
    pub nonce: &'a str,
    /// The quality of protection, absent in the legacy form.
    pub qop: Option<&'a str>,
    /// The nonce count, as eight hex digits.
    pub nonce_count: Option<&'a str>,
    /// The client nonce.
    pub client_nonce: Option<&'a str>,
    /// The A1 construction.
    pub algorithm: DigestHash,
    /// `H(body)`, needed for `auth-int`.
    pub entity_hash: Option<&'a str>,
}

impl DigestInputs<'_> {
    /// `H(user:realm:password)`.
    pub fn a1_hash(&self, password: &str) -> String {
        md5_hex(format!("{}:{}:{password}", self.user, self.realm))
    }

    /// The expected `response` given `H(user:realm:password)`.
    pub fn response(&self, a1_hash: &str) -> String {
        let client_nonce = self.client_nonce.unwrap_or_default();
        let ha1 = match self.algorithm {
            DigestHash::Md5 => a1_hash.to_string(),
            DigestHash::Md5Sess => md5_hex(format!("{a1_hash}:{}:{client_nonce}", self.nonce)),
        };
        let ha2 = match self.qop {
            Some("auth-int") => md5_hex(format!(
                "{}:{}:{}",
                self.method,
                self.uri,
                self.entity_hash.unwrap_or_default()
            )),
            _ => md5_hex(format!("{}:{}", self.method, self.uri)),
        };
        match self.qop {
            Some(qop) => md5_hex(format!(
                "{ha1}:{}:{}:{client_nonce}:{qop}:{ha2}",
                self.nonce,
                self.nonce_count.unwrap_or_default()
            )),
            None => md5_hex(format!("{ha1}:{}:{ha2}", self.nonce)),
        }
    }
}

/// The `digest` algorithm.
#[derive(Debug)]
pub struct DigestAlgorithm {
    settings: DigestSettings,
    nonces: NonceTable,
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        Self::new(DigestSettings::default())
    }
}

impl DigestAlgorithm {
    /// A digest algorithm with its own nonce table.
    pub fn new(settings: DigestSettings) -> Self {
        let nonces = NonceTable::new(settings.server_nonce_lifespan, settings.private_key_lifespan);
        Self { settings, nonces }
    }

    /// The settings.
    pub fn settings(&self) -> &DigestSettings {
        &self.settings
    }

    /// The issued nonces.
    pub fn nonces(&self) -> &NonceTable {
        &self.nonces
    }

    fn offers(&self, qop: DigestQop) -> bool {
        self.settings.qop.contains(&qop)
    }

    /// The response tokens a client must send under `provisionsets`.
    fn response_names(&self, provisionsets: &USet<ProvisionSet>) -> TokenNames {
        if provisionsets.all_gte(&qop_provisions(Some(DigestQop::Auth))) {
            names(&[RESPONSE_TOKENS, QOP_RESPONSE_TOKENS])
        } else {
            names(&[RESPONSE_TOKENS])
        }
    }

    /// The qualities of protection acceptable under `provisionsets`.
    fn acceptable_qops(&self, provisionsets: &USet<ProvisionSet>) -> Vec<DigestQop> {
        [DigestQop::Auth, DigestQop::AuthInt]
            .into_iter()
            .filter(|qop| self.offers(*qop))
            .filter(|qop| provisionsets.any_gte(&qop_provisions(Some(*qop))))
            .filter(|qop| {
                *qop == DigestQop::AuthInt
                    || !provisionsets.all_gte(&SECPROV_REQUEST_ENTITY_INTEGRITY.into())
            })
            .collect()
    }

    fn challenge(
        &self,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &Exchange<'_>,
        stale: Option<bool>,
    ) -> Result<TokenMap, AuthError> {
        let realm = match affordances.realms.first()? {
            Some(realm) => realm.clone(),
            None => {
                return Err(AuthError::internal("no realm to issue a digest challenge for"));
            }
        };
        let request = exchange.request();
        let nonce = self
            .nonces
            .issue(request.loc(), &entity_tag(request), request.timestamp());

        let mut tokens = TokenMap::new();
        tokens.insert("realm", realm);
        let space_uris = match exchange.space() {
            Some(space) => space.locs.join(" "),
            None => request.loc().to_string(),
        };
        tokens.insert("space_uris", space_uris);
        tokens.insert("server_nonce", nonce);
        let qops: Vec<&str> = self
            .acceptable_qops(&affordances.provisionsets)
            .into_iter()
            .map(DigestQop::name)
            .collect();
        if !qops.is_empty() {
            tokens.insert("qop", qops.join(","));
        }
        tokens.insert("digest_algorithm", self.settings.digest_algorithm.name());
        if let Some(stale) = stale {
            tokens.insert("stale", if stale { "true" } else { "false" });
        }
        if let Some(opaque) = input.opaque() {
            tokens.insert(portico_affordance::OPAQUE_TOKEN, opaque);
        }
        Ok(tokens)
    }

    fn reject(
        &self,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &Exchange<'_>,
        stale: bool,
    ) -> Result<RequestAuthInfo, AuthError> {
        let tokens = self.challenge(input, affordances, exchange, Some(stale))?;
        Ok(RequestAuthInfo::new(tokens).with_accepted(false))
    }

    fn verify(
        &self,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        input.require_all(RESPONSE_TOKENS.iter().copied())?;
        let user = input.require("user")?;
        let realm = input.require("realm")?;
        let nonce = input.require("server_nonce")?;
        let request = exchange.request();
        let provisionsets = &affordances.provisionsets;

        let qop = match input.get("qop") {
            None => None,
            Some(name) => match DigestQop::parse(name) {
                Some(qop) => Some(qop),
                None => {
                    tracing::debug!(user, qop = name, "unknown digest qop");
                    return self.reject(input, affordances, exchange, false);
                }
            },
        };
        let qop_acceptable = match qop {
            None => !provisionsets.all_gte(&qop_provisions(Some(DigestQop::Auth))),
            Some(qop) => self.acceptable_qops(provisionsets).contains(&qop),
        };
        if !qop_acceptable || !affordances.realms.contains(realm) {
            tracing::debug!(user, realm, ?qop, "digest response does not meet the affordances");
            return self.reject(input, affordances, exchange, false);
        }

        let count = match qop {
            None => None,
            Some(_) => {
                input.require_all(QOP_RESPONSE_TOKENS.iter().copied())?;
                let count = input.require("server_nonce_use_count")?;
                match u64::from_str_radix(count, 16) {
                    Ok(count) => Some(count),
                    Err(_) => {
                        tracing::debug!(user, count, "malformed nonce count");
                        return self.reject(input, affordances, exchange, false);
                    }
                }
            }
        };

        let matches = match self.expected_digest(input, request)? {
            Some(expected) => expected.eq_ignore_ascii_case(input.require("digest")?),
            None => false,
        };
        let policy = NoncePolicy::required_by(provisionsets);
        let status = self.nonces.check(
            nonce,
            request.loc(),
            &entity_tag(request),
            request.timestamp(),
            policy,
            count,
        );
        tracing::debug!(user, matches, ?status, "verified digest response");

        match (matches, status) {
            (true, NonceStatus::Fresh) => {
                self.nonces.record_use(nonce, count);
                let mut tokens = input.clone();
                for secret in SECRET_TOKENS {
                    tokens.remove(secret);
                }
                Ok(RequestAuthInfo::new(tokens)
                    .with_provisions(qop_provisions(qop) | nonce_provisions(policy))
                    .with_accepted(true))
            }
            (_, NonceStatus::Replay) => {
                tracing::warn!(user, "digest nonce count did not increase");
                self.nonces.invalidate(nonce);
                self.reject(input, affordances, exchange, false)
            }
            (true, NonceStatus::Stale) => {
                self.nonces.invalidate(nonce);
                self.reject(input, affordances, exchange, true)
            }
            (false, _) => self.reject(input, affordances, exchange, false),
        }
    }

    /// The digest the client should have sent, if the backend supplied
    /// anything to compute it from.
    fn expected_digest(
        &self,
        input: &TokenMap,
        request: &dyn CurrentRequest,
    ) -> Result<Option<String>, AuthError> {
        if let Some(digest) = input.get("actual_digest") {
            return Ok(Some(digest.to_string()));
        }
        let algorithm = match input.get("digest_algorithm") {
            None => DigestHash::Md5,
            Some(name) => match DigestHash::parse(name) {
                Some(algorithm) => algorithm,
                None => return Ok(None),
            },
        };
        let entity_hash = match input.get(ENTITY_HASH_TOKEN) {
            Some(hash) => hash.to_string(),
            None => md5_hex(request.body()),
        };
        let inputs = DigestInputs {
            method: request.method().as_str(),
            uri: input.require("digest_uri")?,
            user: input.require("user")?,
            realm: input.require("realm")?,
            nonce: input.require("server_nonce")?,
            qop: input.get("qop"),
            nonce_count: input.get("server_nonce_use_count"),
            client_nonce: input.get("client_nonce"),
            algorithm,
            entity_hash: Some(&entity_hash),
        };
        let a1_hash = match (input.get("actual_a1"), input.get("actual_password")) {
            (Some(a1_hash), _) => a1_hash.to_string(),
            (None, Some(password)) => inputs.a1_hash(password),
            (None, None) => return Ok(None),
        };
        Ok(Some(inputs.response(&a1_hash)))
    }
}

/// The entity tag nonces are bound to; the location stands in when the
/// resource has none.
fn entity_tag(request: &dyn CurrentRequest) -> String {
    match request.etag() {
        Some(etag) => etag.to_string(),
        None => STANDARD.encode(request.loc()),
    }
}

impl Algorithm for DigestAlgorithm {
    fn name(&self) -> &str {
        "digest"
    }

    fn phases(&self) -> &[PhaseSpec] {
        PHASES
    }

    fn provisionsets(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet> {
        let qops = [None, Some(DigestQop::Auth), Some(DigestQop::AuthInt)];
        let nonce_policies = [
            NoncePolicy::default(),
            NoncePolicy {
                per_resource: true,
                per_request: false,
            },
            NoncePolicy {
                per_resource: true,
                per_request: true,
            },
        ];
        qops.into_iter()
            .filter(|qop| qop.is_none_or(|qop| self.offers(qop)))
            .flat_map(|qop| {
                nonce_policies
                    .into_iter()
                    .map(move |policy| qop_provisions(qop) | nonce_provisions(policy))
            })
            .collect()
    }

    fn phase_inputs(
        &self,
        index: usize,
        upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        match index {
            0 => USet::single(TokenNames::new()),
            1 => USet::single(self.response_names(&upstream.provisionsets)),
            2 => {
                let response = self.response_names(&upstream.provisionsets);
                SECRET_TOKENS
                    .iter()
                    .map(|secret| {
                        let mut names = response.clone();
                        names.insert(*secret);
                        names
                    })
                    .collect()
            }
            _ => USet::empty(),
        }
    }

    fn phase_outputs(
        &self,
        index: usize,
        upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        match index {
            0 => USet::single(names(&[CHALLENGE_TOKENS])),
            1 => USet::single(self.response_names(&upstream.provisionsets)),
            2 => USet::single(TokenNames::from(["accepted"])),
            _ => USet::empty(),
        }
    }

    fn process_phase(
        &self,
        index: usize,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        match index {
            0 => Ok(RequestAuthInfo::new(
                self.challenge(input, affordances, exchange, None)?,
            )),
            1 => {
                let mut tokens = input.clone();
                if input.get("qop") == Some(DigestQop::AuthInt.name())
                    && !tokens.contains(ENTITY_HASH_TOKEN)
                {
                    tokens.insert(ENTITY_HASH_TOKEN, md5_hex(exchange.request().body()));
                }
                Ok(RequestAuthInfo::new(tokens))
            }
            2 => self.verify(input, affordances, exchange),
            _ => Err(AuthError::internal(format!("digest has no phase {index}"))),
        }
    }
}
