use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, LOCATION, SET_COOKIE, WWW_AUTHENTICATE};
use portico_affordance::{
    AffordanceSet, ProvisionSet, SECPROV_CLIENT_AUTH, SECPROV_SERVER_NONCE,
    SECPROV_SERVER_NONCE_PER_REQUEST, USet,
};
use portico_auth::helpers::MockRequest;
use portico_auth::{
    AuthError, Authenticator, DigestAlgorithm, DigestHash, DigestInputs, Exchange,
    FixedAlgorithm, InMemoryGetPasswordSupplicant, InMemoryPlainSupplicant, InMemorySessionStore,
    SessionRecallSupplicant, SessionSettings, SessionStorageSupplicant, SessionStore, Space,
    UnauthenticatedKind,
};
use portico_http::{
    AuthResponse, BasicClerk, BasicScanner, DigestClerk, DigestScanner, HttpStatus,
    SessionLoginClerk, SessionLoginScanner, SessionRecallClerk, SessionRecallScanner,
    parse_auth_params, split_scheme,
};
use pretty_assertions::assert_eq;
use testresult::TestResult;

const REALM: &str = "example.net";
const LEDGER: &str = "/vault/ledger";

/// Basic on `/`, digest with single use nonces below `/vault`.
fn authenticator() -> Result<Authenticator, AuthError> {
    Authenticator::builder()
        .algorithm(FixedAlgorithm::plain())
        .algorithm(DigestAlgorithm::default())
        .clerk(BasicClerk::new())
        .clerk(DigestClerk::new())
        .scanner(BasicScanner::new())
        .scanner(DigestScanner::new())
        .supplicant(InMemoryPlainSupplicant::new(
            "users",
            REALM,
            [("alice", "correctpw")],
        ))
        .supplicant(InMemoryGetPasswordSupplicant::new(
            "passwords",
            REALM,
            [("alice", "correctpw")],
        ))
        .space(
            ["/"],
            Space::builder()
                .realm(REALM)
                .provisions(SECPROV_CLIENT_AUTH)
                .algorithms(["plain"])
                .build(),
        )
        .space(
            ["/vault"],
            Space::builder()
                .realm(REALM)
                .provisions(SECPROV_SERVER_NONCE_PER_REQUEST)
                .algorithms(["digest"])
                .build(),
        )
        .build()
}

fn basic(user: &str, password: &str) -> MockRequest {
    let credentials = STANDARD.encode(format!("{user}:{password}"));
    MockRequest::get("/private").with_header(AUTHORIZATION, format!("Basic {credentials}"))
}

fn challenge_params(exchange: &Exchange<'_>) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
    let header = exchange
        .response()
        .header_values(WWW_AUTHENTICATE)
        .last()
        .ok_or("no challenge sent")?;
    let (scheme, params) = split_scheme(header).ok_or("empty challenge")?;
    assert_eq!(scheme, "Digest");
    Ok(parse_auth_params(params)?.into_iter().collect())
}

fn digest_response(nonce: &str, count: &str, password: &str) -> MockRequest {
    let inputs = DigestInputs {
        method: "GET",
        uri: LEDGER,
        user: "alice",
        realm: REALM,
        nonce,
        qop: Some("auth"),
        nonce_count: Some(count),
        client_nonce: Some("0a4f113b"),
        algorithm: DigestHash::Md5,
        entity_hash: None,
    };
    let response = inputs.response(&inputs.a1_hash(password));
    MockRequest::get(LEDGER).with_header(
        AUTHORIZATION,
        format!(
            r#"Digest username="alice", realm="{REALM}", nonce="{nonce}", uri="{LEDGER}", qop=auth, nc={count}, cnonce="0a4f113b", response="{response}", algorithm=MD5"#
        ),
    )
}

#[test_log::test]
fn basic_challenges_requests_without_credentials() -> TestResult {
    let authenticator = authenticator()?;
    let request = MockRequest::get("/private");
    let mut exchange = Exchange::new(&request);

    let error = authenticator
        .ensure_auth("/private", &AffordanceSet::max(), &mut exchange)
        .err()
        .ok_or("expected a challenge")?;
    assert_eq!(
        error.as_unauthenticated().map(|error| error.kind),
        Some(UnauthenticatedKind::TokensNotGiven)
    );

    let response = AuthResponse::new(Err(&error), exchange.response())?;
    assert_eq!(response.status, Some(StatusCode::UNAUTHORIZED));
    assert_eq!(
        response.header_values(WWW_AUTHENTICATE).collect::<Vec<_>>(),
        vec![r#"Basic realm="example.net""#]
    );
    Ok(())
}

#[test_log::test]
fn basic_accepts_correct_credentials() -> TestResult {
    let authenticator = authenticator()?;
    let request = basic("alice", "correctpw");
    let mut exchange = Exchange::new(&request);

    authenticator.ensure_auth("/private", &AffordanceSet::max(), &mut exchange)?;
    let info = exchange.auth_info().ok_or("auth info recorded")?;
    assert_eq!(info.accepted, Some(true));
    assert_eq!(info.realm.as_deref(), Some(REALM));
    assert_eq!(info.user(), Some("alice"));
    assert_eq!(info.algorithm.as_deref(), Some("plain"));
    assert_eq!(info.clerk.as_deref(), Some("basic"));
    assert!(exchange.response().headers().is_empty());
    Ok(())
}

#[test_log::test]
fn basic_rejects_a_wrong_password() -> TestResult {
    let authenticator = authenticator()?;
    let request = basic("alice", "wrongpw");
    let mut exchange = Exchange::new(&request);

    let error = authenticator
        .ensure_auth("/private", &AffordanceSet::max(), &mut exchange)
        .err()
        .ok_or("expected a rejection")?;
    assert_eq!(
        error.as_unauthenticated().map(|error| error.kind),
        Some(UnauthenticatedKind::TokensNotAccepted)
    );
    assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        exchange
            .response()
            .header_values(WWW_AUTHENTICATE)
            .collect::<Vec<_>>(),
        vec![r#"Basic realm="example.net""#]
    );
    Ok(())
}

#[test_log::test]
fn digest_nonces_are_single_use_when_required() -> TestResult {
    let authenticator = authenticator()?;

    let request = MockRequest::get(LEDGER);
    let mut exchange = Exchange::new(&request);
    let error = authenticator
        .ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange)
        .err()
        .ok_or("expected a challenge")?;
    assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
    let challenge = challenge_params(&exchange)?;
    assert_eq!(challenge.get("realm").map(String::as_str), Some(REALM));
    assert_eq!(challenge.get("domain").map(String::as_str), Some("/vault"));
    assert_eq!(challenge.get("qop").map(String::as_str), Some("auth,auth-int"));
    assert_eq!(challenge.get("stale"), None);
    let nonce = challenge.get("nonce").ok_or("challenge carries a nonce")?.clone();

    let request = digest_response(&nonce, "00000001", "correctpw");
    let mut exchange = Exchange::new(&request);
    authenticator.ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange)?;
    let info = exchange.auth_info().ok_or("auth info recorded")?;
    assert_eq!(info.user(), Some("alice"));
    assert_eq!(info.algorithm.as_deref(), Some("digest"));
    let provisions = info.provisions.ok_or("provisions recorded")?;
    assert!(provisions.contains(SECPROV_SERVER_NONCE_PER_REQUEST));
    assert!(!info.tokens.contains("actual_password"));

    let request = digest_response(&nonce, "00000002", "correctpw");
    let mut exchange = Exchange::new(&request);
    let error = authenticator
        .ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange)
        .err()
        .ok_or("expected a stale nonce")?;
    assert_eq!(
        error.as_unauthenticated().map(|error| error.kind),
        Some(UnauthenticatedKind::TokensNotAccepted)
    );
    let challenge = challenge_params(&exchange)?;
    assert_eq!(challenge.get("stale").map(String::as_str), Some("true"));
    assert_ne!(challenge.get("nonce"), Some(&nonce));
    Ok(())
}

#[test_log::test]
fn digest_rejects_a_wrong_password_without_marking_the_nonce_stale() -> TestResult {
    let authenticator = authenticator()?;
    let request = MockRequest::get(LEDGER);
    let mut exchange = Exchange::new(&request);
    let _ = authenticator.ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange);
    let nonce = challenge_params(&exchange)?
        .remove("nonce")
        .ok_or("challenge carries a nonce")?;

    let request = digest_response(&nonce, "00000001", "wrongpw");
    let mut exchange = Exchange::new(&request);
    let error = authenticator
        .ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange)
        .err()
        .ok_or("expected a rejection")?;
    assert!(error.is_unauthenticated());
    assert_eq!(
        challenge_params(&exchange)?.get("stale").map(String::as_str),
        Some("false")
    );
    Ok(())
}

mod sessions {
    use super::*;
    use pretty_assertions::assert_eq;

    fn authenticator(store: Arc<dyn SessionStore>) -> Result<Authenticator, AuthError> {
        let settings = SessionSettings::default();
        Authenticator::builder()
            .algorithm(FixedAlgorithm::session_login())
            .algorithm(FixedAlgorithm::session_recall())
            .clerk(SessionLoginClerk::new(settings.clone()))
            .clerk(SessionRecallClerk::new(settings.clone()))
            .scanner(SessionLoginScanner::new())
            .scanner(SessionRecallScanner::new(&settings))
            .supplicant(InMemoryPlainSupplicant::new(
                "users",
                REALM,
                [("alice", "correctpw")],
            ))
            .supplicant(SessionStorageSupplicant::new("sessions", store.clone()))
            .supplicant(SessionRecallSupplicant::new("recall", store))
            .space(
                ["/login"],
                Space::builder()
                    .realm(REALM)
                    .algorithms(["session_login"])
                    .build(),
            )
            .space(
                ["/"],
                Space::builder()
                    .realm(REALM)
                    .algorithms(["session_recall"])
                    .build(),
            )
            .build()
    }

    #[test_log::test]
    fn login_issues_a_session_that_later_requests_recall() -> TestResult {
        let store: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(std::time::Duration::from_secs(3600)));
        let authenticator = authenticator(store)?;

        let login = MockRequest::post("/login")
            .with_arg("user", "alice")
            .with_arg("password", "correctpw");
        let mut exchange = Exchange::new(&login);
        authenticator.ensure_auth("/login", &AffordanceSet::max(), &mut exchange)?;
        let session_id = exchange
            .auth_info()
            .and_then(|info| info.tokens.get("session_id"))
            .ok_or("login yields a session id")?
            .to_string();
        let response = AuthResponse::new(Ok(()), exchange.response())?;
        assert_eq!(
            response.header_values(SET_COOKIE).collect::<Vec<_>>(),
            vec![format!("session_id={session_id}; Path=/; Max-Age=3600; HttpOnly")]
        );

        let request = MockRequest::get("/private").with_cookie("session_id", &session_id);
        let mut exchange = Exchange::new(&request);
        authenticator.ensure_auth("/private", &AffordanceSet::max(), &mut exchange)?;
        let info = exchange.auth_info().ok_or("auth info recorded")?;
        assert_eq!(info.user(), Some("alice"));
        assert_eq!(info.algorithm.as_deref(), Some("session_recall"));
        assert!(exchange.response().cookies().is_empty());
        Ok(())
    }

    #[test_log::test]
    fn unknown_sessions_are_sent_to_the_login_form() -> TestResult {
        let store: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(std::time::Duration::from_secs(3600)));
        let authenticator = authenticator(store)?;

        let request = MockRequest::get("/private").with_cookie("session_id", "forged");
        let mut exchange = Exchange::new(&request);
        let error = authenticator
            .ensure_auth("/private", &AffordanceSet::max(), &mut exchange)
            .err()
            .ok_or("expected a rejection")?;
        let response = AuthResponse::new(Err(&error), exchange.response())?;
        assert_eq!(response.status, Some(StatusCode::TEMPORARY_REDIRECT));
        assert_eq!(
            response.header_values(LOCATION).collect::<Vec<_>>(),
            vec!["/login"]
        );
        assert_eq!(
            response.header_values(SET_COOKIE).collect::<Vec<_>>(),
            vec!["session_id=; Path=/; Max-Age=0; HttpOnly"]
        );

        let request = MockRequest::get("/private");
        let mut exchange = Exchange::new(&request);
        let error = authenticator
            .ensure_auth("/private", &AffordanceSet::max(), &mut exchange)
            .err()
            .ok_or("expected a redirection")?;
        assert_eq!(
            error.as_unauthenticated().map(|error| error.kind),
            Some(UnauthenticatedKind::TokensNotGiven)
        );
        assert_eq!(error.status(), StatusCode::TEMPORARY_REDIRECT);
        Ok(())
    }
}

#[test_log::test]
fn has_auth_only_holds_after_a_matching_success() -> TestResult {
    let authenticator = authenticator()?;
    let request = basic("alice", "correctpw");
    let mut exchange = Exchange::new(&request);
    assert!(!authenticator.has_auth("/private", &AffordanceSet::max(), &exchange));
    assert!(exchange.auth_info().is_none());

    authenticator.ensure_auth("/private", &AffordanceSet::max(), &mut exchange)?;
    let before = (exchange.auth_info().cloned(), exchange.response().clone());
    assert!(authenticator.has_auth("/private", &AffordanceSet::max(), &exchange));

    let digest_only = AffordanceSet::max().with_algorithms(USet::single("digest".to_string()));
    assert!(!authenticator.has_auth("/private", &digest_only, &exchange));
    let elsewhere = AffordanceSet::max().with_realms(USet::single("other.net".to_string()));
    assert!(!authenticator.has_auth("/private", &elsewhere, &exchange));
    let stronger =
        AffordanceSet::max().with_provisionsets(ProvisionSet::at_least(SECPROV_SERVER_NONCE));
    assert!(!authenticator.has_auth("/private", &stronger, &exchange));

    assert_eq!(
        (exchange.auth_info().cloned(), exchange.response().clone()),
        before
    );
    Ok(())
}

#[test_log::test]
fn negotiation_is_deterministic() -> TestResult {
    let authenticator = authenticator()?;

    let basic: Vec<_> = (0..8)
        .map(|_| {
            let request = MockRequest::get("/private");
            let mut exchange = Exchange::new(&request);
            let error = authenticator
                .ensure_auth("/private", &AffordanceSet::max(), &mut exchange)
                .err();
            (error, exchange.auth_info().cloned(), exchange.into_response())
        })
        .collect();
    assert!(basic.windows(2).all(|pair| pair[0] == pair[1]));

    let digest = (0..8)
        .map(|_| {
            let request = MockRequest::get(LEDGER);
            let mut exchange = Exchange::new(&request);
            let _ = authenticator.ensure_auth(LEDGER, &AffordanceSet::max(), &mut exchange);
            let info = exchange.auth_info().cloned().ok_or("auth info recorded")?;
            let mut challenge = challenge_params(&exchange)?;
            challenge.remove("nonce");
            Ok((info.algorithm, info.clerk, challenge))
        })
        .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;
    assert!(digest.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(digest[0].0.as_deref(), Some("digest"));
    Ok(())
}
