//! Cookie sessions: a login form that hands out session cookies and the
//! recall of those cookies on later requests.

use portico_affordance::{ProcessAffordanceSet, TokenMap, TokenNames, USet};
use portico_auth::{
    AuthError, Clerk, Exchange, InputSource, OutputTarget, Redirection, RequestAuthInfo,
    SESSION_ID_TOKEN, Scanner, SessionSettings, TokenHandler, Unauthenticated,
};

fn empty_inputs() -> USet<TokenNames> {
    USet::single(TokenNames::new())
}

fn login_redirect(settings: &SessionSettings) -> Unauthenticated {
    Unauthenticated::tokens_not_given().with_redirection(Redirection::temporary(&settings.login_uri))
}

/// Sends clients to the login form and hands out a session cookie once
/// they log in.
#[derive(Debug, Clone)]
pub struct SessionLoginClerk {
    name: String,
    settings: SessionSettings,
}

impl SessionLoginClerk {
    /// A clerk called `session_login`.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            name: "session_login".into(),
            settings,
        }
    }
}

http_connector!(SessionLoginClerk, "session_login");

impl TokenHandler for SessionLoginClerk {
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
        empty_inputs()
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
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        Err(login_redirect(&self.settings).into())
    }
}

impl Clerk for SessionLoginClerk {
    fn confirm_auth_info(
        &self,
        info: &RequestAuthInfo,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if !info.is_accepted() {
            return Err(Unauthenticated::tokens_not_accepted()
                .with_affordances(affordances.clone())
                .with_redirection(Redirection::temporary(&self.settings.login_uri))
                .into());
        }
        let session_id = info.tokens.get(SESSION_ID_TOKEN).ok_or_else(|| {
            AuthError::internal("accepted login carries no session id")
        })?;
        exchange.response_mut().set_cookie(
            &self.settings.session_cookie,
            session_id,
            Some(self.settings.session_lifespan),
        );
        tracing::debug!(clerk = %self.name, cookie = %self.settings.session_cookie, "issued session cookie");
        Ok(())
    }
}

/// Reads `user` and `password` from the method arguments of a login form.
#[derive(Debug, Clone)]
pub struct SessionLoginScanner {
    name: String,
}

impl SessionLoginScanner {
    /// A scanner called `session_login`.
    pub fn new() -> Self {
        Self {
            name: "session_login".into(),
        }
    }
}

impl Default for SessionLoginScanner {
    fn default() -> Self {
        Self::new()
    }
}

http_connector!(SessionLoginScanner, "session_login");

impl TokenHandler for SessionLoginScanner {
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
        empty_inputs()
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
        let request = exchange.request();
        let (Some(user), Some(password)) = (request.method_arg("user"), request.method_arg("password"))
        else {
            return Err(AuthError::NoValidTokensScanned);
        };
        let tokens = [("user", user), ("password", password)].into_iter().collect();
        Ok(RequestAuthInfo::new(tokens))
    }
}

impl Scanner for SessionLoginScanner {}

/// Sends clients without a valid session cookie to the login form,
/// expiring whatever cookie they presented.
#[derive(Debug, Clone)]
pub struct SessionRecallClerk {
    name: String,
    settings: SessionSettings,
}

impl SessionRecallClerk {
    /// A clerk called `session_recall`.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            name: "session_recall".into(),
            settings,
        }
    }
}

http_connector!(SessionRecallClerk, "session_recall");

impl TokenHandler for SessionRecallClerk {
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
        empty_inputs()
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
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        Err(login_redirect(&self.settings).into())
    }
}

impl Clerk for SessionRecallClerk {
    fn confirm_auth_info(
        &self,
        info: &RequestAuthInfo,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if info.is_accepted() {
            return Ok(());
        }
        tracing::debug!(clerk = %self.name, "expiring unknown session cookie");
        exchange
            .response_mut()
            .clear_cookie(&self.settings.session_cookie);
        Err(Unauthenticated::tokens_not_accepted()
            .with_affordances(affordances.clone())
            .with_redirection(Redirection::temporary(&self.settings.login_uri))
            .into())
    }
}

/// Reads the session id from the session cookie.
#[derive(Debug, Clone)]
pub struct SessionRecallScanner {
    name: String,
    cookie: String,
}

impl SessionRecallScanner {
    /// A scanner called `session_recall`, reading the cookie named in
    /// `settings`.
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            name: "session_recall".into(),
            cookie: settings.session_cookie.clone(),
        }
    }
}

http_connector!(SessionRecallScanner, "session_recall");

impl TokenHandler for SessionRecallScanner {
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
        empty_inputs()
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(TokenNames::from([SESSION_ID_TOKEN]))
    }

    fn handle_tokens(
        &self,
        _input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let session_id = exchange
            .request()
            .cookie(&self.cookie)
            .filter(|session_id| !session_id.is_empty())
            .ok_or(AuthError::NoValidTokensScanned)?;
        let tokens = [(SESSION_ID_TOKEN, session_id)].into_iter().collect();
        Ok(RequestAuthInfo::new(tokens))
    }
}

impl Scanner for SessionRecallScanner {}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::*;
    use http::StatusCode;
    use http::header::LOCATION;
    use portico_affordance::*;
    use portico_auth::helpers::MockRequest;
    use portico_auth::*;
    use pretty_assertions::assert_eq;

    fn settings() -> SessionSettings {
        SessionSettings {
            login_uri: "/signin".into(),
            session_cookie: "sid".into(),
            session_lifespan: Duration::from_secs(600),
        }
    }

    #[test]
    fn it_redirects_to_the_login_form() -> testresult::TestResult {
        let request = MockRequest::get("/");
        let mut exchange = Exchange::new(&request);
        let error = SessionLoginClerk::new(settings())
            .process_tokens(&TokenMap::new(), ProcessAffordanceSet::unconstrained(), &mut exchange)
            .err()
            .ok_or("the clerk redirects")?;
        assert_eq!(error.status(), StatusCode::TEMPORARY_REDIRECT);
        let response = AuthResponse::new(Err(&error), exchange.response())?;
        assert_eq!(response.header_values(LOCATION).collect::<Vec<_>>(), vec!["/signin"]);
        Ok(())
    }

    #[test]
    fn it_sets_the_session_cookie_on_login() -> testresult::TestResult {
        let request = MockRequest::post("/signin");
        let mut exchange = Exchange::new(&request);
        let tokens: TokenMap = [("user", "alice"), ("session_id", "abc")].into_iter().collect();
        let info = RequestAuthInfo::new(tokens).with_accepted(true);
        SessionLoginClerk::new(settings()).confirm_auth_info(
            &info,
            ProcessAffordanceSet::unconstrained(),
            &mut exchange,
        )?;
        assert_eq!(
            exchange.response().cookies(),
            &[CookieDirective::Set {
                name: "sid".into(),
                value: "abc".into(),
                max_age: Some(Duration::from_secs(600)),
            }]
        );

        let without_session = RequestAuthInfo::new(TokenMap::new()).with_accepted(true);
        let error = SessionLoginClerk::new(settings())
            .confirm_auth_info(&without_session, ProcessAffordanceSet::unconstrained(), &mut exchange)
            .err()
            .ok_or("a session id is required")?;
        assert!(error.is_server_error());
        Ok(())
    }

    #[test]
    fn it_expires_rejected_session_cookies() -> testresult::TestResult {
        let request = MockRequest::get("/").with_cookie("sid", "gone");
        let mut exchange = Exchange::new(&request);
        let rejected = RequestAuthInfo::new(TokenMap::new()).with_accepted(false);
        let error = SessionRecallClerk::new(settings())
            .confirm_auth_info(&rejected, ProcessAffordanceSet::unconstrained(), &mut exchange)
            .err()
            .ok_or("the clerk rejects")?;
        assert_eq!(error.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            exchange.response().cookies(),
            &[CookieDirective::Clear { name: "sid".into() }]
        );
        Ok(())
    }

    #[test]
    fn it_scans_session_cookies_and_login_forms() -> testresult::TestResult {
        let unconstrained = ProcessAffordanceSet::unconstrained();

        let request = MockRequest::get("/").with_cookie("sid", "abc");
        let mut exchange = Exchange::new(&request);
        let info = SessionRecallScanner::new(&settings()).process_tokens(
            &TokenMap::new(),
            unconstrained,
            &mut exchange,
        )?;
        assert_eq!(info.tokens.get(SESSION_ID_TOKEN), Some("abc"));

        let request = MockRequest::post("/signin")
            .with_arg("user", "alice")
            .with_arg("password", "wonderland");
        let mut exchange = Exchange::new(&request);
        let info = SessionLoginScanner::new().process_tokens(&TokenMap::new(), unconstrained, &mut exchange)?;
        assert_eq!(info.tokens.get("user"), Some("alice"));

        let request = MockRequest::post("/signin").with_arg("user", "alice");
        let mut exchange = Exchange::new(&request);
        let scanned = SessionLoginScanner::new().process_tokens(&TokenMap::new(), unconstrained, &mut exchange);
        assert_eq!(scanned.err(), Some(AuthError::NoValidTokensScanned));
        Ok(())
    }
}
