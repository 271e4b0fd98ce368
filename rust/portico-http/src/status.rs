//! Turning negotiation outcomes into HTTP responses.

use http::header::{AsHeaderName, LOCATION, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use portico_auth::{AuthError, CookieDirective, RedirectionKind, ResponseDirectives};

use crate::{HeaderError, header_value};

/// The status a redirection of `kind` answers with.
pub fn redirection_status(kind: RedirectionKind) -> StatusCode {
    match kind {
        RedirectionKind::Permanent => StatusCode::MOVED_PERMANENTLY,
        RedirectionKind::Temporary => StatusCode::TEMPORARY_REDIRECT,
        RedirectionKind::Response => StatusCode::SEE_OTHER,
        RedirectionKind::Proxy => StatusCode::USE_PROXY,
        RedirectionKind::EntityChoice => StatusCode::MULTIPLE_CHOICES,
    }
}

/// Classifies errors by HTTP status.
pub trait HttpStatus {
    /// The status to answer with.
    fn status(&self) -> StatusCode;
}

/// An unauthenticated error that names a redirection answers with the
/// redirection's status.
impl HttpStatus for AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(unauthenticated) => match &unauthenticated.redirection {
                Some(redirection) => redirection_status(redirection.kind),
                None => StatusCode::UNAUTHORIZED,
            },
            AuthError::Redirection(redirection) => redirection_status(redirection.kind),
            AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
            AuthError::Unsatisfiable(_)
            | AuthError::Infinite(_)
            | AuthError::NoConnector { .. }
            | AuthError::Unresolvable
            | AuthError::NoValidTokensScanned
            | AuthError::MissingTokens(_)
            | AuthError::Universal(_)
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// What an HTTP layer should send back after negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse {
    /// The status to answer with instead of serving the resource.
    pub status: Option<StatusCode>,
    /// Headers to add, including `Set-Cookie` and `Location`.
    pub headers: HeaderMap,
}

impl AuthResponse {
    /// Combines the outcome of negotiation with the directives it left on
    /// the exchange.
    pub fn new(
        outcome: Result<(), &AuthError>,
        directives: &ResponseDirectives,
    ) -> Result<Self, HeaderError> {
        let mut headers = directives.headers().clone();
        for cookie in directives.cookies() {
            headers.append(SET_COOKIE, header_value(set_cookie(cookie))?);
        }
        let location = match outcome {
            Err(AuthError::Redirection(redirection)) => Some(&redirection.location),
            Err(AuthError::Unauthenticated(unauthenticated)) => unauthenticated
                .redirection
                .as_ref()
                .map(|redirection| &redirection.location),
            _ => None,
        };
        if let Some(location) = location {
            headers.insert(LOCATION, header_value(location.clone())?);
        }
        Ok(Self {
            status: outcome.err().map(HttpStatus::status),
            headers,
        })
    }

    /// The values of the headers called `name`, in insertion order.
    pub fn header_values<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
    }
}

/// Renders a cookie change as a `Set-Cookie` value.
pub fn set_cookie(cookie: &CookieDirective) -> String {
    match cookie {
        CookieDirective::Set {
            name,
            value,
            max_age,
        } => match max_age {
            Some(max_age) => format!(
                "{name}={value}; Path=/; Max-Age={}; HttpOnly",
                max_age.as_secs()
            ),
            None => format!("{name}={value}; Path=/; HttpOnly"),
        },
        CookieDirective::Clear { name } => format!("{name}=; Path=/; Max-Age=0; HttpOnly"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::*;
    use http::StatusCode;
    use http::header::{LOCATION, SET_COOKIE, WWW_AUTHENTICATE};
    use portico_auth::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_maps_errors_to_statuses() {
        let cases = [
            (
                AuthError::from(Unauthenticated::tokens_not_given()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                Unauthenticated::tokens_not_accepted()
                    .with_redirection(Redirection::temporary("/login"))
                    .into(),
                StatusCode::TEMPORARY_REDIRECT,
            ),
            (
                AuthError::Redirection(Redirection::response("/done")),
                StatusCode::SEE_OTHER,
            ),
            (
                AuthError::Redirection(Redirection::new(RedirectionKind::Permanent, "/moved")),
                StatusCode::MOVED_PERMANENTLY,
            ),
            (
                AuthError::Redirection(Redirection::new(RedirectionKind::Proxy, "http://proxy")),
                StatusCode::USE_PROXY,
            ),
            (
                AuthError::Redirection(Redirection::new(RedirectionKind::EntityChoice, "/choose")),
                StatusCode::MULTIPLE_CHOICES,
            ),
            (AuthError::configuration("broken"), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::Unresolvable, StatusCode::INTERNAL_SERVER_ERROR),
            (
                AuthError::Backend(BackendError::Failure {
                    backend: "sessions".into(),
                    message: "down".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn it_collects_headers_and_cookies() -> testresult::TestResult {
        let mut directives = ResponseDirectives::default();
        directives.append_header(
            WWW_AUTHENTICATE,
            header_value(r#"Basic realm="example.net""#.to_string())?,
        );
        directives.set_cookie("session_id", "abc", Some(Duration::from_secs(60)));
        directives.clear_cookie("stale");
        let error: AuthError = Unauthenticated::tokens_not_accepted()
            .with_redirection(Redirection::temporary("/login"))
            .into();

        let response = AuthResponse::new(Err(&error), &directives)?;
        assert_eq!(response.status, Some(StatusCode::TEMPORARY_REDIRECT));
        assert_eq!(
            response.header_values(WWW_AUTHENTICATE).collect::<Vec<_>>(),
            vec![r#"Basic realm="example.net""#]
        );
        assert_eq!(
            response.header_values(SET_COOKIE).collect::<Vec<_>>(),
            vec![
                "session_id=abc; Path=/; Max-Age=60; HttpOnly",
                "stale=; Path=/; Max-Age=0; HttpOnly",
            ]
        );
        assert_eq!(
            response.header_values(LOCATION).collect::<Vec<_>>(),
            vec!["/login"]
        );
        assert_eq!(response.headers.len(), 4);

        let served = AuthResponse::new(Ok(()), &ResponseDirectives::default())?;
        assert_eq!(served, AuthResponse::default());
        Ok(())
    }

    #[test]
    fn it_refuses_locations_a_header_cannot_carry() {
        let error: AuthError = Redirection::temporary("/login\r\nX-Injected: 1").into();
        assert!(matches!(
            AuthResponse::new(Err(&error), &ResponseDirectives::default()),
            Err(HeaderError::InvalidValue { .. })
        ));
    }
}
