use std::fmt::{Display, Formatter};
use std::time::Duration;

use portico_affordance::{
    InfiniteAffordances, MissingTokens, ProcessAffordanceSet, UnsatisfiableAffordances,
    UnsupportedUniversalSetOperation,
};

use crate::ConnectorRole;

/// Why a request is not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnauthenticatedKind {
    /// Authentication failed for another reason.
    Generic,
    /// The request carried no authentication tokens.
    TokensNotGiven,
    /// The request's tokens were rejected.
    TokensNotAccepted,
}

/// A client-correctable authentication failure.
///
/// The HTTP collaborator turns this into a 401-class response, using the
/// challenges recorded on the request's [`Exchange`](crate::Exchange) and the
/// optional [`Redirection`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Unauthenticated {
    /// The failure class.
    pub kind: UnauthenticatedKind,
    /// A human readable explanation.
    pub message: String,
    /// The realm the client should authenticate in.
    pub realm: Option<String>,
    /// The affordances that would have been required.
    pub affordances: Option<ProcessAffordanceSet>,
    /// Where the client should go to remedy the failure.
    pub redirection: Option<Redirection>,
}

impl Unauthenticated {
    fn new(kind: UnauthenticatedKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            realm: None,
            affordances: None,
            redirection: None,
        }
    }

    /// A failure of no more specific kind.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(UnauthenticatedKind::Generic, message)
    }

    /// The request carried no authentication tokens.
    pub fn tokens_not_given() -> Self {
        Self::new(UnauthenticatedKind::TokensNotGiven, "no authentication tokens given")
    }

    /// The request's tokens were rejected.
    pub fn tokens_not_accepted() -> Self {
        Self::new(
            UnauthenticatedKind::TokensNotAccepted,
            "authentication tokens not accepted",
        )
    }

    /// Replaces the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Records the realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Records the required affordances.
    pub fn with_affordances(mut self, affordances: ProcessAffordanceSet) -> Self {
        self.affordances = Some(affordances);
        self
    }

    /// Records where the client should go next.
    pub fn with_redirection(mut self, redirection: Redirection) -> Self {
        self.redirection = Some(redirection);
        self
    }
}

/// The kind of a [`Redirection`], mirroring the HTTP 3xx family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectionKind {
    /// The resource moved for good.
    Permanent,
    /// The resource is temporarily elsewhere.
    Temporary,
    /// The response to this request is elsewhere.
    Response,
    /// The resource must be reached through a proxy.
    Proxy,
    /// Several representations are available.
    EntityChoice,
}

impl Display for RedirectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
            Self::Response => "response",
            Self::Proxy => "proxy",
            Self::EntityChoice => "entity choice",
        };
        f.write_str(name)
    }
}

/// An instruction to send the client elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} redirection to {location}")]
pub struct Redirection {
    /// The redirection class.
    pub kind: RedirectionKind,
    /// The target location.
    pub location: String,
}

impl Redirection {
    /// A redirection of the given kind.
    pub fn new(kind: RedirectionKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }

    /// A temporary redirection.
    pub fn temporary(location: impl Into<String>) -> Self {
        Self::new(RedirectionKind::Temporary, location)
    }

    /// A see-other redirection to the response.
    pub fn response(location: impl Into<String>) -> Self {
        Self::new(RedirectionKind::Response, location)
    }
}

/// A failure talking to an authentication backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend did not answer in time.
    #[error("backend '{backend}' timed out after {timeout:?}")]
    Timeout {
        /// The backend name.
        backend: String,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// Too many earlier calls to the backend are still running.
    #[error("backend '{backend}' has {limit} calls in flight")]
    Overloaded {
        /// The backend name.
        backend: String,
        /// The bound on calls in flight.
        limit: usize,
    },

    /// The backend reported an error.
    #[error("backend '{backend}' failed: {message}")]
    Failure {
        /// The backend name.
        backend: String,
        /// What went wrong.
        message: String,
    },
}

/// Every failure `ensure_auth` can surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The client must (re)authenticate.
    #[error(transparent)]
    Unauthenticated(Box<Unauthenticated>),

    /// The client must go elsewhere.
    #[error(transparent)]
    Redirection(Redirection),

    /// No combination of affordances can succeed.
    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiableAffordances),

    /// A concrete choice was required from a universal set.
    #[error(transparent)]
    Infinite(#[from] InfiniteAffordances),

    /// No registered connector of some role fits the affordances.
    #[error("no {role} meets the necessary affordances")]
    NoConnector {
        /// The missing role.
        role: ConnectorRole,
    },

    /// No algorithm can carry out an authentication process.
    #[error("cannot resolve an acceptable authentication process")]
    Unresolvable,

    /// A backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A scanner found nothing it recognizes.
    #[error("no valid tokens scanned")]
    NoValidTokensScanned,

    /// A step was handed an incomplete token map.
    #[error(transparent)]
    MissingTokens(#[from] MissingTokens),

    /// A universal set reached code that needs a finite one.
    #[error(transparent)]
    Universal(#[from] UnsupportedUniversalSetOperation),

    /// The authenticator was configured inconsistently.
    #[error("invalid authentication configuration: {message}")]
    Configuration {
        /// What is inconsistent.
        message: String,
    },

    /// The process ended without a verdict or otherwise misbehaved.
    #[error("authentication error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl AuthError {
    /// A configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// An internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the client can correct this failure.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Whether this failure indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        !matches!(self, Self::Unauthenticated(_) | Self::Redirection(_))
    }

    /// The unauthenticated failure, if that is what this is.
    pub fn as_unauthenticated(&self) -> Option<&Unauthenticated> {
        match self {
            Self::Unauthenticated(unauthenticated) => Some(unauthenticated),
            _ => None,
        }
    }
}

impl From<Unauthenticated> for AuthError {
    fn from(unauthenticated: Unauthenticated) -> Self {
        Self::Unauthenticated(Box::new(unauthenticated))
    }
}

impl From<Redirection> for AuthError {
    fn from(redirection: Redirection) -> Self {
        Self::Redirection(redirection)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_classifies_errors() {
        let not_given: AuthError = Unauthenticated::tokens_not_given().into();
        assert!(not_given.is_unauthenticated());
        assert!(!not_given.is_server_error());

        let redirect: AuthError = Redirection::temporary("/login").into();
        assert!(!redirect.is_server_error());

        let backend: AuthError = BackendError::Failure {
            backend: "sessions".into(),
            message: "down".into(),
        }
        .into();
        assert!(backend.is_server_error());
    }

    #[test]
    fn it_renders_messages() {
        let error: AuthError = Unauthenticated::tokens_not_accepted()
            .with_realm("example.net")
            .into();
        assert_eq!(error.to_string(), "authentication tokens not accepted");
        assert_eq!(
            error.as_unauthenticated().and_then(|u| u.realm.as_deref()),
            Some("example.net")
        );
        assert_eq!(
            AuthError::NoConnector {
                role: ConnectorRole::Clerk
            }
            .to_string(),
            "no clerk meets the necessary affordances"
        );
    }
}
