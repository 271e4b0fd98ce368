use std::fmt::{Display, Formatter};

use portico_affordance::ProcessAffordanceSet;

use crate::{AuthError, Exchange, Participant, RequestAuthInfo, Unauthenticated};

/// The functional role a connector plays in an authentication process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectorRole {
    /// Talks to the client: sends challenges, solicits tokens.
    Clerk,
    /// Extracts tokens from the request.
    Scanner,
    /// Verifies tokens against a backend.
    Supplicant,
}

impl ConnectorRole {
    /// Every role, in pipeline order.
    pub const ALL: [ConnectorRole; 3] = [Self::Clerk, Self::Scanner, Self::Supplicant];
}

impl Display for ConnectorRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Clerk => "clerk",
            Self::Scanner => "scanner",
            Self::Supplicant => "supplicant",
        };
        f.write_str(name)
    }
}

/// Extracts tokens from the current request.
///
/// A scanner is consulted before any algorithm runs. Its
/// [`process_tokens`](crate::TokenHandler::process_tokens) is handed an empty
/// token map and reads the request through the [`Exchange`]; when the request
/// carries nothing it recognizes it fails with
/// [`AuthError::NoValidTokensScanned`], which negotiation treats as a skip.
pub trait Scanner: Participant {}

/// Communicates with the client.
///
/// A clerk receives the tokens of a challenging phase and records a challenge
/// on the response, then fails with an [`Unauthenticated`] error. Once a
/// process reaches a verdict the clerk is asked to confirm it.
pub trait Clerk: Participant {
    /// Confirms a verdict. Rejections fail with a tokens-not-accepted error,
    /// after recording whatever challenge the client needs to retry.
    fn confirm_auth_info(
        &self,
        info: &RequestAuthInfo,
        affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if info.is_accepted() {
            Ok(())
        } else {
            Err(Unauthenticated::tokens_not_accepted()
                .with_affordances(affordances.clone())
                .into())
        }
    }
}

/// Verifies tokens against a backend.
///
/// Backend failures surface as [`AuthError::Backend`].
pub trait Supplicant: Participant {}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_names_roles() {
        let names: Vec<String> = ConnectorRole::ALL.iter().map(|role| role.to_string()).collect();
        assert_eq!(names, vec!["clerk", "scanner", "supplicant"]);
    }
}
