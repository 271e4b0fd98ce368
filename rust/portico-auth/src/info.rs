use std::fmt::{Display, Formatter};

use portico_affordance::{ACCEPTED_TOKEN, ProvisionSet, TokenMap};

/// What is known about a request's authentication.
///
/// Created when negotiation starts, threaded through every pipeline step and
/// finally stored on the [`Exchange`](crate::Exchange).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAuthInfo {
    /// The tokens gathered so far.
    pub tokens: TokenMap,
    /// The key of the governing space.
    pub space: Option<String>,
    /// The realm.
    pub realm: Option<String>,
    /// The provisions guaranteed by every step taken.
    pub provisions: Option<ProvisionSet>,
    /// The algorithm name.
    pub algorithm: Option<String>,
    /// The clerk name.
    pub clerk: Option<String>,
    /// The scanner name.
    pub scanner: Option<String>,
    /// The name of the last supplicant consulted.
    pub supplicant: Option<String>,
    /// The verdict, once one is reached.
    pub accepted: Option<bool>,
}

impl RequestAuthInfo {
    /// Info holding only `tokens`.
    pub fn new(tokens: TokenMap) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }

    /// Records provisions.
    pub fn with_provisions(mut self, provisions: impl Into<ProvisionSet>) -> Self {
        self.provisions = Some(provisions.into());
        self
    }

    /// Records a verdict.
    pub fn with_accepted(mut self, accepted: bool) -> Self {
        self.accepted = Some(accepted);
        self
    }

    /// Records the verdict carried by the `accepted` token.
    pub fn with_accepted_token(self) -> Self {
        let accepted = self.tokens.get(ACCEPTED_TOKEN) == Some("True");
        self.with_accepted(accepted)
    }

    /// Records the realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Whether a verdict was reached.
    pub fn verified(&self) -> bool {
        self.accepted.is_some()
    }

    /// Whether the request is authenticated.
    pub fn is_accepted(&self) -> bool {
        self.accepted == Some(true)
    }

    /// The authenticated user name, if any.
    pub fn user(&self) -> Option<&str> {
        self.tokens.get("user")
    }

    /// Fills what this step left unset from `prior`. Provisions guaranteed
    /// by both steps are kept.
    pub fn inherit(&mut self, prior: &RequestAuthInfo) {
        fill(&mut self.space, &prior.space);
        fill(&mut self.realm, &prior.realm);
        fill(&mut self.algorithm, &prior.algorithm);
        fill(&mut self.clerk, &prior.clerk);
        fill(&mut self.scanner, &prior.scanner);
        fill(&mut self.supplicant, &prior.supplicant);
        self.provisions = match (self.provisions, prior.provisions) {
            (Some(current), Some(prior)) => Some(current & prior),
            (current, prior) => current.or(prior),
        };
    }
}

fn fill(field: &mut Option<String>, prior: &Option<String>) {
    if field.is_none() {
        field.clone_from(prior);
    }
}

impl Display for RequestAuthInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".into());
        write!(
            f,
            "tokens={}, realm={}, algorithm={}, clerk={}, scanner={}, supplicant={}, accepted={}",
            self.tokens.names(),
            show(&self.realm),
            show(&self.algorithm),
            show(&self.clerk),
            show(&self.scanner),
            show(&self.supplicant),
            self.accepted
                .map(|accepted| accepted.to_string())
                .unwrap_or_else(|| "-".into()),
        )
    }
}
