//! Supplicants backed by in-process user tables.

use std::collections::BTreeMap;

use portico_affordance::{ProcessAffordanceSet, TokenMap, TokenNames, USet};

use crate::{
    AlgorithmHandler, AuthError, Exchange, InputSource, OutputTarget, Participant,
    ProvisionSetHandler, RealmHandler, RequestAuthInfo, Supplicant, TokenHandler,
};

/// Implements the negotiation side shared by supplicants: one realm, any
/// provisions and algorithms, fixed token sets passed on with everything
/// upstream offered.
macro_rules! supplicant_affordances {
    ($type:ty, inputs: [$($input:expr),*], outputs: [$($output:expr),*]) => {
        impl RealmHandler for $type {
            fn declared_realms(
                &self,
                _upstream: &ProcessAffordanceSet,
                _downstream: &ProcessAffordanceSet,
            ) -> USet<String> {
                USet::single(self.realm.clone())
            }
        }

        impl ProvisionSetHandler for $type {}

        impl AlgorithmHandler for $type {}

        impl Participant for $type {
            fn name(&self) -> &str {
                &self.name
            }
        }

        impl Supplicant for $type {}

        impl $type {
            fn declared_input_names() -> USet<TokenNames> {
                USet::single(TokenNames::from([$($input),*]))
            }

            fn declared_output_names() -> USet<TokenNames> {
                USet::single(TokenNames::from([$($output),*]))
            }
        }
    };
}

/// Checks user names and passwords against a fixed table.
#[derive(Debug, Clone)]
pub struct InMemoryPlainSupplicant {
    name: String,
    realm: String,
    users: BTreeMap<String, String>,
}

impl InMemoryPlainSupplicant {
    /// A supplicant for `realm` knowing `users` as `(user, password)` pairs.
    pub fn new<I, U, P>(name: impl Into<String>, realm: impl Into<String>, users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            realm: realm.into(),
            users: users
                .into_iter()
                .map(|(user, password)| (user.into(), password.into()))
                .collect(),
        }
    }
}

supplicant_affordances!(
    InMemoryPlainSupplicant,
    inputs: ["user", "password"],
    outputs: ["user", "accepted"]
);

impl TokenHandler for InMemoryPlainSupplicant {
    fn input_source(&self) -> InputSource {
        InputSource::Algorithm
    }

    fn output_target(&self) -> OutputTarget {
        OutputTarget::Algorithm
    }

    fn declared_inputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        Self::declared_input_names()
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        Self::declared_output_names()
    }

    fn tokens_passthrough(&self) -> bool {
        true
    }

    fn opaque_passthrough(&self) -> bool {
        true
    }

    fn handle_tokens(
        &self,
        input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let user = input.require("user")?;
        let password = input.require("password")?;
        let accepted = self.users.get(user).is_some_and(|known| known == password);
        tracing::debug!(supplicant = %self.name, user, accepted, "checked password");

        let mut tokens = input.clone();
        tokens.remove("password");
        Ok(RequestAuthInfo::new(tokens).with_accepted(accepted))
    }
}

/// Looks up the password of a user, for mechanisms that never see it on the
/// wire.
#[derive(Debug, Clone)]
pub struct InMemoryGetPasswordSupplicant {
    name: String,
    realm: String,
    users: BTreeMap<String, String>,
}

impl InMemoryGetPasswordSupplicant {
    /// A supplicant for `realm` knowing `users` as `(user, password)` pairs.
    pub fn new<I, U, P>(name: impl Into<String>, realm: impl Into<String>, users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            realm: realm.into(),
            users: users
                .into_iter()
                .map(|(user, password)| (user.into(), password.into()))
                .collect(),
        }
    }
}

supplicant_affordances!(
    InMemoryGetPasswordSupplicant,
    inputs: ["user"],
    outputs: ["user", "actual_password"]
);

impl TokenHandler for InMemoryGetPasswordSupplicant {
    fn input_source(&self) -> InputSource {
        InputSource::Algorithm
    }

    fn output_target(&self) -> OutputTarget {
        OutputTarget::Algorithm
    }

    fn declared_inputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        Self::declared_input_names()
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        Self::declared_output_names()
    }

    fn tokens_passthrough(&self) -> bool {
        true
    }

    fn opaque_passthrough(&self) -> bool {
        true
    }

    /// Unknown users get no `actual_password`; the algorithm rejects them
    /// as it would a wrong password.
    fn handle_tokens(
        &self,
        input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let user = input.require("user")?;
        let mut tokens = input.clone();
        match self.users.get(user) {
            Some(password) => {
                tokens.insert("actual_password", password.as_str());
            }
            None => tracing::debug!(supplicant = %self.name, user, "unknown user"),
        }
        Ok(RequestAuthInfo::new(tokens))
    }
}
