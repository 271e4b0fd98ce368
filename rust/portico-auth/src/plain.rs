use portico_affordance::SECPROV_CLIENT_AUTH;

use crate::{FixedAlgorithm, InputSource, OutputTarget, PhaseSpec};

const PLAIN_PHASES: &[PhaseSpec] = &[
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

const PLAIN_TOKENS: &[&[&str]] = &[&[], &["user", "password"], &["user", "accepted"]];

impl FixedAlgorithm {
    /// The `plain` algorithm: the client sends a user name and password,
    /// which a supplicant checks.
    pub const fn plain() -> Self {
        Self::new("plain", SECPROV_CLIENT_AUTH, PLAIN_PHASES, PLAIN_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use portico_affordance::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_judges_from_the_backend_response() -> testresult::TestResult {
        let request = crate::helpers::MockRequest::get("/");
        let mut exchange = Exchange::new(&request);
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let judge = plain.phase(2).ok_or("plain has three phases")?;

        let tokens: TokenMap = [("user", "alice"), ("accepted", "True")].into_iter().collect();
        let info = judge.process_tokens(&tokens, ProcessAffordanceSet::unconstrained(), &mut exchange)?;
        assert!(info.is_accepted());
        assert_eq!(info.provisions, Some(SECPROV_CLIENT_AUTH.into()));

        let tokens: TokenMap = [("user", "alice"), ("accepted", "False")].into_iter().collect();
        let info = judge.process_tokens(&tokens, ProcessAffordanceSet::unconstrained(), &mut exchange)?;
        assert_eq!(info.accepted, Some(false));
        Ok(())
    }

    #[test]
    fn it_leaves_earlier_phases_undecided() -> testresult::TestResult {
        let request = crate::helpers::MockRequest::get("/");
        let mut exchange = Exchange::new(&request);
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let verify = plain.phase(1).ok_or("plain has three phases")?;

        let tokens: TokenMap = [("user", "alice"), ("password", "secret")].into_iter().collect();
        let info = verify.process_tokens(&tokens, ProcessAffordanceSet::unconstrained(), &mut exchange)?;
        assert!(!info.verified());
        assert_eq!(info.tokens, tokens);
        Ok(())
    }
}
