//! Capability traits shared by connectors and algorithm phases.
//!
//! Each trait covers one negotiation parameter. A handler declares what it
//! supports (`declared_*`); the provided methods narrow that declaration by
//! the upstream and downstream affordances around the handler. Handlers that
//! do not constrain a parameter keep the universal default.

use std::fmt::{Debug, Display, Formatter};

use portico_affordance::{
    ACCEPTED_TOKEN, AffordanceSet, OPAQUE_TOKEN, ProcessAffordanceSet, ProvisionSet, TokenMap,
    TokenNames, USet,
};

use crate::{AuthError, Exchange, RequestAuthInfo};

/// Where a pipeline participant takes its tokens from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// The beginning of the process.
    Start,
    /// An algorithm phase.
    Algorithm,
    /// A clerk.
    Clerk,
    /// A scanner.
    Scanner,
    /// A supplicant.
    Supplicant,
}

/// Where a pipeline participant sends its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    /// An algorithm phase.
    Algorithm,
    /// A clerk.
    Clerk,
    /// A scanner.
    Scanner,
    /// A supplicant.
    Supplicant,
    /// The end of the process.
    End,
}

impl Display for InputSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Algorithm => "algorithm",
            Self::Clerk => "clerk",
            Self::Scanner => "scanner",
            Self::Supplicant => "supplicant",
        };
        f.write_str(name)
    }
}

impl Display for OutputTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Algorithm => "algorithm",
            Self::Clerk => "clerk",
            Self::Scanner => "scanner",
            Self::Supplicant => "supplicant",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

fn supports_any<T: Ord + Clone>(
    candidates: &USet<T>,
    feasible: impl FnOnce() -> bool,
    mut supports: impl FnMut(&T) -> bool,
) -> bool {
    match candidates {
        USet::Universal => feasible(),
        USet::Finite(candidates) => candidates.iter().any(|candidate| supports(candidate)),
    }
}

/// Handles authentication realms.
pub trait RealmHandler {
    /// The realms this handler serves.
    fn declared_realms(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        USet::Universal
    }

    /// The realms feasible between `upstream` and `downstream`.
    fn realms(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        &(&self.declared_realms(upstream, downstream) & &upstream.realms) & &downstream.realms
    }

    /// Whether `realm` is feasible.
    fn supports_realm(
        &self,
        realm: &str,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.realms(upstream, downstream).contains(realm)
    }

    /// Whether any of `candidates` is feasible. A universal candidate set is
    /// never enumerated.
    fn supports_any_realm(
        &self,
        candidates: &USet<String>,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        let realms = self.realms(upstream, downstream);
        supports_any(candidates, || !realms.is_empty(), |realm| realms.contains(realm))
    }
}

/// Handles security provision sets.
pub trait ProvisionSetHandler {
    /// The provision sets this handler can guarantee.
    fn declared_provisionsets(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet> {
        USet::Universal
    }

    /// The provision sets feasible between `upstream` and `downstream`.
    fn provisionsets(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet> {
        &(&self.declared_provisionsets(upstream, downstream) & &upstream.provisionsets)
            & &downstream.provisionsets
    }

    /// Whether `provisions` is feasible.
    fn supports_provisionset(
        &self,
        provisions: ProvisionSet,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.provisionsets(upstream, downstream)
            .contains(&provisions)
    }

    /// Whether any of `candidates` is feasible.
    fn supports_any_provisionset(
        &self,
        candidates: &USet<ProvisionSet>,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        let provisionsets = self.provisionsets(upstream, downstream);
        supports_any(
            candidates,
            || !provisionsets.is_empty(),
            |provisions| provisionsets.contains(provisions),
        )
    }
}

/// Handles authentication algorithms.
pub trait AlgorithmHandler {
    /// The algorithm names this handler works with.
    fn declared_algorithms(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        USet::Universal
    }

    /// The algorithms feasible between `upstream` and `downstream`.
    fn algorithms(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        &(&self.declared_algorithms(upstream, downstream) & &upstream.algorithms)
            & &downstream.algorithms
    }

    /// Whether `algorithm` is feasible.
    fn supports_algorithm(
        &self,
        algorithm: &str,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.algorithms(upstream, downstream).contains(algorithm)
    }

    /// Whether any of `candidates` is feasible.
    fn supports_any_algorithm(
        &self,
        candidates: &USet<String>,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        let algorithms = self.algorithms(upstream, downstream);
        supports_any(
            candidates,
            || !algorithms.is_empty(),
            |algorithm| algorithms.contains(algorithm),
        )
    }
}

/// Consumes and produces tokens.
pub trait TokenHandler {
    /// Where tokens come from.
    fn input_source(&self) -> InputSource;

    /// Where tokens go.
    fn output_target(&self) -> OutputTarget;

    /// The token sets this handler needs; any superset is acceptable.
    fn declared_inputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames>;

    /// The token sets this handler can produce.
    fn declared_outputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames>;

    /// Whether upstream tokens are passed on alongside this handler's own.
    fn tokens_passthrough(&self) -> bool {
        false
    }

    /// Whether the opaque [`OPAQUE_TOKEN`] blob is passed on.
    fn opaque_passthrough(&self) -> bool {
        false
    }

    /// Transforms `input` into this step's auth info.
    fn handle_tokens(
        &self,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError>;

    /// The input token sets that upstream can actually supply.
    fn inputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        match self.declared_inputs(upstream, downstream) {
            USet::Universal => upstream.outputs().clone(),
            USet::Finite(inputs) => inputs
                .into_iter()
                .filter(|input| upstream.outputs().any_gte(input))
                .collect(),
        }
    }

    /// The output token sets that downstream can actually use.
    fn outputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        let mut outputs = self.declared_outputs(upstream, downstream);
        if self.tokens_passthrough() {
            outputs = upstream.outputs().join_product(&outputs);
        }
        let opaque = TokenNames::opaque();
        if self.opaque_passthrough() && upstream.outputs().any_gte(&opaque) {
            outputs = outputs.join_product(&USet::single(opaque));
        }
        match outputs {
            USet::Universal => USet::Universal,
            USet::Finite(outputs) => outputs
                .into_iter()
                .filter(|output| downstream.inputs().any_lte(output))
                .collect(),
        }
    }

    /// Whether this handler can start from `input`.
    fn supports_input(
        &self,
        input: &TokenNames,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.inputs(upstream, downstream).any_lte(input)
    }

    /// Whether this handler can deliver `output`.
    fn supports_output(
        &self,
        output: &TokenNames,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.outputs(upstream, downstream).any_gte(output)
    }

    /// Whether any of `candidates` can be consumed.
    fn supports_any_input(
        &self,
        candidates: &USet<TokenNames>,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        let inputs = self.inputs(upstream, downstream);
        supports_any(candidates, || !inputs.is_empty(), |input| inputs.any_lte(input))
    }

    /// Whether any of `candidates` can be delivered.
    fn supports_any_output(
        &self,
        candidates: &USet<TokenNames>,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        let outputs = self.outputs(upstream, downstream);
        supports_any(candidates, || !outputs.is_empty(), |output| outputs.any_gte(output))
    }

    /// Runs [`handle_tokens`](Self::handle_tokens), then records a verdict
    /// in the `accepted` token and carries the opaque blob through.
    fn process_tokens(
        &self,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let mut info = self.handle_tokens(input, affordances, exchange)?;
        if let Some(accepted) = info.accepted {
            info.tokens
                .insert(ACCEPTED_TOKEN, if accepted { "True" } else { "False" });
        }
        if self.opaque_passthrough() {
            if let Some(opaque) = input.opaque() {
                info.tokens.insert(OPAQUE_TOKEN, opaque);
            }
        }
        Ok(info)
    }
}

/// A handler of every negotiation parameter: the shape shared by
/// connectors and algorithm phases.
pub trait Participant:
    RealmHandler + ProvisionSetHandler + AlgorithmHandler + TokenHandler + Debug + Send + Sync
{
    /// A unique, human readable name.
    fn name(&self) -> &str;

    /// Everything this participant affords between `upstream` and
    /// `downstream`.
    fn affordances(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> ProcessAffordanceSet {
        ProcessAffordanceSet::new(
            AffordanceSet::new(
                self.realms(upstream, downstream),
                self.provisionsets(upstream, downstream),
                self.algorithms(upstream, downstream),
            ),
            self.inputs(upstream, downstream),
            self.outputs(upstream, downstream),
        )
    }

    /// Whether this participant can take part at all between `upstream` and
    /// `downstream`.
    fn supports_affordances(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> bool {
        self.supports_any_realm(&upstream.realms, upstream, downstream)
            && self.supports_any_provisionset(&upstream.provisionsets, upstream, downstream)
            && self.supports_any_algorithm(&upstream.algorithms, upstream, downstream)
            && self.supports_any_input(upstream.outputs(), upstream, downstream)
            && self.supports_any_output(downstream.inputs(), upstream, downstream)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use portico_affordance::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Relay {
        realms: USet<String>,
        passthrough: bool,
    }

    impl RealmHandler for Relay {
        fn declared_realms(
            &self,
            _upstream: &ProcessAffordanceSet,
            _downstream: &ProcessAffordanceSet,
        ) -> USet<String> {
            self.realms.clone()
        }
    }
    impl ProvisionSetHandler for Relay {}
    impl AlgorithmHandler for Relay {}

    impl TokenHandler for Relay {
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
            USet::single(TokenNames::from(["user", "password"]))
        }

        fn declared_outputs(
            &self,
            _upstream: &ProcessAffordanceSet,
            _downstream: &ProcessAffordanceSet,
        ) -> USet<TokenNames> {
            USet::single(TokenNames::from(["user", "accepted"]))
        }

        fn tokens_passthrough(&self) -> bool {
            self.passthrough
        }

        fn opaque_passthrough(&self) -> bool {
            self.passthrough
        }

        fn handle_tokens(
            &self,
            input: &TokenMap,
            _affordances: &ProcessAffordanceSet,
            _exchange: &mut Exchange<'_>,
        ) -> Result<RequestAuthInfo, AuthError> {
            let user = input.require("user")?;
            Ok(RequestAuthInfo::new([("user", user)].into_iter().collect()).with_accepted(true))
        }
    }

    impl Participant for Relay {
        fn name(&self) -> &str {
            "relay"
        }
    }

    fn upstream(outputs: &[&[&str]]) -> ProcessAffordanceSet {
        ProcessAffordanceSet::max().with_outputs(
            outputs
                .iter()
                .map(|set| set.iter().copied().collect::<TokenNames>())
                .collect(),
        )
    }

    #[test]
    fn it_narrows_realms_by_both_directions() {
        let relay = Relay {
            realms: ["a", "b"].into_iter().map(String::from).collect(),
            passthrough: false,
        };
        let mut upstream = ProcessAffordanceSet::max();
        upstream.realms = ["b", "c"].into_iter().map(String::from).collect();
        assert_eq!(
            relay.realms(&upstream, ProcessAffordanceSet::unconstrained()),
            USet::single("b".to_string())
        );
        assert!(relay.supports_realm("b", &upstream, ProcessAffordanceSet::unconstrained()));
        assert!(!relay.supports_realm("a", &upstream, ProcessAffordanceSet::unconstrained()));
    }

    #[test]
    fn it_answers_universal_candidates_without_enumerating() {
        let relay = Relay {
            realms: USet::empty(),
            passthrough: false,
        };
        let unconstrained = ProcessAffordanceSet::unconstrained();
        assert!(!relay.supports_any_realm(&USet::Universal, unconstrained, unconstrained));
        assert!(!relay.supports_affordances(unconstrained, unconstrained));
    }

    #[test]
    fn it_filters_inputs_by_upstream_outputs() {
        let relay = Relay {
            realms: USet::Universal,
            passthrough: false,
        };
        let unconstrained = ProcessAffordanceSet::unconstrained();
        assert!(relay.inputs(&upstream(&[&["user"]]), unconstrained).is_empty());
        assert!(
            relay.supports_affordances(&upstream(&[&["user", "password", "realm"]]), unconstrained)
        );
        assert!(!relay.supports_affordances(&upstream(&[&["session_id"]]), unconstrained));
    }

    #[test]
    fn it_passes_tokens_and_opaque_blobs_through() {
        let relay = Relay {
            realms: USet::Universal,
            passthrough: true,
        };
        let outputs = relay.outputs(
            &upstream(&[&["user", "password", "__"]]),
            ProcessAffordanceSet::unconstrained(),
        );
        assert_eq!(
            outputs,
            USet::single(TokenNames::from(["__", "accepted", "password", "user"]))
        );
    }

    #[test]
    fn it_records_verdicts_in_tokens() -> testresult::TestResult {
        let relay = Relay {
            realms: USet::Universal,
            passthrough: true,
        };
        let request = crate::helpers::MockRequest::get("/");
        let mut exchange = Exchange::new(&request);
        let input: TokenMap = [("user", "alice"), ("__", "blob")].into_iter().collect();
        let info = relay.process_tokens(&input, ProcessAffordanceSet::unconstrained(), &mut exchange)?;
        assert_eq!(info.tokens.get("accepted"), Some("True"));
        assert_eq!(info.tokens.get("__"), Some("blob"));
        Ok(())
    }
}
