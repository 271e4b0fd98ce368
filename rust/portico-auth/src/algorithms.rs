//! Authentication algorithms and their phases.
//!
//! An [`Algorithm`] is an ordered sequence of phases. Each phase is a
//! pipeline participant with a fixed [`InputSource`] and [`OutputTarget`];
//! together they describe a mechanism such as "challenge, scan, verify with a
//! backend, judge the backend's answer". Phases are addressed by index and
//! viewed through [`Phase`], which borrows the algorithm.

use std::fmt::{Debug, Display, Formatter};

use portico_affordance::{
    Provision, ProcessAffordanceSet, ProvisionSet, TokenMap, TokenNames, USet,
};

use crate::{
    AlgorithmHandler, AuthError, Exchange, InputSource, OutputTarget, Participant,
    ProvisionSetHandler, RealmHandler, RequestAuthInfo, TokenHandler,
};

/// The fixed shape of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseSpec {
    /// The phase name, unique within its algorithm.
    pub name: &'static str,
    /// Where the phase takes its tokens from.
    pub input_source: InputSource,
    /// Where the phase sends its tokens.
    pub output_target: OutputTarget,
}

impl PhaseSpec {
    /// A phase shape.
    pub const fn new(
        name: &'static str,
        input_source: InputSource,
        output_target: OutputTarget,
    ) -> Self {
        Self {
            name,
            input_source,
            output_target,
        }
    }
}

/// An authentication mechanism.
///
/// Implementations are shared by every request and must not keep
/// request-scoped state; anything learned about the request travels in the
/// token map and the [`Exchange`].
pub trait Algorithm: Debug + Send + Sync {
    /// The algorithm name, e.g. `plain`.
    fn name(&self) -> &str;

    /// The phases, in order.
    fn phases(&self) -> &[PhaseSpec];

    /// The provision sets this algorithm can guarantee.
    fn provisionsets(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet>;

    /// The realms phase `index` serves.
    fn phase_realms(
        &self,
        _index: usize,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        USet::Universal
    }

    /// The token sets phase `index` needs.
    fn phase_inputs(
        &self,
        index: usize,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames>;

    /// The token sets phase `index` adds to what it receives.
    fn phase_outputs(
        &self,
        index: usize,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames>;

    /// Runs phase `index`.
    fn process_phase(
        &self,
        index: usize,
        input: &TokenMap,
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError>;
}

impl<'a> dyn Algorithm + 'a {
    /// A view of phase `index`.
    pub fn phase(&self, index: usize) -> Option<Phase<'_>> {
        self.phases().get(index).map(|spec| Phase {
            algorithm: self,
            index,
            spec: *spec,
        })
    }

    /// Views of every phase, in order.
    pub fn iter_phases(&self) -> impl Iterator<Item = Phase<'_>> {
        self.phases()
            .iter()
            .enumerate()
            .map(move |(index, spec)| Phase {
                algorithm: self,
                index,
                spec: *spec,
            })
    }

    /// Whether this algorithm is acceptable under `upstream` at all.
    pub fn supports_affordances(&self, upstream: &ProcessAffordanceSet) -> bool {
        let downstream = ProcessAffordanceSet::unconstrained();
        upstream.algorithms.contains(self.name())
            && !(&self.provisionsets(upstream, downstream) & &upstream.provisionsets).is_empty()
    }

    /// The phases a process may start from given what `upstream` offers,
    /// furthest first.
    ///
    /// A process starts either at the beginning or right after a scanner;
    /// phases fed by supplicants or other phases can only be reached from an
    /// earlier phase.
    pub fn entry_phases(&self, upstream: &ProcessAffordanceSet) -> Vec<Phase<'_>> {
        let downstream = ProcessAffordanceSet::from_general(upstream.general().clone());
        let mut phases: Vec<_> = self
            .iter_phases()
            .filter(|phase| {
                matches!(
                    phase.input_source(),
                    InputSource::Start | InputSource::Scanner
                ) && phase.supports_affordances(upstream, &downstream)
            })
            .collect();
        phases.reverse();
        phases
    }

    /// The furthest phase a process may start from.
    pub fn next_phase(&self, upstream: &ProcessAffordanceSet) -> Option<Phase<'_>> {
        self.entry_phases(upstream).into_iter().next()
    }

    /// Checks that the phases chain into a well formed pipeline: the first
    /// starts the process, the last ends it, and every phase takes its
    /// tokens from whatever the previous one feeds.
    pub fn validate(&self) -> Result<(), AuthError> {
        let phases = self.phases();
        let invalid = |message: String| {
            Err(AuthError::configuration(format!(
                "algorithm '{}': {message}",
                self.name()
            )))
        };
        let Some(first) = phases.first() else {
            return invalid("no phases".into());
        };
        if first.input_source != InputSource::Start {
            return invalid(format!("phase '{}' does not start the process", first.name));
        }
        for (index, pair) in phases.windows(2).enumerate() {
            let (phase, next) = (&pair[0], &pair[1]);
            let expected = match phase.output_target {
                OutputTarget::Algorithm => InputSource::Algorithm,
                OutputTarget::Clerk => InputSource::Scanner,
                OutputTarget::Scanner => InputSource::Scanner,
                OutputTarget::Supplicant => InputSource::Supplicant,
                OutputTarget::End => {
                    return invalid(format!("phase {index} '{}' ends the process early", phase.name));
                }
            };
            if next.input_source != expected {
                return invalid(format!(
                    "phase '{}' expects tokens from {} but follows a phase that feeds {}",
                    next.name, next.input_source, phase.output_target
                ));
            }
        }
        match phases.last() {
            Some(last) if last.output_target == OutputTarget::End => Ok(()),
            _ => invalid("the last phase does not end the process".into()),
        }
    }
}

/// One phase of an algorithm, viewed as a pipeline participant.
#[derive(Debug, Clone, Copy)]
pub struct Phase<'a> {
    algorithm: &'a dyn Algorithm,
    index: usize,
    spec: PhaseSpec,
}

impl<'a> Phase<'a> {
    /// The owning algorithm.
    pub fn algorithm(&self) -> &'a dyn Algorithm {
        self.algorithm
    }

    /// The position of this phase.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The phase shape.
    pub fn spec(&self) -> PhaseSpec {
        self.spec
    }

    /// The phase after this one.
    pub fn next_phase(&self) -> Option<Phase<'a>> {
        self.algorithm.phase(self.index + 1)
    }

    /// The phase before this one.
    pub fn prev_phase(&self) -> Option<Phase<'a>> {
        self.index
            .checked_sub(1)
            .and_then(|index| self.algorithm.phase(index))
    }
}

impl Display for Phase<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.algorithm.name(), self.spec.name)
    }
}

impl RealmHandler for Phase<'_> {
    fn declared_realms(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        self.algorithm
            .phase_realms(self.index, upstream, downstream)
    }
}

impl ProvisionSetHandler for Phase<'_> {
    fn declared_provisionsets(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet> {
        self.algorithm.provisionsets(upstream, downstream)
    }
}

impl AlgorithmHandler for Phase<'_> {
    fn declared_algorithms(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<String> {
        USet::single(self.algorithm.name().to_string())
    }
}

impl TokenHandler for Phase<'_> {
    fn input_source(&self) -> InputSource {
        self.spec.input_source
    }

    fn output_target(&self) -> OutputTarget {
        self.spec.output_target
    }

    fn declared_inputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        self.algorithm
            .phase_inputs(self.index, upstream, downstream)
    }

    fn declared_outputs(
        &self,
        upstream: &ProcessAffordanceSet,
        downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        self.algorithm
            .phase_outputs(self.index, upstream, downstream)
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
        affordances: &ProcessAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        self.algorithm
            .process_phase(self.index, input, affordances, exchange)
    }
}

impl Participant for Phase<'_> {
    fn name(&self) -> &str {
        self.spec.name
    }
}

/// An algorithm whose phases pass fixed token sets along and whose last
/// phase reads the verdict from the `accepted` token.
///
/// The plain and session mechanisms are of this kind; see
/// [`FixedAlgorithm::plain`], [`FixedAlgorithm::session_login`] and
/// [`FixedAlgorithm::session_recall`].
#[derive(Debug, Clone)]
pub struct FixedAlgorithm {
    name: &'static str,
    provision: Provision,
    phases: &'static [PhaseSpec],
    tokens: &'static [&'static [&'static str]],
}

impl FixedAlgorithm {
    /// An algorithm of `phases`, where phase `i` needs and passes on
    /// `tokens[i]`.
    pub const fn new(
        name: &'static str,
        provision: Provision,
        phases: &'static [PhaseSpec],
        tokens: &'static [&'static [&'static str]],
    ) -> Self {
        Self {
            name,
            provision,
            phases,
            tokens,
        }
    }

    fn tokens(&self, index: usize) -> USet<TokenNames> {
        self.tokens
            .get(index)
            .map(|names| USet::single(names.iter().copied().collect()))
            .unwrap_or_else(USet::empty)
    }
}

impl Algorithm for FixedAlgorithm {
    fn name(&self) -> &str {
        self.name
    }

    fn phases(&self) -> &[PhaseSpec] {
        self.phases
    }

    fn provisionsets(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<ProvisionSet> {
        USet::single(self.provision.into())
    }

    fn phase_inputs(
        &self,
        index: usize,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        self.tokens(index)
    }

    fn phase_outputs(
        &self,
        index: usize,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        self.tokens(index)
    }

    fn process_phase(
        &self,
        index: usize,
        input: &TokenMap,
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let info = RequestAuthInfo::new(input.clone()).with_provisions(self.provision);
        match self.phases.get(index) {
            Some(spec) if spec.output_target == OutputTarget::End => {
                Ok(info.with_accepted_token())
            }
            Some(_) => Ok(info),
            None => Err(AuthError::internal(format!(
                "algorithm '{}' has no phase {index}",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use portico_affordance::*;
    use pretty_assertions::assert_eq;

    fn scanned(names: &[&[&str]]) -> ProcessAffordanceSet {
        let mut outputs: USet<TokenNames> = names
            .iter()
            .map(|set| set.iter().copied().collect::<TokenNames>())
            .collect();
        outputs.insert(TokenNames::new());
        ProcessAffordanceSet::max().with_outputs(outputs)
    }

    #[test]
    fn it_validates_the_builtin_algorithms() -> testresult::TestResult {
        for algorithm in [
            FixedAlgorithm::plain(),
            FixedAlgorithm::session_login(),
            FixedAlgorithm::session_recall(),
        ] {
            let algorithm: &dyn Algorithm = &algorithm;
            algorithm.validate()?;
        }
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_phase_chains() {
        const PHASES: &[PhaseSpec] = &[
            PhaseSpec::new("solicit", InputSource::Start, OutputTarget::Clerk),
            PhaseSpec::new("judge", InputSource::Supplicant, OutputTarget::End),
        ];
        let algorithm = FixedAlgorithm::new("broken", SECPROV_CLIENT_AUTH, PHASES, &[&[], &[]]);
        let algorithm: &dyn Algorithm = &algorithm;
        assert!(matches!(
            algorithm.validate(),
            Err(AuthError::Configuration { .. })
        ));
    }

    #[test]
    fn it_enters_at_the_start_without_tokens() {
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let phase = plain.next_phase(&scanned(&[]));
        assert_eq!(phase.map(|phase| phase.index()), Some(0));
    }

    #[test]
    fn it_enters_after_the_scanner_when_credentials_were_scanned() {
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let entries: Vec<_> = plain
            .entry_phases(&scanned(&[&["user", "password"]]))
            .iter()
            .map(|phase| phase.index())
            .collect();
        assert_eq!(entries, vec![1, 0]);
    }

    #[test]
    fn it_never_enters_at_a_supplicant_fed_phase() {
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let entries: Vec<_> = plain
            .entry_phases(&scanned(&[&["user", "accepted"]]))
            .iter()
            .map(|phase| phase.index())
            .collect();
        assert_eq!(entries, vec![0]);
    }

    #[test]
    fn it_navigates_between_phases() -> testresult::TestResult {
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let first = plain.phase(0).ok_or("no first phase")?;
        let second = first.next_phase().ok_or("no second phase")?;
        assert_eq!(second.index(), 1);
        assert_eq!(second.prev_phase().map(|phase| phase.index()), Some(0));
        assert!(first.prev_phase().is_none());
        assert_eq!(second.to_string(), "plain.verify_creds_with_backend");
        Ok(())
    }

    #[test]
    fn it_passes_tokens_through_phases() {
        let plain = FixedAlgorithm::plain();
        let plain: &dyn Algorithm = &plain;
        let Some(verify) = plain.phase(1) else {
            panic!("plain has a second phase");
        };
        let upstream = scanned(&[&["user", "password", "__"]]);
        let outputs = verify.outputs(&upstream, ProcessAffordanceSet::unconstrained());
        assert_eq!(
            outputs,
            USet::single(TokenNames::from(["__", "password", "user"]))
        );
        assert_eq!(
            verify.algorithms(&upstream, ProcessAffordanceSet::unconstrained()),
            USet::single("plain".to_string())
        );
    }
}
