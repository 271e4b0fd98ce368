//! Finding the best feasible authentication process.
//!
//! Every algorithm is laid out as a chain of steps: its phases, with a slot
//! for a connector wherever a phase hands tokens to one. The resolver walks
//! each chain depth first, choosing one candidate connector per slot and
//! carrying the affordances that flow out of every step into the next. A
//! chain whose every step accepts what it is given is a [`Resolution`].

use std::collections::{BTreeMap, HashMap, HashSet};

use portico_affordance::{AffordanceSet, ProcessAffordanceSet, TokenNames, USet};

use crate::{
    Algorithm, ConnectorRole, OutputTarget, Participant, ProspectiveAffordanceSet, Registry,
    Score, ScoringPolicy,
};

/// A connector chosen for the slot after phase `phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Slot {
    pub(crate) phase: usize,
    pub(crate) role: ConnectorRole,
    pub(crate) connector: usize,
}

/// A feasible process: an algorithm, the phase to start from and a
/// connector for every slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub(crate) algorithm: usize,
    pub(crate) entry: usize,
    pub(crate) general: AffordanceSet,
    pub(crate) slots: Vec<Slot>,
    pub(crate) score: Score,
}

impl Resolution {
    /// The connector of `role` in the slot after `phase`.
    pub(crate) fn connector(&self, phase: usize, role: ConnectorRole) -> Option<usize> {
        self.slots
            .iter()
            .find(|slot| slot.phase == phase && slot.role == role)
            .map(|slot| slot.connector)
    }

    /// The connector of `role` the client is talking to: the last one
    /// before the entry phase, or the first one when starting afresh.
    pub(crate) fn entry_connector(&self, role: ConnectorRole) -> Option<usize> {
        let mut slots = self.slots.iter().filter(|slot| slot.role == role);
        slots
            .clone()
            .filter(|slot| slot.phase < self.entry)
            .last()
            .or_else(|| slots.next())
            .map(|slot| slot.connector)
    }

    fn outranks(&self, other: &Resolution) -> bool {
        (self.entry, self.score) > (other.entry, other.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Phase(usize),
    Connector(ConnectorRole, usize),
}

fn steps(algorithm: &dyn Algorithm) -> Vec<Step> {
    let mut steps = Vec::new();
    for phase in algorithm.iter_phases() {
        let index = phase.index();
        steps.push(Step::Phase(index));
        match phase.spec().output_target {
            OutputTarget::Clerk => {
                steps.push(Step::Connector(ConnectorRole::Clerk, index));
                steps.push(Step::Connector(ConnectorRole::Scanner, index));
            }
            OutputTarget::Scanner => steps.push(Step::Connector(ConnectorRole::Scanner, index)),
            OutputTarget::Supplicant => {
                steps.push(Step::Connector(ConnectorRole::Supplicant, index))
            }
            OutputTarget::Algorithm => {}
            OutputTarget::End => break,
        }
    }
    steps
}

struct Walk<'a> {
    algorithm_index: usize,
    algorithm: &'a dyn Algorithm,
    entry: usize,
    steps: Vec<Step>,
}

/// Connectors that rejected a context, keyed by the context and then by
/// `(algorithm, step, connector)`.
/// A rejection holds for every branch reaching the same step with the same
/// context.
#[derive(Debug, Default)]
struct Rejections(HashMap<ProcessAffordanceSet, HashSet<(usize, usize, usize)>>);

impl Rejections {
    fn contains(&self, context: &ProcessAffordanceSet, key: (usize, usize, usize)) -> bool {
        self.0.get(context).is_some_and(|keys| keys.contains(&key))
    }

    fn insert(&mut self, context: &ProcessAffordanceSet, key: (usize, usize, usize)) {
        self.0.entry(context.clone()).or_default().insert(key);
    }
}

/// Resolves the best process for one request.
pub(crate) struct Resolver<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) candidates: &'a ProspectiveAffordanceSet,
    /// The token names found by each scanner that recognized the request.
    pub(crate) scanned: &'a BTreeMap<usize, TokenNames>,
    pub(crate) scoring: ScoringPolicy,
}

impl Resolver<'_> {
    /// The best feasible process, if any.
    ///
    /// Processes that continue from tokens the client already sent rank
    /// first, then processes with a better score. Remaining ties go to the
    /// earliest registered algorithm and connectors.
    pub(crate) fn resolve(&self) -> Option<Resolution> {
        let mut offered: USet<TokenNames> = self.scanned.values().cloned().collect();
        offered.insert(TokenNames::new());
        let upstream = self.candidates.process().clone().with_outputs(offered);

        let mut best = None;
        let mut rejections = Rejections::default();
        for (algorithm_index, algorithm) in self.registry.algorithms.iter().enumerate() {
            let algorithm: &dyn Algorithm = algorithm.as_ref();
            if !algorithm.supports_affordances(&upstream) {
                tracing::trace!(algorithm = algorithm.name(), "algorithm rejects the affordances");
                continue;
            }
            for entry in algorithm.entry_phases(&upstream) {
                let walk = Walk {
                    algorithm_index,
                    algorithm,
                    entry: entry.index(),
                    steps: steps(algorithm),
                };
                let start = ProcessAffordanceSet::new(
                    upstream.general().clone(),
                    USet::Universal,
                    USet::single(TokenNames::new()),
                );
                self.descend(&walk, 0, start, &mut Vec::new(), &mut rejections, &mut best);
            }
        }
        best
    }

    fn descend(
        &self,
        walk: &Walk<'_>,
        position: usize,
        context: ProcessAffordanceSet,
        slots: &mut Vec<Slot>,
        rejections: &mut Rejections,
        best: &mut Option<Resolution>,
    ) {
        let Some(step) = walk.steps.get(position) else {
            let general = context.into_general();
            let resolution = Resolution {
                algorithm: walk.algorithm_index,
                entry: walk.entry,
                score: self.scoring.score(&general.provisionsets),
                general,
                slots: slots.clone(),
            };
            tracing::trace!(
                algorithm = walk.algorithm.name(),
                entry = resolution.entry,
                score = ?resolution.score,
                "feasible process"
            );
            if best
                .as_ref()
                .is_none_or(|current| resolution.outranks(current))
            {
                *best = Some(resolution);
            }
            return;
        };

        match *step {
            Step::Phase(index) => {
                let Some(phase) = walk.algorithm.phase(index) else {
                    return;
                };
                for next in advance(&phase, &context) {
                    self.descend(walk, position + 1, next, slots, rejections, best);
                }
            }
            Step::Connector(role, phase) => {
                let Some(candidates) = self.candidates.connectors(role).as_finite() else {
                    return;
                };
                let enters = role == ConnectorRole::Scanner && phase + 1 == walk.entry;
                for &connector in candidates {
                    let Some(participant) = self.registry.participants(role).get(connector) else {
                        continue;
                    };
                    let scanned = match (enters, self.scanned.get(&connector)) {
                        (false, _) => None,
                        (true, Some(names)) => Some(names),
                        (true, None) => continue,
                    };
                    let key = (walk.algorithm_index, position, connector);
                    if rejections.contains(&context, key) {
                        continue;
                    }
                    let nexts = advance(participant.as_ref(), &context);
                    if nexts.is_empty() {
                        rejections.insert(&context, key);
                        continue;
                    }
                    slots.push(Slot {
                        phase,
                        role,
                        connector,
                    });
                    for next in nexts {
                        let next = match scanned {
                            Some(names) => next.with_outputs(USet::single(names.clone())),
                            None => next,
                        };
                        self.descend(walk, position + 1, next, slots, rejections, best);
                    }
                    slots.pop();
                }
            }
        }
    }
}

/// The contexts that may follow `participant`, one per token set it can
/// deliver.
fn advance<P: Participant + ?Sized>(
    participant: &P,
    upstream: &ProcessAffordanceSet,
) -> Vec<ProcessAffordanceSet> {
    let downstream = ProcessAffordanceSet::from_general(upstream.general().clone());
    if !participant.supports_affordances(upstream, &downstream) {
        tracing::trace!(participant = participant.name(), %upstream, "participant rejects the affordances");
        return Vec::new();
    }
    let afforded = participant.affordances(upstream, &downstream);
    if afforded.general().require_nonempty().is_err() {
        return Vec::new();
    }
    let general = afforded.general().clone();
    match afforded.outputs().as_finite() {
        None => vec![ProcessAffordanceSet::new(
            general,
            USet::Universal,
            USet::Universal,
        )],
        Some(outputs) => outputs
            .iter()
            .map(|output| {
                ProcessAffordanceSet::new(
                    general.clone(),
                    USet::Universal,
                    USet::single(output.clone()),
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Resolution, Slot};
    use crate::*;
    use portico_affordance::*;
    use pretty_assertions::assert_eq;

    fn resolution(entry: usize, slots: Vec<Slot>) -> Resolution {
        Resolution {
            algorithm: 0,
            entry,
            general: AffordanceSet::max(),
            slots,
            score: Score::UNRANKED,
        }
    }

    fn slot(phase: usize, role: ConnectorRole, connector: usize) -> Slot {
        Slot {
            phase,
            role,
            connector,
        }
    }

    #[test]
    fn it_lays_out_connector_slots() {
        let login = FixedAlgorithm::session_login();
        let steps = super::steps(&login);
        use super::Step::*;
        assert_eq!(
            steps,
            vec![
                Phase(0),
                Connector(ConnectorRole::Clerk, 0),
                Connector(ConnectorRole::Scanner, 0),
                Phase(1),
                Connector(ConnectorRole::Supplicant, 1),
                Phase(2),
                Connector(ConnectorRole::Supplicant, 2),
                Phase(3),
            ]
        );
    }

    #[test]
    fn it_finds_the_connectors_the_client_talks_to() {
        let chosen = resolution(
            1,
            vec![
                slot(0, ConnectorRole::Clerk, 3),
                slot(0, ConnectorRole::Scanner, 1),
                slot(1, ConnectorRole::Supplicant, 0),
            ],
        );
        assert_eq!(chosen.entry_connector(ConnectorRole::Clerk), Some(3));
        assert_eq!(chosen.entry_connector(ConnectorRole::Scanner), Some(1));
        assert_eq!(chosen.connector(1, ConnectorRole::Supplicant), Some(0));
        assert_eq!(chosen.connector(1, ConnectorRole::Clerk), None);

        let fresh = resolution(0, chosen.slots.clone());
        assert_eq!(fresh.entry_connector(ConnectorRole::Clerk), Some(3));
    }

    #[test]
    fn it_ranks_entry_before_score() {
        let mut later = resolution(1, Vec::new());
        let mut stronger = resolution(0, Vec::new());
        stronger.score = ScoringPolicy::Strength
            .score(&USet::single(SECPROV_CLIENT_AUTH | SECPROV_SERVER_NONCE));
        later.score = ScoringPolicy::Strength.score(&USet::single(SECPROV_CLIENT_AUTH.into()));
        assert!(later.outranks(&stronger));
        assert!(!stronger.outranks(&later));
        assert!(!later.outranks(&later.clone()));
    }
}
