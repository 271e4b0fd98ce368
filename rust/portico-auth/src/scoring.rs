use portico_affordance::{ProvisionSet, USet};
use serde::{Deserialize, Serialize};

/// How candidate processes are ranked once every feasible one is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Prefer the candidate guaranteeing the most provisions, breaking ties
    /// by flag value. A candidate guaranteeing a strict superset of
    /// another's provisions always wins.
    #[default]
    Strength,
    /// Prefer the candidate whose best provision set has the highest raw
    /// flag value.
    FlagValue,
}

/// The rank of a candidate; greater is better.
///
/// Candidates whose provision sets are universal or empty cannot be ranked
/// and score below every other candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(Option<(u32, u32)>);

impl Score {
    /// The lowest score.
    pub const UNRANKED: Score = Score(None);
}

impl ScoringPolicy {
    /// Scores a candidate by the best of its provision sets.
    pub fn score(self, provisionsets: &USet<ProvisionSet>) -> Score {
        let Some(sets) = provisionsets.as_finite() else {
            return Score::UNRANKED;
        };
        Score(sets.iter().map(|set| self.rank(*set)).max())
    }

    fn rank(self, set: ProvisionSet) -> (u32, u32) {
        match self {
            Self::Strength => (set.len(), set.bits()),
            Self::FlagValue => (set.bits(), 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use portico_affordance::*;
    use proptest::prelude::*;

    fn provisionset() -> impl Strategy<Value = ProvisionSet> {
        prop::sample::select(ProvisionSet::all_sets().to_vec())
    }

    #[test]
    fn it_ranks_universal_sets_lowest() {
        let policy = ScoringPolicy::default();
        let universal = policy.score(&USet::Universal);
        let empty = policy.score(&USet::empty());
        let some = policy.score(&USet::single(ProvisionSet::empty()));
        assert_eq!(universal, Score::UNRANKED);
        assert_eq!(empty, Score::UNRANKED);
        assert!(some > universal);
    }

    #[test]
    fn it_prefers_more_provisions_over_higher_flags() {
        let digest = SECPROV_CLIENT_AUTH | SECPROV_CLIENT_NEVER_SENDS_SECRET | SECPROV_SERVER_NONCE;
        let entity = ProvisionSet::from(SECPROV_REQUEST_ENTITY_INTEGRITY);

        let strength = ScoringPolicy::Strength;
        assert!(strength.score(&USet::single(digest)) > strength.score(&USet::single(entity)));

        let flags = ScoringPolicy::FlagValue;
        assert!(flags.score(&USet::single(digest)) < flags.score(&USet::single(entity)));
    }

    #[test]
    fn it_deserializes_policies() -> testresult::TestResult {
        let policy: ScoringPolicy = serde_json::from_str(r#""flag_value""#)?;
        pretty_assertions::assert_eq!(policy, ScoringPolicy::FlagValue);
        Ok(())
    }

    proptest! {
        #[test]
        fn it_lets_strict_supersets_win(a in provisionset(), b in provisionset()) {
            let policy = ScoringPolicy::Strength;
            let joined = a | b;
            prop_assume!(joined != a);
            prop_assert!(policy.score(&USet::single(joined)) > policy.score(&USet::single(a)));
        }
    }
}
