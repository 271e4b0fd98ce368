use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, BitOr, Deref, DerefMut};
use std::sync::LazyLock;

use crate::{
    AffordanceComponent, InfiniteAffordances, ProvisionSet, TokenNames, USet,
    UnsatisfiableAffordances,
};

/// Constraints on the general negotiation parameters: realms, provision
/// sets and algorithms.
///
/// `&` intersects each field and `|` unions each field. [`max`] leaves every
/// field universal and is the identity of `&`; [`min`] leaves every field
/// empty and is the identity of `|`.
///
/// [`max`]: AffordanceSet::max
/// [`min`]: AffordanceSet::min
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffordanceSet {
    /// Acceptable realms.
    pub realms: USet<String>,
    /// Acceptable provision sets.
    pub provisionsets: USet<ProvisionSet>,
    /// Acceptable algorithm names.
    pub algorithms: USet<String>,
}

impl AffordanceSet {
    /// Builds a set from its fields.
    pub fn new(
        realms: USet<String>,
        provisionsets: USet<ProvisionSet>,
        algorithms: USet<String>,
    ) -> Self {
        Self {
            realms,
            provisionsets,
            algorithms,
        }
    }

    /// Every field universal.
    pub fn max() -> Self {
        Self::new(USet::Universal, USet::Universal, USet::Universal)
    }

    /// Every field empty.
    pub fn min() -> Self {
        Self::new(USet::empty(), USet::empty(), USet::empty())
    }

    /// Replaces the realms.
    pub fn with_realms(mut self, realms: USet<String>) -> Self {
        self.realms = realms;
        self
    }

    /// Replaces the provision sets.
    pub fn with_provisionsets(mut self, provisionsets: USet<ProvisionSet>) -> Self {
        self.provisionsets = provisionsets;
        self
    }

    /// Replaces the algorithms.
    pub fn with_algorithms(mut self, algorithms: USet<String>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// The components with no members.
    pub fn empty_components(&self) -> Vec<AffordanceComponent> {
        [
            (AffordanceComponent::Realms, self.realms.is_empty()),
            (AffordanceComponent::Provisionsets, self.provisionsets.is_empty()),
            (AffordanceComponent::Algorithms, self.algorithms.is_empty()),
        ]
        .into_iter()
        .filter_map(|(component, empty)| empty.then_some(component))
        .collect()
    }

    /// The components that are still universal.
    pub fn infinite_components(&self) -> Vec<AffordanceComponent> {
        [
            (AffordanceComponent::Realms, self.realms.is_universal()),
            (
                AffordanceComponent::Provisionsets,
                self.provisionsets.is_universal(),
            ),
            (AffordanceComponent::Algorithms, self.algorithms.is_universal()),
        ]
        .into_iter()
        .filter_map(|(component, universal)| universal.then_some(component))
        .collect()
    }

    /// Fails naming every empty component.
    pub fn require_nonempty(&self) -> Result<(), UnsatisfiableAffordances> {
        require_nonempty(self.empty_components())
    }

    /// Fails naming every universal component outside `exceptions`.
    pub fn require_finite(
        &self,
        exceptions: &[AffordanceComponent],
    ) -> Result<(), InfiniteAffordances> {
        require_finite(self.infinite_components(), exceptions)
    }
}

fn require_nonempty(components: Vec<AffordanceComponent>) -> Result<(), UnsatisfiableAffordances> {
    if components.is_empty() {
        Ok(())
    } else {
        Err(UnsatisfiableAffordances { components })
    }
}

fn require_finite(
    components: Vec<AffordanceComponent>,
    exceptions: &[AffordanceComponent],
) -> Result<(), InfiniteAffordances> {
    let components: Vec<_> = components
        .into_iter()
        .filter(|component| !exceptions.contains(component))
        .collect();
    if components.is_empty() {
        Ok(())
    } else {
        Err(InfiniteAffordances { components })
    }
}

impl BitAnd for &AffordanceSet {
    type Output = AffordanceSet;

    fn bitand(self, rhs: Self) -> AffordanceSet {
        AffordanceSet::new(
            &self.realms & &rhs.realms,
            &self.provisionsets & &rhs.provisionsets,
            &self.algorithms & &rhs.algorithms,
        )
    }
}

impl BitAnd for AffordanceSet {
    type Output = AffordanceSet;

    fn bitand(self, rhs: Self) -> AffordanceSet {
        &self & &rhs
    }
}

impl BitOr for &AffordanceSet {
    type Output = AffordanceSet;

    fn bitor(self, rhs: Self) -> AffordanceSet {
        AffordanceSet::new(
            &self.realms | &rhs.realms,
            &self.provisionsets | &rhs.provisionsets,
            &self.algorithms | &rhs.algorithms,
        )
    }
}

impl BitOr for AffordanceSet {
    type Output = AffordanceSet;

    fn bitor(self, rhs: Self) -> AffordanceSet {
        &self | &rhs
    }
}

impl Display for AffordanceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "realms={}, provisionsets={}, algorithms={}",
            self.realms, self.provisionsets, self.algorithms
        )
    }
}

static UNCONSTRAINED: LazyLock<ProcessAffordanceSet> = LazyLock::new(ProcessAffordanceSet::max);

/// General affordances plus the token sets flowing into and out of a
/// pipeline step.
///
/// Input token sets are requirements: a step accepts any token set that
/// contains one of them, so only the minimal ones are kept. Output token sets
/// are guarantees: a step that produces a set also produces each of its
/// subsets, so only the maximal ones are kept. Under that reading `&`
/// intersects inputs by joining every pair of members and intersects outputs
/// by meeting every pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessAffordanceSet {
    general: AffordanceSet,
    inputs: USet<TokenNames>,
    outputs: USet<TokenNames>,
}

impl ProcessAffordanceSet {
    /// Builds a set, normalizing the token sets.
    pub fn new(general: AffordanceSet, inputs: USet<TokenNames>, outputs: USet<TokenNames>) -> Self {
        Self {
            general,
            inputs: inputs.minimal(),
            outputs: outputs.maximal(),
        }
    }

    /// General affordances with universal token sets.
    pub fn from_general(general: AffordanceSet) -> Self {
        Self::new(general, USet::Universal, USet::Universal)
    }

    /// Every field universal.
    pub fn max() -> Self {
        Self::from_general(AffordanceSet::max())
    }

    /// Every field empty.
    pub fn min() -> Self {
        Self::new(AffordanceSet::min(), USet::empty(), USet::empty())
    }

    /// A shared, fully universal set for callers without constraints.
    pub fn unconstrained() -> &'static Self {
        &UNCONSTRAINED
    }

    /// The general affordances.
    pub fn general(&self) -> &AffordanceSet {
        &self.general
    }

    /// Consumes the set, returning the general affordances.
    pub fn into_general(self) -> AffordanceSet {
        self.general
    }

    /// Acceptable input token sets.
    pub fn inputs(&self) -> &USet<TokenNames> {
        &self.inputs
    }

    /// Guaranteed output token sets.
    pub fn outputs(&self) -> &USet<TokenNames> {
        &self.outputs
    }

    /// Replaces the inputs.
    pub fn with_inputs(mut self, inputs: USet<TokenNames>) -> Self {
        self.inputs = inputs.minimal();
        self
    }

    /// Replaces the outputs.
    pub fn with_outputs(mut self, outputs: USet<TokenNames>) -> Self {
        self.outputs = outputs.maximal();
        self
    }

    /// The components with no members.
    pub fn empty_components(&self) -> Vec<AffordanceComponent> {
        let mut components = self.general.empty_components();
        if self.inputs.is_empty() {
            components.push(AffordanceComponent::Inputs);
        }
        if self.outputs.is_empty() {
            components.push(AffordanceComponent::Outputs);
        }
        components
    }

    /// The components that are still universal.
    pub fn infinite_components(&self) -> Vec<AffordanceComponent> {
        let mut components = self.general.infinite_components();
        if self.inputs.is_universal() {
            components.push(AffordanceComponent::Inputs);
        }
        if self.outputs.is_universal() {
            components.push(AffordanceComponent::Outputs);
        }
        components
    }

    /// Fails naming every empty component.
    pub fn require_nonempty(&self) -> Result<(), UnsatisfiableAffordances> {
        require_nonempty(self.empty_components())
    }

    /// Fails naming every universal component outside `exceptions`.
    pub fn require_finite(
        &self,
        exceptions: &[AffordanceComponent],
    ) -> Result<(), InfiniteAffordances> {
        require_finite(self.infinite_components(), exceptions)
    }
}

impl Deref for ProcessAffordanceSet {
    type Target = AffordanceSet;

    fn deref(&self) -> &AffordanceSet {
        &self.general
    }
}

impl DerefMut for ProcessAffordanceSet {
    fn deref_mut(&mut self) -> &mut AffordanceSet {
        &mut self.general
    }
}

impl From<AffordanceSet> for ProcessAffordanceSet {
    fn from(general: AffordanceSet) -> Self {
        Self::from_general(general)
    }
}

impl BitAnd for &ProcessAffordanceSet {
    type Output = ProcessAffordanceSet;

    fn bitand(self, rhs: Self) -> ProcessAffordanceSet {
        ProcessAffordanceSet::new(
            &self.general & &rhs.general,
            self.inputs.join_product(&rhs.inputs),
            self.outputs.meet_product(&rhs.outputs),
        )
    }
}

impl BitAnd for ProcessAffordanceSet {
    type Output = ProcessAffordanceSet;

    fn bitand(self, rhs: Self) -> ProcessAffordanceSet {
        &self & &rhs
    }
}

impl BitOr for &ProcessAffordanceSet {
    type Output = ProcessAffordanceSet;

    fn bitor(self, rhs: Self) -> ProcessAffordanceSet {
        ProcessAffordanceSet::new(
            &self.general | &rhs.general,
            &self.inputs | &rhs.inputs,
            &self.outputs | &rhs.outputs,
        )
    }
}

impl BitOr for ProcessAffordanceSet {
    type Output = ProcessAffordanceSet;

    fn bitor(self, rhs: Self) -> ProcessAffordanceSet {
        &self | &rhs
    }
}

impl Display for ProcessAffordanceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, inputs={}, outputs={}",
            self.general, self.inputs, self.outputs
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn uset<T: Ord + Clone + std::fmt::Debug>(
        values: impl Strategy<Value = Vec<T>>,
    ) -> impl Strategy<Value = USet<T>> {
        prop_oneof![
            1 => Just(USet::Universal),
            4 => values.prop_map(|values| values.into_iter().collect()),
        ]
    }

    fn token_names() -> impl Strategy<Value = TokenNames> {
        proptest::sample::subsequence(vec!["user", "password", "digest", "session_id"], 0..=3)
            .prop_map(|names| names.into_iter().collect())
    }

    fn general() -> impl Strategy<Value = AffordanceSet> {
        let realms = uset(proptest::collection::vec(
            proptest::sample::select(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
            0..3,
        ));
        let provisionsets = uset(proptest::collection::vec(
            proptest::sample::select(ProvisionSet::all_sets().to_vec()),
            0..4,
        ));
        let algorithms = uset(proptest::collection::vec(
            proptest::sample::select(vec!["plain".to_string(), "digest".to_string()]),
            0..2,
        ));
        (realms, provisionsets, algorithms)
            .prop_map(|(realms, provisionsets, algorithms)| {
                AffordanceSet::new(realms, provisionsets, algorithms)
            })
    }

    fn process() -> impl Strategy<Value = ProcessAffordanceSet> {
        (
            general(),
            uset(proptest::collection::vec(token_names(), 0..3)),
            uset(proptest::collection::vec(token_names(), 0..3)),
        )
            .prop_map(|(general, inputs, outputs)| {
                ProcessAffordanceSet::new(general, inputs, outputs)
            })
    }

    proptest! {
        #[test]
        fn it_intersects_idempotently(a in process(), b in process()) {
            let ab = &a & &b;
            prop_assert_eq!(&ab & &b, ab);
        }

        #[test]
        fn it_treats_max_as_intersection_identity(a in process()) {
            prop_assert_eq!(&a & &ProcessAffordanceSet::max(), a);
        }

        #[test]
        fn it_treats_min_as_intersection_zero(a in process()) {
            prop_assert_eq!(&a & &ProcessAffordanceSet::min(), ProcessAffordanceSet::min());
        }

        #[test]
        fn it_treats_min_as_union_identity(a in process()) {
            prop_assert_eq!(&a | &ProcessAffordanceSet::min(), a);
        }

        #[test]
        fn it_keeps_intersections_finite(a in process(), b in process()) {
            let ab = &a & &b;
            prop_assert_eq!(
                ab.realms.is_finite(),
                a.realms.is_finite() || b.realms.is_finite()
            );
            prop_assert_eq!(
                ab.inputs().is_finite(),
                a.inputs().is_finite() || b.inputs().is_finite()
            );
            prop_assert_eq!(
                ab.outputs().is_finite(),
                a.outputs().is_finite() || b.outputs().is_finite()
            );
        }

        #[test]
        fn it_obeys_general_laws(a in general(), b in general()) {
            let ab = &a & &b;
            prop_assert_eq!(&ab & &b, ab);
            prop_assert_eq!(&a & &AffordanceSet::max(), a.clone());
            prop_assert_eq!(&a & &AffordanceSet::min(), AffordanceSet::min());
            prop_assert_eq!(&a | &AffordanceSet::min(), a);
        }
    }

    #[test]
    fn it_names_empty_components() {
        let affordances = AffordanceSet::max()
            .with_realms(USet::empty())
            .with_algorithms(USet::empty());
        assert_eq!(
            affordances.require_nonempty(),
            Err(UnsatisfiableAffordances {
                components: vec![
                    AffordanceComponent::Realms,
                    AffordanceComponent::Algorithms
                ]
            })
        );
    }

    #[test]
    fn it_names_infinite_components_except_exceptions() {
        let affordances = ProcessAffordanceSet::new(
            AffordanceSet::max().with_realms(USet::single("example.net".into())),
            USet::single(TokenNames::new()),
            USet::Universal,
        );
        assert_eq!(
            affordances.require_finite(&[AffordanceComponent::Outputs]),
            Err(InfiniteAffordances {
                components: vec![
                    AffordanceComponent::Provisionsets,
                    AffordanceComponent::Algorithms
                ]
            })
        );
        let message = affordances
            .require_finite(&[])
            .map_err(|error| error.to_string())
            .unwrap_err();
        assert_eq!(
            message,
            "infinite affordances: universal provisionsets, algorithms, outputs"
        );
    }

    #[test]
    fn it_normalizes_token_sets() {
        let affordances = ProcessAffordanceSet::new(
            AffordanceSet::max(),
            [TokenNames::from(["user"]), TokenNames::from(["user", "password"])]
                .into_iter()
                .collect(),
            [TokenNames::from(["user"]), TokenNames::from(["user", "password"])]
                .into_iter()
                .collect(),
        );
        assert_eq!(affordances.inputs(), &USet::single(TokenNames::from(["user"])));
        assert_eq!(
            affordances.outputs(),
            &USet::single(TokenNames::from(["user", "password"]))
        );
    }

    #[test]
    fn it_combines_token_sets_as_products() {
        let left = ProcessAffordanceSet::max()
            .with_inputs(USet::single(TokenNames::from(["user"])))
            .with_outputs(USet::single(TokenNames::from(["user", "accepted"])));
        let right = ProcessAffordanceSet::max()
            .with_inputs(USet::single(TokenNames::from(["password"])))
            .with_outputs(USet::single(TokenNames::from(["user", "session_id"])));
        let both = &left & &right;
        assert_eq!(
            both.inputs(),
            &USet::single(TokenNames::from(["password", "user"]))
        );
        assert_eq!(both.outputs(), &USet::single(TokenNames::from(["user"])));
    }
}
