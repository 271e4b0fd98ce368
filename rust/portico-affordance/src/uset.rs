//! Sets that may stand for every possible value.
//!
//! A [`USet`] is either a finite, ordered collection or the universal set.
//! The universal case is never materialized: operations that would have to
//! enumerate it fail with [`UnsupportedUniversalSetOperation`].
//!
//! ```
//! use portico_affordance::USet;
//!
//! let realms: USet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
//!
//! assert_eq!(&realms & &USet::universal(), realms);
//! assert!((&realms | &USet::universal()).is_universal());
//! assert!(USet::<String>::universal().iter().is_err());
//! ```

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use itertools::Itertools;

use crate::UnsupportedUniversalSetOperation;

/// A finite set, or the set of all values.
///
/// Finite members iterate in their [`Ord`] order so every traversal is
/// reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum USet<T> {
    /// Every value of `T`.
    Universal,
    /// An enumerable set of values.
    Finite(BTreeSet<T>),
}

impl<T: Ord> Default for USet<T> {
    fn default() -> Self {
        Self::Finite(BTreeSet::new())
    }
}

impl<T: Ord + Clone> USet<T> {
    /// The universal set.
    pub fn universal() -> Self {
        Self::Universal
    }

    /// The empty set.
    pub fn empty() -> Self {
        Self::Finite(BTreeSet::new())
    }

    /// A set holding exactly `value`.
    pub fn single(value: T) -> Self {
        Self::Finite(BTreeSet::from([value]))
    }

    /// Whether this is the universal set.
    pub fn is_universal(&self) -> bool {
        matches!(self, Self::Universal)
    }

    /// Whether this set is enumerable.
    pub fn is_finite(&self) -> bool {
        !self.is_universal()
    }

    /// Whether this set has no members. The universal set is never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Universal => false,
            Self::Finite(values) => values.is_empty(),
        }
    }

    /// Membership test.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self {
            Self::Universal => true,
            Self::Finite(values) => values.contains(value),
        }
    }

    /// The finite members, if any are enumerable.
    pub fn as_finite(&self) -> Option<&BTreeSet<T>> {
        match self {
            Self::Universal => None,
            Self::Finite(values) => Some(values),
        }
    }

    /// Iterates the members in order.
    pub fn iter(&self) -> Result<btree_set::Iter<'_, T>, UnsupportedUniversalSetOperation> {
        self.as_finite()
            .map(|values| values.iter())
            .ok_or(UnsupportedUniversalSetOperation::new("iter"))
    }

    /// The number of members.
    pub fn len(&self) -> Result<usize, UnsupportedUniversalSetOperation> {
        self.as_finite()
            .map(|values| values.len())
            .ok_or(UnsupportedUniversalSetOperation::new("len"))
    }

    /// The least member.
    pub fn first(&self) -> Result<Option<&T>, UnsupportedUniversalSetOperation> {
        self.as_finite()
            .map(|values| values.first())
            .ok_or(UnsupportedUniversalSetOperation::new("first"))
    }

    /// Adds a member. Adding to the universal set changes nothing.
    pub fn insert(&mut self, value: T) -> bool {
        match self {
            Self::Universal => false,
            Self::Finite(values) => values.insert(value),
        }
    }

    /// Removes a member from a finite set.
    pub fn remove<Q>(&mut self, value: &Q) -> Result<bool, UnsupportedUniversalSetOperation>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self {
            Self::Universal => Err(UnsupportedUniversalSetOperation::new("remove")),
            Self::Finite(values) => Ok(values.remove(value)),
        }
    }

    /// Keeps the members matching `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> Result<Self, UnsupportedUniversalSetOperation>
    where
        F: FnMut(&T) -> bool,
    {
        match self {
            Self::Universal => Err(UnsupportedUniversalSetOperation::new("filter")),
            Self::Finite(values) => Ok(Self::Finite(
                values.iter().filter(|value| predicate(value)).cloned().collect(),
            )),
        }
    }

    /// Set intersection. The universal set is its identity.
    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Universal, other) => other.clone(),
            (this, Self::Universal) => this.clone(),
            (Self::Finite(left), Self::Finite(right)) => {
                Self::Finite(left.intersection(right).cloned().collect())
            }
        }
    }

    /// Set union. The universal set absorbs.
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Universal, _) | (_, Self::Universal) => Self::Universal,
            (Self::Finite(left), Self::Finite(right)) => {
                Self::Finite(left.union(right).cloned().collect())
            }
        }
    }
}

/// A partially ordered value with joins and meets, such as a set of token
/// names or a provision set.
pub trait Lattice: Ord + Clone {
    /// Whether `self` is below or equal to `other`.
    fn is_subset(&self, other: &Self) -> bool;

    /// The least upper bound.
    fn join(&self, other: &Self) -> Self;

    /// The greatest lower bound.
    fn meet(&self, other: &Self) -> Self;

    /// Whether this is the least element.
    fn is_bottom(&self) -> bool;
}

impl<T: Lattice> USet<T> {
    /// Some member is a superset of `value`.
    pub fn any_gte(&self, value: &T) -> bool {
        match self {
            Self::Universal => true,
            Self::Finite(values) => values.iter().any(|member| value.is_subset(member)),
        }
    }

    /// Some member is a subset of `value`.
    pub fn any_lte(&self, value: &T) -> bool {
        match self {
            Self::Universal => true,
            Self::Finite(values) => values.iter().any(|member| member.is_subset(value)),
        }
    }

    /// Every member is a superset of `value`.
    pub fn all_gte(&self, value: &T) -> bool {
        match self {
            Self::Universal => value.is_bottom(),
            Self::Finite(values) => values.iter().all(|member| value.is_subset(member)),
        }
    }

    /// Every member is a subset of `value`.
    pub fn all_lte(&self, value: &T) -> bool {
        match self {
            Self::Universal => false,
            Self::Finite(values) => values.iter().all(|member| member.is_subset(value)),
        }
    }

    /// Joins every pair of members. The universal set is the identity and
    /// the empty set absorbs.
    pub fn join_product(&self, other: &Self) -> Self {
        self.product(other, T::join)
    }

    /// Meets every pair of members. The universal set is the identity and
    /// the empty set absorbs.
    pub fn meet_product(&self, other: &Self) -> Self {
        self.product(other, T::meet)
    }

    fn product(&self, other: &Self, combine: fn(&T, &T) -> T) -> Self {
        match (self, other) {
            (Self::Universal, other) => other.clone(),
            (this, Self::Universal) => this.clone(),
            (Self::Finite(left), Self::Finite(right)) => Self::Finite(
                left.iter()
                    .cartesian_product(right.iter())
                    .map(|(a, b)| combine(a, b))
                    .collect(),
            ),
        }
    }

    /// The members with no proper subset among the other members.
    pub fn minimal(&self) -> Self {
        match self {
            Self::Universal => Self::Universal,
            Self::Finite(values) => Self::Finite(
                values
                    .iter()
                    .filter(|member| {
                        !values
                            .iter()
                            .any(|other| other != *member && other.is_subset(member))
                    })
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// The members with no proper superset among the other members.
    pub fn maximal(&self) -> Self {
        match self {
            Self::Universal => Self::Universal,
            Self::Finite(values) => Self::Finite(
                values
                    .iter()
                    .filter(|member| {
                        !values
                            .iter()
                            .any(|other| other != *member && member.is_subset(other))
                    })
                    .cloned()
                    .collect(),
            ),
        }
    }
}

impl<T: Ord> FromIterator<T> for USet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Finite(iter.into_iter().collect())
    }
}

impl<T: Ord> From<BTreeSet<T>> for USet<T> {
    fn from(values: BTreeSet<T>) -> Self {
        Self::Finite(values)
    }
}

impl<T: Ord + Clone> BitAnd for &USet<T> {
    type Output = USet<T>;

    fn bitand(self, rhs: Self) -> USet<T> {
        self.intersection(rhs)
    }
}

impl<T: Ord + Clone> BitAnd for USet<T> {
    type Output = USet<T>;

    fn bitand(self, rhs: Self) -> USet<T> {
        self.intersection(&rhs)
    }
}

impl<T: Ord + Clone> BitAndAssign<&USet<T>> for USet<T> {
    fn bitand_assign(&mut self, rhs: &USet<T>) {
        *self = self.intersection(rhs);
    }
}

impl<T: Ord + Clone> BitOr for &USet<T> {
    type Output = USet<T>;

    fn bitor(self, rhs: Self) -> USet<T> {
        self.union(rhs)
    }
}

impl<T: Ord + Clone> BitOr for USet<T> {
    type Output = USet<T>;

    fn bitor(self, rhs: Self) -> USet<T> {
        self.union(&rhs)
    }
}

impl<T: Ord + Clone> BitOrAssign<&USet<T>> for USet<T> {
    fn bitor_assign(&mut self, rhs: &USet<T>) {
        *self = self.union(rhs);
    }
}

impl<T: Display> Display for USet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Universal => f.write_str("*"),
            Self::Finite(values) => write!(f, "{{{}}}", values.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;

    fn names(sets: &[&[&str]]) -> USet<TokenNames> {
        sets.iter()
            .map(|set| set.iter().copied().collect::<TokenNames>())
            .collect()
    }

    #[test]
    fn it_treats_universal_as_intersection_identity() {
        let finite: USet<u8> = [1, 2].into_iter().collect();
        assert_eq!(&finite & &USet::universal(), finite);
        assert_eq!(&USet::universal() & &finite, finite);
        assert!((&finite | &USet::universal()).is_universal());
    }

    #[test]
    fn it_refuses_to_enumerate_universal_sets() {
        let universal = USet::<u8>::universal();
        assert!(universal.iter().is_err());
        assert!(universal.len().is_err());
        assert!(universal.first().is_err());
        assert!(universal.filter(|_| true).is_err());
        let mut universal = universal;
        assert!(universal.remove(&1).is_err());
        assert!(!universal.insert(3));
        assert!(universal.contains(&3));
    }

    #[test]
    fn it_answers_partial_order_queries() {
        let sets = names(&[&["user", "password"], &["session_id"]]);
        let user = ["user"].into_iter().collect::<TokenNames>();
        let everything = ["user", "password", "session_id"]
            .into_iter()
            .collect::<TokenNames>();

        assert!(sets.any_gte(&user));
        assert!(!sets.all_gte(&user));
        assert!(sets.any_lte(&everything));
        assert!(sets.all_lte(&everything));
        assert!(!sets.any_lte(&user));

        let universal = USet::<TokenNames>::universal();
        assert!(universal.any_gte(&everything));
        assert!(universal.all_gte(&TokenNames::default()));
        assert!(!universal.all_gte(&user));
        assert!(!universal.all_lte(&everything));
    }

    #[test]
    fn it_computes_pairwise_products() {
        let left = names(&[&["user"], &["session_id"]]);
        let right = names(&[&["user", "password"]]);

        assert_eq!(
            left.join_product(&right),
            names(&[&["user", "password"], &["user", "password", "session_id"]])
        );
        assert_eq!(left.meet_product(&right), names(&[&["user"], &[]]));
        assert_eq!(left.join_product(&USet::universal()), left);
        assert!(left.join_product(&USet::empty()).is_empty());
    }

    #[test]
    fn it_keeps_extreme_members() {
        let sets = names(&[&[], &["user"], &["user", "password"], &["session_id"]]);
        assert_eq!(sets.minimal(), names(&[&[]]));
        assert_eq!(
            sets.maximal(),
            names(&[&["user", "password"], &["session_id"]])
        );
    }

    #[test]
    fn it_displays_members_in_order() {
        let set: USet<u8> = [3, 1, 2].into_iter().collect();
        assert_eq!(set.to_string(), "{1, 2, 3}");
        assert_eq!(USet::<u8>::universal().to_string(), "*");
    }
}
