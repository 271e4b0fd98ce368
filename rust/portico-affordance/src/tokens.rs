use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{Lattice, MissingTokens};

/// The token name reserved for an opaque blob that connectors may carry
/// through untouched.
pub const OPAQUE_TOKEN: &str = "__";

/// The token name carrying a verification outcome.
pub const ACCEPTED_TOKEN: &str = "accepted";

/// A set of token names, such as `{user, password}`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenNames(BTreeSet<String>);

impl TokenNames {
    /// The empty set of names.
    pub fn new() -> Self {
        Self::default()
    }

    /// The set holding only [`OPAQUE_TOKEN`].
    pub fn opaque() -> Self {
        Self::from([OPAQUE_TOKEN])
    }

    /// Whether `name` is a member.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Adds a name.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    /// The number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no names.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// A copy with `other`'s names added.
    pub fn with(&self, other: &TokenNames) -> Self {
        self.join(other)
    }
}

impl Lattice for TokenNames {
    fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    fn join(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    fn meet(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    fn is_bottom(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TokenNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TokenNames {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().collect()
    }
}

impl Display for TokenNames {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(", "))
    }
}

impl Debug for TokenNames {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Named authentication data gathered while processing one request.
///
/// The `Debug` rendering lists token names only, so maps can be logged
/// without leaking secrets.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenMap(BTreeMap<String, String>);

impl TokenMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The value of `name`, or [`MissingTokens`] naming it.
    pub fn require(&self, name: &str) -> Result<&str, MissingTokens> {
        self.get(name).ok_or_else(|| MissingTokens {
            names: vec![name.to_string()],
        })
    }

    /// Checks that every one of `names` is present.
    pub fn require_all<'a, I>(&self, names: I) -> Result<(), MissingTokens>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing: Vec<String> = names
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingTokens { names: missing })
        }
    }

    /// Sets `name`, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Removes `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// The opaque pass-through blob, if any.
    pub fn opaque(&self) -> Option<&str> {
        self.get(OPAQUE_TOKEN)
    }

    /// The names present in this map.
    pub fn names(&self) -> TokenNames {
        self.0.keys().cloned().collect()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The number of tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An immutable, hashable copy.
    pub fn frozen(&self) -> FrozenTokenMap {
        FrozenTokenMap(Arc::new(self.0.clone()))
    }
}

impl Debug for TokenMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TokenMap").field(&self.names()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TokenMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TokenMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0.extend(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
    }
}

/// An immutable token map that can be hashed, compared and shared.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrozenTokenMap(Arc<BTreeMap<String, String>>);

impl FrozenTokenMap {
    /// Freezes the given entries.
    pub fn new<K, V, I>(tokens: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        TokenMap::from_iter(tokens).frozen()
    }

    /// The value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The names present in this map.
    pub fn names(&self) -> TokenNames {
        self.0.keys().cloned().collect()
    }

    /// The number of tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A mutable copy.
    pub fn unfrozen(&self) -> TokenMap {
        TokenMap(self.0.as_ref().clone())
    }
}

impl From<TokenMap> for FrozenTokenMap {
    fn from(tokens: TokenMap) -> Self {
        Self(Arc::new(tokens.0))
    }
}

impl Debug for FrozenTokenMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FrozenTokenMap").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use testresult::TestResult;

    proptest! {
        #[test]
        fn it_round_trips_through_frozen_maps(
            tokens in proptest::collection::btree_map("[a-z_]{1,8}", ".{0,12}", 0..8)
        ) {
            let frozen = FrozenTokenMap::new(tokens.clone());
            prop_assert_eq!(frozen.unfrozen().frozen(), frozen.clone());
            prop_assert_eq!(frozen.len(), tokens.len());
        }
    }

    #[test]
    fn it_reports_missing_tokens() {
        let tokens: TokenMap = [("user", "alice")].into_iter().collect();
        assert_eq!(tokens.require("user"), Ok("alice"));
        assert_eq!(
            tokens.require_all(["user", "password", "realm"]),
            Err(MissingTokens {
                names: vec!["password".into(), "realm".into()]
            })
        );
    }

    #[test]
    fn it_hides_values_from_debug_output() {
        let tokens: TokenMap = [("user", "alice"), ("password", "hunter2")]
            .into_iter()
            .collect();
        let rendered = format!("{tokens:?}");
        assert!(rendered.contains("password"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn it_hashes_frozen_maps_by_content() {
        let mut seen = HashSet::new();
        seen.insert(FrozenTokenMap::new([("user", "alice")]));
        assert!(seen.contains(&FrozenTokenMap::new([("user", "alice")])));
        assert!(!seen.contains(&FrozenTokenMap::new([("user", "bob")])));
    }

    #[test]
    fn it_serializes_as_a_plain_object() -> TestResult {
        let tokens: TokenMap = [("session_id", "abc")].into_iter().collect();
        let json = serde_json::to_string(&tokens)?;
        assert_eq!(json, r#"{"session_id":"abc"}"#);
        let parsed: TokenMap = serde_json::from_str(&json)?;
        assert_eq!(parsed, tokens);
        Ok(())
    }

    #[test]
    fn it_lists_names() {
        let tokens: TokenMap = [("user", "alice"), (OPAQUE_TOKEN, "blob")]
            .into_iter()
            .collect();
        assert_eq!(tokens.names(), TokenNames::from(["__", "user"]));
        assert_eq!(tokens.opaque(), Some("blob"));
    }
}
