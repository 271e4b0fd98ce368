//! Authentication spaces: the location-scoped defaults that negotiation
//! starts from.

use std::sync::Arc;

use glob::Pattern;
use portico_affordance::{AffordanceSet, Provision, ProvisionSet, SECPROV_CLIENT_AUTH, USet};
use serde::{Deserialize, Serialize};

use crate::{AuthError, ConnectorRole, SpaceBinding};

/// Defaults for every location a space governs: which realms, provision
/// sets and algorithms are acceptable, and which connectors may be used.
///
/// Connectors and algorithms are referenced by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    realms: USet<String>,
    provisionsets: USet<ProvisionSet>,
    algorithms: USet<String>,
    clerks: USet<String>,
    scanners: USet<String>,
    supplicants: USet<String>,
}

impl Default for Space {
    fn default() -> Self {
        Self {
            realms: USet::Universal,
            provisionsets: ProvisionSet::at_least(SECPROV_CLIENT_AUTH),
            algorithms: USet::Universal,
            clerks: USet::Universal,
            scanners: USet::Universal,
            supplicants: USet::Universal,
        }
    }
}

impl Space {
    /// A builder starting from the defaults: any realm, algorithm and
    /// connector, and provision sets that authenticate the client.
    pub fn builder() -> SpaceBuilder {
        SpaceBuilder::default()
    }

    /// Acceptable realms.
    pub fn realms(&self) -> &USet<String> {
        &self.realms
    }

    /// Acceptable provision sets.
    pub fn provisionsets(&self) -> &USet<ProvisionSet> {
        &self.provisionsets
    }

    /// Acceptable algorithm names.
    pub fn algorithms(&self) -> &USet<String> {
        &self.algorithms
    }

    /// The names of the usable connectors of `role`.
    pub fn connectors(&self, role: ConnectorRole) -> &USet<String> {
        match role {
            ConnectorRole::Clerk => &self.clerks,
            ConnectorRole::Scanner => &self.scanners,
            ConnectorRole::Supplicant => &self.supplicants,
        }
    }

    /// The general affordances of this space.
    pub fn general(&self) -> AffordanceSet {
        AffordanceSet::new(
            self.realms.clone(),
            self.provisionsets.clone(),
            self.algorithms.clone(),
        )
    }

    /// This space's affordances narrowed by what a caller requires.
    pub fn affordances(&self, required: &AffordanceSet) -> AffordanceSet {
        &self.general() & required
    }
}

/// Builds a [`Space`].
#[derive(Debug, Clone, Default)]
pub struct SpaceBuilder {
    space: Space,
}

impl SpaceBuilder {
    /// Restricts the realms.
    pub fn realms<I, S>(mut self, realms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.space.realms = realms.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the realms to one.
    pub fn realm(self, realm: impl Into<String>) -> Self {
        self.realms([realm.into()])
    }

    /// Accepts every provision set that guarantees at least `required`.
    pub fn provisions(mut self, required: impl Into<ProvisionSet>) -> Self {
        self.space.provisionsets = ProvisionSet::at_least(required);
        self
    }

    /// Accepts exactly `provisionsets`.
    pub fn provisionsets(mut self, provisionsets: USet<ProvisionSet>) -> Self {
        self.space.provisionsets = provisionsets;
        self
    }

    /// Restricts the algorithms.
    pub fn algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.space.algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the connectors of `role`.
    pub fn connectors<I, S>(mut self, role: ConnectorRole, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        match role {
            ConnectorRole::Clerk => self.space.clerks = names,
            ConnectorRole::Scanner => self.space.scanners = names,
            ConnectorRole::Supplicant => self.space.supplicants = names,
        }
        self
    }

    /// Restricts the clerks.
    pub fn clerks<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectors(ConnectorRole::Clerk, names)
    }

    /// Restricts the scanners.
    pub fn scanners<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectors(ConnectorRole::Scanner, names)
    }

    /// Restricts the supplicants.
    pub fn supplicants<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectors(ConnectorRole::Supplicant, names)
    }

    /// Finishes the space.
    pub fn build(self) -> Space {
        self.space
    }
}

/// A serialisable description of a space and the locations it governs.
///
/// Absent fields keep the [`Space`] defaults. `provisions` lists flag names
/// (`SECPROV_` prefix optional); the space then accepts every provision set
/// guaranteeing at least those flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpaceConfig {
    /// Location patterns; the first is the space key.
    pub locs: Vec<String>,
    /// Acceptable realms.
    pub realms: Option<Vec<String>>,
    /// Provision flags every accepted provision set must guarantee.
    pub provisions: Option<Vec<String>>,
    /// Acceptable algorithm names.
    pub algorithms: Option<Vec<String>>,
    /// Usable clerk names.
    pub clerks: Option<Vec<String>>,
    /// Usable scanner names.
    pub scanners: Option<Vec<String>>,
    /// Usable supplicant names.
    pub supplicants: Option<Vec<String>>,
}

impl SpaceConfig {
    /// Builds the space this config describes.
    pub fn to_space(&self) -> Result<Space, AuthError> {
        let mut builder = Space::builder();
        if let Some(realms) = &self.realms {
            builder = builder.realms(realms.iter().cloned());
        }
        if let Some(names) = &self.provisions {
            let required = names
                .iter()
                .map(|name| name.parse::<Provision>())
                .collect::<Result<ProvisionSet, _>>()
                .map_err(|error| AuthError::configuration(error.to_string()))?;
            builder = builder.provisions(required);
        }
        if let Some(algorithms) = &self.algorithms {
            builder = builder.algorithms(algorithms.iter().cloned());
        }
        for (role, names) in [
            (ConnectorRole::Clerk, &self.clerks),
            (ConnectorRole::Scanner, &self.scanners),
            (ConnectorRole::Supplicant, &self.supplicants),
        ] {
            if let Some(names) = names {
                builder = builder.connectors(role, names.iter().cloned());
            }
        }
        Ok(builder.build())
    }
}

/// A space registered under its location patterns.
#[derive(Debug, Clone)]
pub struct SpaceEntry {
    patterns: Vec<Pattern>,
    space: Arc<Space>,
}

impl SpaceEntry {
    /// The space key: its primary pattern.
    pub fn key(&self) -> &str {
        self.patterns
            .first()
            .map(Pattern::as_str)
            .unwrap_or_default()
    }

    /// Every pattern of the space.
    pub fn locs(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    /// The space.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// The binding recorded on a request governed by this space.
    pub fn binding(&self) -> SpaceBinding {
        SpaceBinding {
            key: self.key().to_string(),
            locs: self.locs().map(str::to_string).collect(),
        }
    }
}

/// Maps location patterns to spaces.
///
/// Patterns use glob syntax and govern hereditarily: a pattern that matches
/// a path also governs every path below it. When several patterns govern a
/// path, the one matching the deepest ancestor wins, and among those the
/// first registered.
#[derive(Debug, Clone, Default)]
pub struct SpaceMap {
    entries: Vec<SpaceEntry>,
}

impl SpaceMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `space` under `locs`.
    pub fn insert<I, S>(&mut self, locs: I, space: Space) -> Result<(), AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = locs
            .into_iter()
            .map(|loc| {
                let loc = loc.as_ref();
                Pattern::new(loc).map_err(|error| {
                    AuthError::configuration(format!("invalid space pattern '{loc}': {error}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(AuthError::configuration("a space needs at least one location"));
        }
        if let Some(pattern) = patterns
            .iter()
            .find(|pattern| self.patterns().any(|known| known == pattern.as_str()))
        {
            return Err(AuthError::configuration(format!(
                "space pattern '{}' is registered more than once",
                pattern.as_str()
            )));
        }
        self.entries.push(SpaceEntry {
            patterns,
            space: Arc::new(space),
        });
        Ok(())
    }

    /// Registers the space `config` describes.
    pub fn insert_config(&mut self, config: &SpaceConfig) -> Result<(), AuthError> {
        self.insert(&config.locs, config.to_space()?)
    }

    /// Every registered space.
    pub fn entries(&self) -> &[SpaceEntry] {
        &self.entries
    }

    fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().flat_map(SpaceEntry::locs)
    }

    /// The space governing `loc`.
    pub fn lookup(&self, loc: &str) -> Option<&SpaceEntry> {
        ancestors(loc).find_map(|path| {
            self.entries
                .iter()
                .find(|entry| entry.patterns.iter().any(|pattern| pattern.matches(path)))
        })
    }
}

/// `loc` and its ancestors, deepest first.
fn ancestors(loc: &str) -> impl Iterator<Item = &str> {
    let trimmed = match loc.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    std::iter::successors(Some(trimmed), |path| match path.rfind('/') {
        Some(0) if *path != "/" => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    })
}

#[cfg(test)]
mod tests {
    use super::ancestors;
    use crate::*;
    use portico_affordance::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_walks_ancestors_deepest_first() {
        assert_eq!(
            ancestors("/a/b/c/").collect::<Vec<_>>(),
            vec!["/a/b/c", "/a/b", "/a", "/"]
        );
        assert_eq!(ancestors("/").collect::<Vec<_>>(), vec!["/"]);
        assert_eq!(ancestors("relative").collect::<Vec<_>>(), vec!["relative"]);
    }

    #[test]
    fn it_lets_the_deepest_pattern_win() -> testresult::TestResult {
        let mut spaces = SpaceMap::new();
        spaces.insert(["/"], Space::builder().realm("public").build())?;
        spaces.insert(["/private", "/secret/*"], Space::builder().realm("private").build())?;

        let realm = |loc: &str| {
            spaces
                .lookup(loc)
                .map(|entry| entry.space().realms().clone())
        };
        assert_eq!(realm("/index.html"), Some(USet::single("public".to_string())));
        assert_eq!(realm("/private/a/b"), Some(USet::single("private".to_string())));
        assert_eq!(realm("/secret/x/y"), Some(USet::single("private".to_string())));
        assert_eq!(
            spaces.lookup("/private/a").map(|entry| entry.key().to_string()),
            Some("/private".to_string())
        );
        Ok(())
    }

    #[test]
    fn it_governs_nothing_without_a_match() -> testresult::TestResult {
        let mut spaces = SpaceMap::new();
        spaces.insert(["/api"], Space::default())?;
        assert!(spaces.lookup("/static/app.js").is_none());
        Ok(())
    }

    #[test]
    fn it_rejects_bad_patterns() {
        let mut spaces = SpaceMap::new();
        assert!(matches!(
            spaces.insert(["/a/[b"], Space::default()),
            Err(AuthError::Configuration { .. })
        ));
        assert!(spaces.insert(Vec::<String>::new(), Space::default()).is_err());
    }

    #[test]
    fn it_requires_client_auth_by_default() {
        let space = Space::default();
        assert!(space.provisionsets().contains(&ProvisionSet::from(SECPROV_CLIENT_AUTH)));
        assert!(!space.provisionsets().contains(&ProvisionSet::empty()));
    }

    #[test]
    fn it_builds_spaces_from_config() -> testresult::TestResult {
        let config: SpaceConfig = serde_json::from_str(
            r#"{
                "locs": ["/admin"],
                "realms": ["example.net"],
                "provisions": ["client_never_sends_secret"],
                "algorithms": ["digest"],
                "clerks": ["digest"]
            }"#,
        )?;
        let mut spaces = SpaceMap::new();
        spaces.insert_config(&config)?;

        let entry = spaces.lookup("/admin/users").ok_or("admin space")?;
        let space = entry.space();
        assert_eq!(space.algorithms(), &USet::single("digest".to_string()));
        assert_eq!(space.connectors(ConnectorRole::Clerk), &USet::single("digest".to_string()));
        assert!(space.connectors(ConnectorRole::Scanner).is_universal());
        assert!(
            space
                .provisionsets()
                .all_gte(&ProvisionSet::from(SECPROV_CLIENT_NEVER_SENDS_SECRET))
        );
        assert_eq!(entry.binding().locs, vec!["/admin".to_string()]);
        Ok(())
    }

    #[test]
    fn it_reports_unknown_provisions() -> testresult::TestResult {
        let config: SpaceConfig =
            serde_json::from_str(r#"{"locs": ["/"], "provisions": ["telepathy"]}"#)?;
        assert!(matches!(
            config.to_space(),
            Err(AuthError::Configuration { .. })
        ));
        Ok(())
    }
}
