//! The negotiation entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use portico_affordance::{
    AffordanceSet, ProcessAffordanceSet, TokenMap, TokenNames, USet,
};
use serde::{Deserialize, Serialize};

use crate::{
    Algorithm, AuthError, Clerk, ConnectorRole, Exchange, InputSource, OutputTarget, Participant,
    ProspectiveAffordanceSet, RequestAuthInfo, Resolution, Resolver, Scanner, ScoringPolicy,
    Space, SpaceConfig, SpaceEntry, SpaceMap, Supplicant, TokenHandler, Unauthenticated,
};

/// Tunables of an [`Authenticator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatorConfig {
    /// How feasible processes are ranked.
    pub scoring: ScoringPolicy,
}

/// Every registered algorithm and connector, in registration order.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) algorithms: Vec<Arc<dyn Algorithm>>,
    pub(crate) clerks: Vec<Arc<dyn Clerk>>,
    clerk_participants: Vec<Arc<dyn Participant>>,
    scanners: Vec<Arc<dyn Participant>>,
    supplicants: Vec<Arc<dyn Participant>>,
}

impl Registry {
    pub(crate) fn participants(&self, role: ConnectorRole) -> &[Arc<dyn Participant>] {
        match role {
            ConnectorRole::Clerk => &self.clerk_participants,
            ConnectorRole::Scanner => &self.scanners,
            ConnectorRole::Supplicant => &self.supplicants,
        }
    }

    fn participant(&self, role: ConnectorRole, index: usize) -> Result<&dyn Participant, AuthError> {
        self.participants(role)
            .get(index)
            .map(|participant| participant.as_ref())
            .ok_or_else(|| AuthError::internal(format!("no {role} at index {index}")))
    }

    fn validate(&self) -> Result<(), AuthError> {
        let mut names = std::collections::BTreeSet::new();
        for algorithm in &self.algorithms {
            let algorithm: &dyn Algorithm = algorithm.as_ref();
            algorithm.validate()?;
            if !names.insert(algorithm.name()) {
                return Err(AuthError::configuration(format!(
                    "algorithm '{}' is registered more than once",
                    algorithm.name()
                )));
            }
        }
        for role in ConnectorRole::ALL {
            let (source, target) = match role {
                ConnectorRole::Clerk => (InputSource::Algorithm, OutputTarget::Scanner),
                ConnectorRole::Scanner => (InputSource::Clerk, OutputTarget::Algorithm),
                ConnectorRole::Supplicant => (InputSource::Algorithm, OutputTarget::Algorithm),
            };
            let mut names = std::collections::BTreeSet::new();
            for connector in self.participants(role) {
                if !names.insert(connector.name()) {
                    return Err(AuthError::configuration(format!(
                        "{role} '{}' is registered more than once",
                        connector.name()
                    )));
                }
                if connector.input_source() != source || connector.output_target() != target {
                    return Err(AuthError::configuration(format!(
                        "{role} '{}' must take tokens from {source} and feed {target}",
                        connector.name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn knows(&self, role: Option<ConnectorRole>, name: &str) -> bool {
        match role {
            None => self.algorithms.iter().any(|algorithm| algorithm.name() == name),
            Some(role) => self
                .participants(role)
                .iter()
                .any(|connector| connector.name() == name),
        }
    }
}

/// Builds an [`Authenticator`].
///
/// ```
/// use portico_auth::*;
///
/// let authenticator = Authenticator::builder()
///     .algorithm(FixedAlgorithm::plain())
///     .space(["/"], Space::builder().realm("example.net").build())
///     .build()
///     .unwrap();
/// assert_eq!(authenticator.spaces().entries().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct AuthenticatorBuilder {
    config: AuthenticatorConfig,
    registry: Registry,
    spaces: Vec<(Vec<String>, Space)>,
}

impl AuthenticatorBuilder {
    /// Replaces the configuration.
    pub fn config(mut self, config: AuthenticatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an algorithm.
    pub fn algorithm<A: Algorithm + 'static>(mut self, algorithm: A) -> Self {
        self.registry.algorithms.push(Arc::new(algorithm));
        self
    }

    /// Registers a clerk.
    pub fn clerk<C: Clerk + 'static>(mut self, clerk: C) -> Self {
        let clerk = Arc::new(clerk);
        self.registry.clerk_participants.push(clerk.clone());
        self.registry.clerks.push(clerk);
        self
    }

    /// Registers a scanner.
    pub fn scanner<S: Scanner + 'static>(mut self, scanner: S) -> Self {
        self.registry.scanners.push(Arc::new(scanner));
        self
    }

    /// Registers a supplicant.
    pub fn supplicant<S: Supplicant + 'static>(mut self, supplicant: S) -> Self {
        self.registry.supplicants.push(Arc::new(supplicant));
        self
    }

    /// Maps `locs` to `space`.
    pub fn space<I, S>(mut self, locs: I, space: Space) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spaces
            .push((locs.into_iter().map(Into::into).collect(), space));
        self
    }

    /// Maps the locations of `config` to the space it describes.
    pub fn space_config(self, config: &SpaceConfig) -> Result<Self, AuthError> {
        let space = config.to_space()?;
        Ok(self.space(config.locs.iter().cloned(), space))
    }

    /// Checks the registrations and finishes the authenticator.
    pub fn build(self) -> Result<Authenticator, AuthError> {
        self.registry.validate()?;
        let mut spaces = SpaceMap::new();
        for (locs, space) in self.spaces {
            let references = std::iter::once((None, space.algorithms()))
                .chain(ConnectorRole::ALL.map(|role| (Some(role), space.connectors(role))));
            for (role, names) in references {
                let Some(names) = names.as_finite() else {
                    continue;
                };
                if let Some(unknown) = names.iter().find(|name| !self.registry.knows(role, name)) {
                    let kind = role.map_or("algorithm".to_string(), |role| role.to_string());
                    return Err(AuthError::configuration(format!(
                        "space {locs:?} references unknown {kind} '{unknown}'"
                    )));
                }
            }
            spaces.insert(&locs, space)?;
        }
        Ok(Authenticator {
            config: self.config,
            registry: self.registry,
            spaces,
        })
    }
}

/// Negotiates and runs authentication processes.
///
/// An authenticator is immutable once built and may be shared by every
/// request; all request state lives in the [`Exchange`].
#[derive(Debug)]
pub struct Authenticator {
    config: AuthenticatorConfig,
    registry: Registry,
    spaces: SpaceMap,
}

impl Authenticator {
    /// Starts a builder.
    pub fn builder() -> AuthenticatorBuilder {
        AuthenticatorBuilder::default()
    }

    /// The configuration.
    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    /// The spaces.
    pub fn spaces(&self) -> &SpaceMap {
        &self.spaces
    }

    fn general(space: Option<&SpaceEntry>, required: &AffordanceSet) -> AffordanceSet {
        match space {
            Some(entry) => entry.space().affordances(required),
            None => required.clone(),
        }
    }

    /// Whether the request is already authenticated well enough for `loc`.
    ///
    /// This never fails and never changes the exchange. It holds when the
    /// current auth info is accepted, was negotiated for the space governing
    /// `loc`, and its realm, algorithm and provisions satisfy both the
    /// space and `required`.
    pub fn has_auth(&self, loc: &str, required: &AffordanceSet, exchange: &Exchange<'_>) -> bool {
        let Some(info) = exchange.auth_info() else {
            return false;
        };
        if !info.is_accepted() {
            return false;
        }
        let space = self.spaces.lookup(loc);
        if info.space.as_deref() != space.map(SpaceEntry::key) {
            return false;
        }
        let general = Self::general(space, required);
        let admits = |set: &USet<String>, value: &Option<String>| match value {
            Some(value) => set.contains(value.as_str()),
            None => set.is_universal(),
        };
        admits(&general.realms, &info.realm)
            && admits(&general.algorithms, &info.algorithm)
            && general
                .provisionsets
                .any_lte(&info.provisions.unwrap_or_default())
    }

    /// Makes sure the request is authenticated for `loc`.
    ///
    /// When [`has_auth`](Self::has_auth) does not already hold, this
    /// negotiates the best process the space, the caller and the registered
    /// participants all accept, and runs it. On success the exchange holds
    /// accepted auth info. Otherwise the returned error tells the HTTP layer
    /// what to send back; challenges and cookies are already recorded on the
    /// exchange.
    pub fn ensure_auth(
        &self,
        loc: &str,
        required: &AffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<(), AuthError> {
        if self.has_auth(loc, required, exchange) {
            tracing::debug!(loc, "request already authenticated");
            return Ok(());
        }
        let space = self.spaces.lookup(loc);
        exchange.set_space(space.map(SpaceEntry::binding));
        tracing::debug!(loc, space = space.map(SpaceEntry::key), "negotiating authentication");

        let general = Self::general(space, required);
        general.require_nonempty().inspect_err(|error| {
            tracing::warn!(loc, %error, "authentication cannot be satisfied");
        })?;
        let upstream = ProcessAffordanceSet::from_general(general);

        let candidates = self.candidates(space, &upstream)?;
        let scanned = self.scan(&candidates, exchange)?;
        let names: BTreeMap<usize, TokenNames> = scanned
            .iter()
            .map(|(index, info)| (*index, info.tokens.names()))
            .collect();
        let resolution = Resolver {
            registry: &self.registry,
            candidates: &candidates,
            scanned: &names,
            scoring: self.config.scoring,
        }
        .resolve()
        .ok_or_else(|| {
            tracing::warn!(loc, "no authentication process meets the affordances");
            AuthError::Unresolvable
        })?;

        let algorithm = self
            .registry
            .algorithms
            .get(resolution.algorithm)
            .ok_or_else(|| AuthError::internal("resolved an unknown algorithm"))?;
        resolution.general.require_finite(&[])?;
        let realm = resolution
            .general
            .realms
            .first()?
            .cloned()
            .ok_or_else(|| AuthError::internal("resolved no realm"))?;
        let general = resolution
            .general
            .clone()
            .with_realms(USet::single(realm.clone()));

        let clerk = resolution.entry_connector(ConnectorRole::Clerk);
        let scanner = resolution.entry_connector(ConnectorRole::Scanner);
        let mut info = match scanner {
            Some(index) if resolution.entry > 0 => scanned.get(&index).cloned().unwrap_or_default(),
            _ => RequestAuthInfo::default(),
        };
        info.space = space.map(|entry| entry.key().to_string());
        info.realm = Some(realm.clone());
        info.algorithm = Some(algorithm.name().to_string());
        info.clerk = clerk.and_then(|index| {
            self.registry
                .participants(ConnectorRole::Clerk)
                .get(index)
                .map(|clerk| clerk.name().to_string())
        });
        info.scanner = scanner.and_then(|index| {
            self.registry
                .participants(ConnectorRole::Scanner)
                .get(index)
                .map(|scanner| scanner.name().to_string())
        });
        tracing::debug!(
            algorithm = algorithm.name(),
            entry = resolution.entry,
            realm = %realm,
            clerk = info.clerk.as_deref(),
            scanner = info.scanner.as_deref(),
            score = ?resolution.score,
            "selected authentication process"
        );

        let affordances = ProcessAffordanceSet::from_general(general.clone());
        let info = match self.process(&resolution, &general, info.clone(), exchange) {
            Ok(info) => info,
            Err(AuthError::Unauthenticated(mut unauthenticated)) => {
                exchange.set_auth_info(info);
                if unauthenticated.realm.is_none() {
                    unauthenticated.realm = Some(realm);
                }
                if unauthenticated.affordances.is_none() {
                    unauthenticated.affordances = Some(affordances);
                }
                tracing::debug!(kind = ?unauthenticated.kind, "request not authenticated");
                return Err(AuthError::Unauthenticated(unauthenticated));
            }
            Err(error) => {
                tracing::warn!(%error, "authentication process failed");
                return Err(error);
            }
        };

        exchange.set_auth_info(info.clone());
        tracing::debug!(%info, "authentication process finished");
        if !info.verified() {
            return Err(AuthError::internal(format!(
                "algorithm '{}' finished without a verdict",
                algorithm.name()
            )));
        }
        if let Some(index) = clerk {
            let clerk = self
                .registry
                .clerks
                .get(index)
                .ok_or_else(|| AuthError::internal(format!("no clerk at index {index}")))?;
            clerk.confirm_auth_info(&info, &affordances, exchange)?;
        }
        if info.is_accepted() {
            Ok(())
        } else {
            Err(Unauthenticated::tokens_not_accepted()
                .with_realm(realm)
                .with_affordances(affordances)
                .into())
        }
    }

    /// The algorithms and connectors that can take part at all.
    fn candidates(
        &self,
        space: Option<&SpaceEntry>,
        upstream: &ProcessAffordanceSet,
    ) -> Result<ProspectiveAffordanceSet, AuthError> {
        let algorithms: USet<String> = self
            .registry
            .algorithms
            .iter()
            .filter(|algorithm| algorithm.supports_affordances(upstream))
            .map(|algorithm| algorithm.name().to_string())
            .collect();
        if algorithms.is_empty() {
            tracing::warn!(%upstream, "no algorithm meets the affordances");
            return Err(AuthError::Unresolvable);
        }
        let mut process = upstream.clone();
        process.algorithms = algorithms;

        let mut candidates = ProspectiveAffordanceSet::from_process(process);
        let downstream = ProcessAffordanceSet::unconstrained();
        for role in ConnectorRole::ALL {
            let scope = space.map(|entry| entry.space().connectors(role));
            let supported: USet<usize> = self
                .registry
                .participants(role)
                .iter()
                .enumerate()
                .filter(|(_, connector)| {
                    scope.is_none_or(|scope| scope.contains(connector.name()))
                        && connector.supports_affordances(upstream, downstream)
                })
                .map(|(index, _)| index)
                .collect();
            if supported.is_empty() {
                tracing::warn!(%role, %upstream, "no connector meets the affordances");
                return Err(AuthError::NoConnector { role });
            }
            candidates = candidates.with_connectors(role, supported);
        }
        Ok(candidates)
    }

    /// Consults every candidate scanner.
    fn scan(
        &self,
        candidates: &ProspectiveAffordanceSet,
        exchange: &mut Exchange<'_>,
    ) -> Result<BTreeMap<usize, RequestAuthInfo>, AuthError> {
        let mut scanned = BTreeMap::new();
        let Some(scanners) = candidates.connectors(ConnectorRole::Scanner).as_finite() else {
            return Ok(scanned);
        };
        for &index in scanners {
            let scanner = self.registry.participant(ConnectorRole::Scanner, index)?;
            match scanner.process_tokens(&TokenMap::new(), candidates.process(), exchange) {
                Ok(info) => {
                    tracing::debug!(scanner = scanner.name(), tokens = %info.tokens.names(), "scanned tokens");
                    scanned.insert(index, info);
                }
                Err(AuthError::NoValidTokensScanned) => {
                    tracing::debug!(scanner = scanner.name(), "no valid tokens scanned");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(scanned)
    }

    /// Runs the resolved process from its entry phase.
    fn process(
        &self,
        resolution: &Resolution,
        general: &AffordanceSet,
        mut info: RequestAuthInfo,
        exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let algorithm: &dyn Algorithm = self
            .registry
            .algorithms
            .get(resolution.algorithm)
            .map(|algorithm| algorithm.as_ref())
            .ok_or_else(|| AuthError::internal("resolved an unknown algorithm"))?;
        let slot = |phase: usize, role: ConnectorRole| {
            resolution
                .connector(phase, role)
                .ok_or_else(|| AuthError::internal(format!("no {role} resolved after phase {phase}")))
                .and_then(|index| self.registry.participant(role, index))
        };

        let mut index = resolution.entry;
        loop {
            let phase = algorithm
                .phase(index)
                .ok_or_else(|| AuthError::internal(format!("no phase {index}")))?;
            let next_phase = phase.next_phase();
            let following = |general: &AffordanceSet| match &next_phase {
                Some(next) => downstream_inputs(next, general),
                None => USet::Universal,
            };
            match phase.output_target() {
                OutputTarget::End => return step(&phase, general, USet::Universal, info, exchange),
                OutputTarget::Algorithm => {
                    info = step(&phase, general, following(general), info, exchange)?;
                }
                OutputTarget::Clerk => {
                    let clerk = slot(index, ConnectorRole::Clerk)?;
                    info = step(&phase, general, downstream_inputs(clerk, general), info, exchange)?;
                    return step(clerk, general, USet::Universal, info, exchange);
                }
                OutputTarget::Supplicant | OutputTarget::Scanner => {
                    let role = match phase.output_target() {
                        OutputTarget::Scanner => ConnectorRole::Scanner,
                        _ => ConnectorRole::Supplicant,
                    };
                    let connector = slot(index, role)?;
                    info = step(&phase, general, downstream_inputs(connector, general), info, exchange)?;
                    info = step(connector, general, following(general), info, exchange)?;
                    if role == ConnectorRole::Supplicant {
                        info.supplicant = Some(connector.name().to_string());
                    }
                }
            }
            index += 1;
        }
    }
}

fn downstream_inputs<P: Participant + ?Sized>(
    participant: &P,
    general: &AffordanceSet,
) -> USet<TokenNames> {
    let context = ProcessAffordanceSet::from_general(general.clone());
    participant.declared_inputs(&context, &context)
}

/// Runs one participant on the tokens gathered so far.
fn step<P: Participant + ?Sized>(
    participant: &P,
    general: &AffordanceSet,
    downstream: USet<TokenNames>,
    prior: RequestAuthInfo,
    exchange: &mut Exchange<'_>,
) -> Result<RequestAuthInfo, AuthError> {
    let affordances = ProcessAffordanceSet::new(
        general.clone(),
        USet::single(prior.tokens.names()),
        downstream,
    );
    tracing::debug!(participant = participant.name(), tokens = %prior.tokens.names(), "processing tokens");
    let mut info = participant.process_tokens(&prior.tokens, &affordances, exchange)?;
    info.inherit(&prior);
    Ok(info)
}
