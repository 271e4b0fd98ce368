//! Session storage and the supplicants that use it.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use portico_affordance::{ACCEPTED_TOKEN, ProcessAffordanceSet, TokenMap, TokenNames, USet};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    AlgorithmHandler, AuthError, BackendError, Exchange, InputSource, OutputTarget, Participant,
    ProvisionSetHandler, RealmHandler, RequestAuthInfo, SESSION_ID_TOKEN, Supplicant,
    TokenHandler,
};

/// What a session store remembers about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// The authenticated user.
    pub user: String,
    /// When the session was created.
    pub created: SystemTime,
}

/// Persists sessions by id.
pub trait SessionStore: Debug + Send + Sync {
    /// The backend name, used in errors.
    fn name(&self) -> &str;

    /// Creates a session for `user`, returning its id.
    fn create(&self, user: &str) -> Result<String, BackendError>;

    /// The live session called `session_id`.
    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, BackendError>;

    /// Forgets a session.
    fn remove(&self, session_id: &str) -> Result<(), BackendError>;
}

/// Keeps sessions in process memory.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
    lifespan: Duration,
}

impl InMemorySessionStore {
    /// A store whose sessions expire after `lifespan`.
    pub fn new(lifespan: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            lifespan,
        }
    }

    /// The number of sessions held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is held.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn expired(&self, record: &SessionRecord) -> bool {
        record
            .created
            .elapsed()
            .is_ok_and(|age| age > self.lifespan)
    }
}

impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, user: &str) -> Result<String, BackendError> {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        let session_id = URL_SAFE_NO_PAD.encode(bytes);
        self.sessions.retain(|_, record| !self.expired(record));
        self.sessions.insert(
            session_id.clone(),
            SessionRecord {
                user: user.to_string(),
                created: SystemTime::now(),
            },
        );
        Ok(session_id)
    }

    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, BackendError> {
        let record = self
            .sessions
            .get(session_id)
            .map(|record| record.value().clone());
        match record {
            Some(record) if self.expired(&record) => {
                self.sessions.remove(session_id);
                Ok(None)
            }
            record => Ok(record),
        }
    }

    fn remove(&self, session_id: &str) -> Result<(), BackendError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

/// Bounds on blocking backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// How long a call may take.
    pub timeout: Duration,
    /// How many calls may run at once, counting calls that timed out but
    /// have not returned yet.
    pub max_in_flight: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(6),
            max_in_flight: 16,
        }
    }
}

/// A call holding one of the backend's in-flight slots until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn acquire(count: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .ok()
            .map(|_| Self(count.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs every call of an inner store on a helper thread and gives up after
/// the configured timeout.
///
/// A timed out call keeps its thread until the inner store returns. At most
/// [`BackendSettings::max_in_flight`] such threads exist per store; further
/// calls fail with [`BackendError::Overloaded`] until one finishes.
#[derive(Debug, Clone)]
pub struct TimeoutSessionStore {
    inner: Arc<dyn SessionStore>,
    settings: BackendSettings,
    in_flight: Arc<AtomicUsize>,
}

impl TimeoutSessionStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn SessionStore>, settings: BackendSettings) -> Self {
        Self {
            inner,
            settings,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The calls currently running on helper threads.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn call<T, F>(&self, operation: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SessionStore) -> Result<T, BackendError> + Send + 'static,
    {
        let Some(slot) = InFlight::acquire(&self.in_flight, self.settings.max_in_flight) else {
            tracing::warn!(backend = self.inner.name(), limit = self.settings.max_in_flight, "backend overloaded");
            return Err(BackendError::Overloaded {
                backend: self.inner.name().to_string(),
                limit: self.settings.max_in_flight,
            });
        };
        let (sender, receiver) = mpsc::channel();
        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name(format!("{}-backend", self.inner.name()))
            .spawn(move || {
                let _slot = slot;
                let _ = sender.send(operation(inner.as_ref()));
            })
            .map_err(|error| BackendError::Failure {
                backend: self.inner.name().to_string(),
                message: error.to_string(),
            })?;
        match receiver.recv_timeout(self.settings.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(backend = self.inner.name(), timeout = ?self.settings.timeout, "backend call timed out");
                Err(BackendError::Timeout {
                    backend: self.inner.name().to_string(),
                    timeout: self.settings.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(BackendError::Failure {
                backend: self.inner.name().to_string(),
                message: "backend call aborted".into(),
            }),
        }
    }
}

impl SessionStore for TimeoutSessionStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn create(&self, user: &str) -> Result<String, BackendError> {
        let user = user.to_string();
        self.call(move |store| store.create(&user))
    }

    fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, BackendError> {
        let session_id = session_id.to_string();
        self.call(move |store| store.get(&session_id))
    }

    fn remove(&self, session_id: &str) -> Result<(), BackendError> {
        let session_id = session_id.to_string();
        self.call(move |store| store.remove(&session_id))
    }
}

fn backend_failed(error: &BackendError) {
    tracing::warn!(%error, "session backend failed");
}

macro_rules! session_supplicant {
    ($type:ty) => {
        impl RealmHandler for $type {}

        impl ProvisionSetHandler for $type {}

        impl AlgorithmHandler for $type {}

        impl Participant for $type {
            fn name(&self) -> &str {
                &self.name
            }
        }

        impl Supplicant for $type {}
    };
}

/// Stores a session for every accepted login.
#[derive(Debug, Clone)]
pub struct SessionStorageSupplicant {
    name: String,
    store: Arc<dyn SessionStore>,
}

impl SessionStorageSupplicant {
    /// A supplicant writing to `store`.
    pub fn new(name: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

session_supplicant!(SessionStorageSupplicant);

impl TokenHandler for SessionStorageSupplicant {
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
        USet::single(TokenNames::from(["user", ACCEPTED_TOKEN]))
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(TokenNames::from(["user", ACCEPTED_TOKEN, SESSION_ID_TOKEN]))
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
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let user = input.require("user")?;
        let mut tokens = input.clone();
        if input.get(ACCEPTED_TOKEN) == Some("True") {
            let session_id = self.store.create(user).inspect_err(backend_failed)?;
            tracing::debug!(supplicant = %self.name, user, "stored session");
            tokens.insert(SESSION_ID_TOKEN, session_id);
        }
        Ok(RequestAuthInfo::new(tokens))
    }
}

/// Recalls the user of a stored session.
#[derive(Debug, Clone)]
pub struct SessionRecallSupplicant {
    name: String,
    store: Arc<dyn SessionStore>,
}

impl SessionRecallSupplicant {
    /// A supplicant reading from `store`.
    pub fn new(name: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

session_supplicant!(SessionRecallSupplicant);

impl TokenHandler for SessionRecallSupplicant {
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
        USet::single(TokenNames::from([SESSION_ID_TOKEN]))
    }

    fn declared_outputs(
        &self,
        _upstream: &ProcessAffordanceSet,
        _downstream: &ProcessAffordanceSet,
    ) -> USet<TokenNames> {
        USet::single(TokenNames::from(["user", ACCEPTED_TOKEN]))
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
        _affordances: &ProcessAffordanceSet,
        _exchange: &mut Exchange<'_>,
    ) -> Result<RequestAuthInfo, AuthError> {
        let session_id = input.require(SESSION_ID_TOKEN)?;
        let mut tokens = input.clone();
        let record = self.store.get(session_id).inspect_err(backend_failed)?;
        tracing::debug!(supplicant = %self.name, known = record.is_some(), "recalled session");
        match record {
            Some(record) => {
                tokens.insert("user", record.user);
                Ok(RequestAuthInfo::new(tokens).with_accepted(true))
            }
            None => Ok(RequestAuthInfo::new(tokens).with_accepted(false)),
        }
    }
}
