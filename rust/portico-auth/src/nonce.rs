//! Server nonces for challenge-response mechanisms.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use portico_affordance::{
    ProvisionSet, SECPROV_SERVER_NONCE_PER_REQUEST, SECPROV_SERVER_NONCE_PER_RESOURCE, USet,
};
use rand::RngCore;

/// A nonce as issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceEntry {
    /// The nonce itself.
    pub value: String,
    /// The location it was issued for.
    pub loc: String,
    /// The entity tag of the resource it was issued for.
    pub etag: String,
    /// When it was issued.
    pub timestamp: SystemTime,
    /// How many times it was accepted.
    pub use_count: u64,
    /// The highest nonce count the client presented with it.
    pub last_count: Option<u64>,
}

/// How a presented nonce compares with what was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonceStatus {
    /// Good to use.
    Fresh,
    /// Unknown, expired or bound elsewhere; the client should retry with a
    /// new one.
    Stale,
    /// The nonce count did not increase.
    Replay,
}

/// Which restrictions on nonce reuse are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NoncePolicy {
    /// Nonces are bound to the location they were issued for.
    pub per_resource: bool,
    /// Nonces are good for one accepted request.
    pub per_request: bool,
}

impl NoncePolicy {
    /// Enforces whatever every acceptable provision set guarantees.
    pub fn required_by(provisionsets: &USet<ProvisionSet>) -> Self {
        Self {
            per_resource: provisionsets.all_gte(&SECPROV_SERVER_NONCE_PER_RESOURCE.into()),
            per_request: provisionsets.all_gte(&SECPROV_SERVER_NONCE_PER_REQUEST.into()),
        }
    }
}

#[derive(Debug)]
struct NonceState {
    entries: HashMap<String, NonceEntry>,
    serial: u64,
    private_key: String,
    private_key_created: SystemTime,
}

/// Issues nonces and tracks their use.
///
/// A nonce is `base64(timestamp ":" md5(timestamp ":" etag ":" private_key
/// ":" serial))`. The private key is random and replaced once it outlives
/// its lifespan; entries are dropped once they outlive theirs.
#[derive(Debug)]
pub struct NonceTable {
    state: Mutex<NonceState>,
    lifespan: Duration,
    private_key_lifespan: Duration,
}

fn private_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

fn age(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or_default()
}

impl NonceTable {
    /// A table whose nonces live for `lifespan`.
    pub fn new(lifespan: Duration, private_key_lifespan: Duration) -> Self {
        Self {
            state: Mutex::new(NonceState {
                entries: HashMap::new(),
                serial: 0,
                private_key: private_key(),
                private_key_created: SystemTime::now(),
            }),
            lifespan,
            private_key_lifespan,
        }
    }

    /// Issues a nonce for `loc`.
    pub fn issue(&self, loc: &str, etag: &str, now: SystemTime) -> String {
        let mut state = self.state.lock();
        if age(state.private_key_created, now) > self.private_key_lifespan {
            state.private_key = private_key();
            state.private_key_created = now;
        }
        state
            .entries
            .retain(|_, entry| age(entry.timestamp, now) <= self.lifespan);

        state.serial += 1;
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let timestamp = format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos());
        let hash = md5::compute(format!(
            "{timestamp}:{etag}:{}:{}",
            state.private_key, state.serial
        ));
        let value = STANDARD.encode(format!("{timestamp}:{hash:x}"));
        state.entries.insert(
            value.clone(),
            NonceEntry {
                value: value.clone(),
                loc: loc.to_string(),
                etag: etag.to_string(),
                timestamp: now,
                use_count: 0,
                last_count: None,
            },
        );
        value
    }

    /// Judges a nonce presented for `loc` with nonce count `count`.
    pub fn check(
        &self,
        nonce: &str,
        loc: &str,
        etag: &str,
        now: SystemTime,
        policy: NoncePolicy,
        count: Option<u64>,
    ) -> NonceStatus {
        let state = self.state.lock();
        let Some(entry) = state.entries.get(nonce) else {
            return NonceStatus::Stale;
        };
        if let (Some(count), Some(last)) = (count, entry.last_count) {
            if count <= last {
                return NonceStatus::Replay;
            }
        }
        let stale = age(entry.timestamp, now) > self.lifespan
            || entry.etag != etag
            || (policy.per_resource && entry.loc != loc)
            || (policy.per_request && entry.use_count > 0);
        if stale {
            NonceStatus::Stale
        } else {
            NonceStatus::Fresh
        }
    }

    /// Records an accepted use.
    pub fn record_use(&self, nonce: &str, count: Option<u64>) {
        if let Some(entry) = self.state.lock().entries.get_mut(nonce) {
            entry.use_count += 1;
            if count.is_some() {
                entry.last_count = count;
            }
        }
    }

    /// Forgets a nonce.
    pub fn invalidate(&self, nonce: &str) {
        self.state.lock().entries.remove(nonce);
    }

    /// The entry of a live nonce.
    pub fn get(&self, nonce: &str) -> Option<NonceEntry> {
        self.state.lock().entries.get(nonce).cloned()
    }

    /// The number of live nonces.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no nonce is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
