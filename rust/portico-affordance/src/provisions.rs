//! Security provisions: the guarantees an authentication mechanism offers.

use std::fmt::{Debug, Display, Formatter};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};
use std::str::FromStr;
use std::sync::LazyLock;

use itertools::Itertools;

use crate::{FlagRegistry, FlagRegistryError, FlagSpec, Lattice, USet};

/// A single security provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Provision {
    /// The client is authenticated to the server.
    ClientAuth = 0,
    /// The server is authenticated to the client.
    ServerAuth,
    /// The client's secret crosses the wire only in encrypted form.
    ClientEncryptedSecret,
    /// The client's secret never crosses the wire.
    ClientNeverSendsSecret,
    /// The server issues nonces.
    ServerNonce,
    /// Server nonces are bound to one resource.
    ServerNoncePerResource,
    /// Server nonces are good for one request.
    ServerNoncePerRequest,
    /// The client counts its uses of each server nonce.
    ServerNonceUseCount,
    /// The client contributes its own nonce.
    ClientNonce,
    /// The request body is integrity protected.
    RequestEntityIntegrity,
}

/// The client is authenticated to the server.
pub const SECPROV_CLIENT_AUTH: Provision = Provision::ClientAuth;
/// The server is authenticated to the client.
pub const SECPROV_SERVER_AUTH: Provision = Provision::ServerAuth;
/// The client's secret crosses the wire only in encrypted form.
pub const SECPROV_CLIENT_ENCRYPTED_SECRET: Provision = Provision::ClientEncryptedSecret;
/// The client's secret never crosses the wire.
pub const SECPROV_CLIENT_NEVER_SENDS_SECRET: Provision = Provision::ClientNeverSendsSecret;
/// The server issues nonces.
pub const SECPROV_SERVER_NONCE: Provision = Provision::ServerNonce;
/// Server nonces are bound to one resource.
pub const SECPROV_SERVER_NONCE_PER_RESOURCE: Provision = Provision::ServerNoncePerResource;
/// Server nonces are good for one request.
pub const SECPROV_SERVER_NONCE_PER_REQUEST: Provision = Provision::ServerNoncePerRequest;
/// The client counts its uses of each server nonce.
pub const SECPROV_SERVER_NONCE_USE_COUNT: Provision = Provision::ServerNonceUseCount;
/// The client contributes its own nonce.
pub const SECPROV_CLIENT_NONCE: Provision = Provision::ClientNonce;
/// The request body is integrity protected.
pub const SECPROV_REQUEST_ENTITY_INTEGRITY: Provision = Provision::RequestEntityIntegrity;

const PROVISION_FLAGS: [FlagSpec; 10] = [
    FlagSpec {
        name: "SECPROV_CLIENT_AUTH",
        displayname: "client authentication",
        implies: &[],
    },
    FlagSpec {
        name: "SECPROV_SERVER_AUTH",
        displayname: "server authentication",
        implies: &[],
    },
    FlagSpec {
        name: "SECPROV_CLIENT_ENCRYPTED_SECRET",
        displayname: "client sends encrypted secret",
        implies: &[],
    },
    FlagSpec {
        name: "SECPROV_CLIENT_NEVER_SENDS_SECRET",
        displayname: "client never sends secret",
        implies: &["SECPROV_CLIENT_ENCRYPTED_SECRET"],
    },
    FlagSpec {
        name: "SECPROV_SERVER_NONCE",
        displayname: "server-side nonce",
        implies: &[],
    },
    FlagSpec {
        name: "SECPROV_SERVER_NONCE_PER_RESOURCE",
        displayname: "server-side nonce per resource",
        implies: &["SECPROV_SERVER_NONCE"],
    },
    FlagSpec {
        name: "SECPROV_SERVER_NONCE_PER_REQUEST",
        displayname: "server-side nonce per request",
        implies: &["SECPROV_SERVER_NONCE", "SECPROV_SERVER_NONCE_PER_RESOURCE"],
    },
    FlagSpec {
        name: "SECPROV_SERVER_NONCE_USE_COUNT",
        displayname: "server-side nonce use count",
        implies: &["SECPROV_SERVER_NONCE"],
    },
    FlagSpec {
        name: "SECPROV_CLIENT_NONCE",
        displayname: "client-side nonce",
        implies: &[],
    },
    FlagSpec {
        name: "SECPROV_REQUEST_ENTITY_INTEGRITY",
        displayname: "request entity integrity",
        implies: &[],
    },
];

const ALL_PROVISIONS: [Provision; 10] = [
    Provision::ClientAuth,
    Provision::ServerAuth,
    Provision::ClientEncryptedSecret,
    Provision::ClientNeverSendsSecret,
    Provision::ServerNonce,
    Provision::ServerNoncePerResource,
    Provision::ServerNoncePerRequest,
    Provision::ServerNonceUseCount,
    Provision::ClientNonce,
    Provision::RequestEntityIntegrity,
];

static PROVISIONS: LazyLock<FlagRegistry> = LazyLock::new(|| {
    FlagRegistry::new(&PROVISION_FLAGS).expect("standard provision flags are valid")
});

static PROVISION_SETS: LazyLock<Vec<ProvisionSet>> = LazyLock::new(|| {
    PROVISIONS
        .closed_sets()
        .into_iter()
        .map(ProvisionSet)
        .collect()
});

impl Provision {
    /// Every provision in registration order.
    pub fn all() -> &'static [Provision] {
        &ALL_PROVISIONS
    }

    /// The registered flag name, e.g. `SECPROV_CLIENT_AUTH`.
    pub fn name(self) -> &'static str {
        PROVISION_FLAGS[self as usize].name
    }

    /// A human readable description.
    pub fn displayname(self) -> &'static str {
        PROVISION_FLAGS[self as usize].displayname
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl Display for Provision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.displayname())
    }
}

impl FromStr for Provision {
    type Err = FlagRegistryError;

    /// Accepts the flag name with or without its `SECPROV_` prefix, in any
    /// case.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let upper = name.to_ascii_uppercase();
        let qualified = if upper.starts_with("SECPROV_") {
            upper
        } else {
            format!("SECPROV_{upper}")
        };
        ALL_PROVISIONS
            .iter()
            .copied()
            .find(|provision| provision.name() == qualified)
            .ok_or(FlagRegistryError::UnknownFlag {
                name: name.to_string(),
            })
    }
}

/// An implication-closed set of [`Provision`]s.
///
/// ```
/// use portico_affordance::*;
///
/// let provisions = ProvisionSet::from(SECPROV_SERVER_NONCE_PER_REQUEST);
/// assert!(provisions.contains(SECPROV_SERVER_NONCE));
/// assert!(provisions.contains(SECPROV_SERVER_NONCE_PER_RESOURCE));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProvisionSet(u32);

impl ProvisionSet {
    /// The set with no provisions.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from raw bits, closing it under implication.
    pub fn from_bits(bits: u32) -> Self {
        Self(PROVISIONS.close(bits))
    }

    /// The raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether `provision` is guaranteed.
    pub fn contains(self, provision: Provision) -> bool {
        self.0 & provision.bit() != 0
    }

    /// Whether every provision of `other` is guaranteed here too.
    pub fn is_superset(self, other: ProvisionSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// The number of guaranteed provisions.
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether nothing is guaranteed.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The guaranteed provisions in registration order.
    pub fn provisions(self) -> impl Iterator<Item = Provision> {
        ALL_PROVISIONS
            .into_iter()
            .filter(move |provision| self.contains(*provision))
    }

    /// Every implication-closed provision set, in ascending bit order.
    pub fn all_sets() -> &'static [ProvisionSet] {
        &PROVISION_SETS
    }

    /// Every provision set that guarantees at least `required`.
    pub fn at_least(required: impl Into<ProvisionSet>) -> USet<ProvisionSet> {
        let required = required.into();
        Self::all_sets()
            .iter()
            .copied()
            .filter(|set| set.is_superset(required))
            .collect()
    }
}

impl From<Provision> for ProvisionSet {
    fn from(provision: Provision) -> Self {
        Self::from_bits(provision.bit())
    }
}

impl FromIterator<Provision> for ProvisionSet {
    fn from_iter<I: IntoIterator<Item = Provision>>(iter: I) -> Self {
        Self::from_bits(iter.into_iter().fold(0, |bits, provision| bits | provision.bit()))
    }
}

impl Lattice for ProvisionSet {
    fn is_subset(&self, other: &Self) -> bool {
        other.is_superset(*self)
    }

    fn join(&self, other: &Self) -> Self {
        *self | *other
    }

    fn meet(&self, other: &Self) -> Self {
        *self & *other
    }

    fn is_bottom(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Into<ProvisionSet>> BitOr<T> for ProvisionSet {
    type Output = ProvisionSet;

    fn bitor(self, rhs: T) -> ProvisionSet {
        Self(self.0 | rhs.into().0)
    }
}

impl<T: Into<ProvisionSet>> BitOrAssign<T> for ProvisionSet {
    fn bitor_assign(&mut self, rhs: T) {
        *self = *self | rhs;
    }
}

impl<T: Into<ProvisionSet>> BitAnd<T> for ProvisionSet {
    type Output = ProvisionSet;

    // Intersections of closed sets are closed.
    fn bitand(self, rhs: T) -> ProvisionSet {
        Self(self.0 & rhs.into().0)
    }
}

impl<T: Into<ProvisionSet>> BitAndAssign<T> for ProvisionSet {
    fn bitand_assign(&mut self, rhs: T) {
        *self = *self & rhs;
    }
}

impl<T: Into<ProvisionSet>> BitOr<T> for Provision {
    type Output = ProvisionSet;

    fn bitor(self, rhs: T) -> ProvisionSet {
        ProvisionSet::from(self) | rhs
    }
}

impl Display for ProvisionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("no provisions");
        }
        f.write_str(&self.provisions().map(Provision::displayname).join(", "))
    }
}

impl Debug for ProvisionSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ProvisionSet({})",
            self.provisions().map(Provision::name).join(" | ")
        )
    }
}
