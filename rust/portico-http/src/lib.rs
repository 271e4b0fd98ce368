#![warn(missing_docs)]

//! HTTP connectors for portico authentication.
//!
//! Clerks write challenges, redirections and cookies to the request's
//! [`Exchange`](portico_auth::Exchange); scanners read credentials from
//! headers, cookies and method arguments. [`AuthResponse`] turns the outcome
//! of [`Authenticator::ensure_auth`](portico_auth::Authenticator::ensure_auth)
//! into a status and the headers to send.

/// Implements the negotiation side shared by the HTTP connectors: any
/// realm and provisions, one algorithm.
macro_rules! http_connector {
    ($type:ty, $algorithm:expr) => {
        impl portico_auth::RealmHandler for $type {}

        impl portico_auth::ProvisionSetHandler for $type {}

        impl portico_auth::AlgorithmHandler for $type {
            fn declared_algorithms(
                &self,
                _upstream: &portico_affordance::ProcessAffordanceSet,
                _downstream: &portico_affordance::ProcessAffordanceSet,
            ) -> portico_affordance::USet<String> {
                portico_affordance::USet::single($algorithm.to_string())
            }
        }

        impl portico_auth::Participant for $type {
            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

mod header;
pub use header::*;

mod status;
pub use status::*;

mod basic;
pub use basic::*;

mod digest;
pub use digest::*;

mod session;
pub use session::*;
