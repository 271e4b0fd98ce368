#![warn(missing_docs)]

//! Value types for authentication negotiation.
//!
//! Negotiation is expressed as the intersection of *affordances*: sets of
//! acceptable realms, security provision sets, algorithms and token sets.
//! Any of these may be universal ("anything goes"), which is modelled by
//! [`USet`] without ever enumerating the universe.
//!
//! ```
//! use portico_affordance::*;
//!
//! let space = AffordanceSet::max()
//!     .with_realms(USet::single("example.net".to_string()))
//!     .with_provisionsets(ProvisionSet::at_least(SECPROV_CLIENT_AUTH));
//! let caller = AffordanceSet::max().with_algorithms(USet::single("plain".to_string()));
//!
//! let combined = &space & &caller;
//! assert!(combined.realms.contains("example.net"));
//! assert!(combined.provisionsets.contains(&ProvisionSet::from(SECPROV_CLIENT_AUTH)));
//! assert!(combined.require_finite(&[AffordanceComponent::Provisionsets]).is_ok());
//! ```

mod error;
pub use error::*;

mod uset;
pub use uset::*;

mod flags;
pub use flags::*;

mod provisions;
pub use provisions::*;

mod tokens;
pub use tokens::*;

mod affordances;
pub use affordances::*;
