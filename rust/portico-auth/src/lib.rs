#![warn(missing_docs)]

//! Negotiation of authentication processes.
//!
//! A request arrives at a location governed by a [`Space`], which states the
//! realms, security provisions and algorithms acceptable there. The
//! [`Authenticator`] knows the registered [`Algorithm`]s and connectors:
//! [`Clerk`]s that talk to the client, [`Scanner`]s that read tokens from the
//! request and [`Supplicant`]s that verify tokens against a backend. For each
//! request it intersects what the space, the caller and every participant
//! afford, resolves the best feasible process and runs it.
//!
//! ```
//! use portico_auth::*;
//! use portico_auth::helpers::*;
//! use portico_affordance::AffordanceSet;
//!
//! # fn main() -> Result<(), AuthError> {
//! let authenticator = Authenticator::builder()
//!     .algorithm(FixedAlgorithm::plain())
//!     .clerk(ChallengeClerk::new("form"))
//!     .scanner(ArgsScanner::new("form", ["user", "password"]))
//!     .supplicant(InMemoryPlainSupplicant::new(
//!         "users",
//!         "example.net",
//!         [("alice", "wonderland")],
//!     ))
//!     .space(["/"], Space::builder().realm("example.net").build())
//!     .build()?;
//!
//! let request = MockRequest::get("/")
//!     .with_arg("user", "alice")
//!     .with_arg("password", "wonderland");
//! let mut exchange = Exchange::new(&request);
//! authenticator.ensure_auth("/", &AffordanceSet::max(), &mut exchange)?;
//! assert_eq!(exchange.auth_info().and_then(|info| info.user()), Some("alice"));
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod request;
pub use request::*;

mod info;
pub use info::*;

mod handlers;
pub use handlers::*;

mod connectors;
pub use connectors::*;

mod algorithms;
pub use algorithms::*;

mod plain;

mod session;
pub use session::*;

mod digest;
pub use digest::*;

mod nonce;
pub use nonce::*;

mod prospective;
pub use prospective::*;

mod space;
pub use space::*;

mod scoring;
pub use scoring::*;

mod resolve;
pub(crate) use resolve::*;

mod authenticator;
pub use authenticator::*;

mod inmem;
pub use inmem::*;

mod session_store;
pub use session_store::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;
