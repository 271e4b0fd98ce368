//! Cookie based sessions: a login algorithm that issues session ids and a
//! recall algorithm that honours them.

use std::time::Duration;

use portico_affordance::SECPROV_CLIENT_AUTH;
use serde::{Deserialize, Serialize};

use crate::{FixedAlgorithm, InputSource, OutputTarget, PhaseSpec};

/// The token carrying a session id.
pub const SESSION_ID_TOKEN: &str = "session_id";

/// How session connectors talk to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Where clients log in.
    pub login_uri: String,
    /// The cookie carrying the session id.
    pub session_cookie: String,
    /// How long a session lasts.
    pub session_lifespan: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            login_uri: "/login".into(),
            session_cookie: SESSION_ID_TOKEN.into(),
            session_lifespan: Duration::from_secs(3600),
        }
    }
}

const LOGIN_PHASES: &[PhaseSpec] = &[
    PhaseSpec::new("solicit_login", InputSource::Start, OutputTarget::Clerk),
    PhaseSpec::new("verify_login", InputSource::Scanner, OutputTarget::Supplicant),
    PhaseSpec::new(
        "store_session_info",
        InputSource::Supplicant,
        OutputTarget::Supplicant,
    ),
    PhaseSpec::new("send_session_id", InputSource::Supplicant, OutputTarget::End),
];

const LOGIN_TOKENS: &[&[&str]] = &[
    &[],
    &["user", "password"],
    &["user", "accepted"],
    &["user", "accepted", SESSION_ID_TOKEN],
];

const RECALL_PHASES: &[PhaseSpec] = &[
    PhaseSpec::new("solicit_session_id", InputSource::Start, OutputTarget::Clerk),
    PhaseSpec::new(
        "fetch_session_info",
        InputSource::Scanner,
        OutputTarget::Supplicant,
    ),
    PhaseSpec::new(
        "verify_session_info",
        InputSource::Supplicant,
        OutputTarget::End,
    ),
];

const RECALL_TOKENS: &[&[&str]] = &[&[], &[SESSION_ID_TOKEN], &["user", "accepted"]];

impl FixedAlgorithm {
    /// The `session_login` algorithm: credentials are checked once and a
    /// session id is handed back to the client.
    ///
    /// The last phase does not need a session id when the login was
    /// rejected.
    pub const fn session_login() -> Self {
        Self::new("session_login", SECPROV_CLIENT_AUTH, LOGIN_PHASES, LOGIN_TOKENS)
    }

    /// The `session_recall` algorithm: a session id presented by the
    /// client is looked up in the session store.
    pub const fn session_recall() -> Self {
        Self::new(
            "session_recall",
            SECPROV_CLIENT_AUTH,
            RECALL_PHASES,
            RECALL_TOKENS,
        )
    }
}
