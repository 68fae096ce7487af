//! The application-facing view of a session.
//!
//! Applications see a session as a plain [`SessionMap`]. Two keys of that map are reserved:
//! the configured [auth key](Config::auth_key), holding the [`AuthId`] of the logged-in
//! principal, and [`FORCE_INVALIDATE_KEY`], holding a [`ForceInvalidate`] directive.
//! Both are split out before a session is persisted.

use crate::{AuthId, Config, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The data of a session as seen by the application.
pub type SessionMap = HashMap<String, Vec<u8>>;

/// The reserved session map key holding a [`ForceInvalidate`] directive.
pub const FORCE_INVALIDATE_KEY: &str = "_FORCE_INVALIDATE";

/// Asks the session store to invalidate sessions when saving.
///
/// After invalidation, the remaining session data is saved under a freshly generated
/// session id. Applications should use this on login and logout to prevent session fixation.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ForceInvalidate {
    /// Invalidate the session that was loaded for this request.
    CurrentSession,
    /// Invalidate all sessions of the auth id of the session that was loaded for this request.
    AllSessionsOfAuthId,
    /// Do not invalidate anything.
    #[default]
    DoNotForceInvalidate,
}

impl ForceInvalidate {
    const CURRENT_SESSION: &'static [u8] = b"v1:current";
    const ALL_SESSIONS_OF_AUTH_ID: &'static [u8] = b"v1:all-of-auth-id";
    const DO_NOT_FORCE_INVALIDATE: &'static [u8] = b"v1:none";

    /// The serialized form stored under [`FORCE_INVALIDATE_KEY`].
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            Self::CurrentSession => Self::CURRENT_SESSION,
            Self::AllSessionsOfAuthId => Self::ALL_SESSIONS_OF_AUTH_ID,
            Self::DoNotForceInvalidate => Self::DO_NOT_FORCE_INVALIDATE,
        }
    }

    /// Parse the serialized form. Unknown values yield `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            Self::CURRENT_SESSION => Some(Self::CurrentSession),
            Self::ALL_SESSIONS_OF_AUTH_ID => Some(Self::AllSessionsOfAuthId),
            Self::DO_NOT_FORCE_INVALIDATE => Some(Self::DoNotForceInvalidate),
            _ => None,
        }
    }

    /// Store this directive in a session map.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use server_session::{decompose_session, Config, ForceInvalidate, SessionMap};
    /// let mut map = SessionMap::new();
    /// ForceInvalidate::CurrentSession.set_in(&mut map);
    /// let decomposed = decompose_session(&Config::default(), &map);
    /// assert_eq!(decomposed.force_invalidate, ForceInvalidate::CurrentSession);
    /// assert!(decomposed.data.is_empty());
    /// ```
    pub fn set_in(self, map: &mut SessionMap) {
        map.insert(FORCE_INVALIDATE_KEY.to_owned(), self.to_bytes().to_vec());
    }
}

/// A session map with its reserved keys split out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DecomposedSession {
    /// The value of the auth key, if present.
    pub auth_id: Option<AuthId>,
    /// The force invalidation directive.
    pub force_invalidate: ForceInvalidate,
    /// All other entries.
    pub data: SessionMap,
}

/// Split the reserved keys out of a session map. The map itself is left untouched.
pub fn decompose_session(config: &Config, session_map: &SessionMap) -> DecomposedSession {
    let mut data = session_map.clone();
    let auth_id = data.remove(config.auth_key());
    let force_invalidate = data
        .remove(FORCE_INVALIDATE_KEY)
        .and_then(|bytes| ForceInvalidate::from_bytes(&bytes))
        .unwrap_or_default();

    DecomposedSession {
        auth_id,
        force_invalidate,
        data,
    }
}

/// Build the session map the application sees for a stored session.
///
/// The auth id, if any, is inserted under the auth key and takes precedence over
/// a colliding entry in the session data.
pub fn to_session_map(config: &Config, session: &Session) -> SessionMap {
    let mut session_map = session.data.clone();
    if let Some(auth_id) = &session.auth_id {
        session_map.insert(config.auth_key().to_owned(), auth_id.clone());
    }
    session_map
}
