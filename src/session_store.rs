use crate::expiry::{check_expired, cookie_expires, cookie_expires_at};
use crate::session_map::{decompose_session, to_session_map, DecomposedSession};
use crate::{AuthId, Config, ForceInvalidate, Result, Session, SessionId, SessionMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

mod id_generator;

pub use id_generator::{DebugSessionIdGenerator, DefaultSessionIdGenerator, SessionIdGenerator};

/// A session store.
///
/// This is the user-facing interface of the session store.
/// It decides which session a request sees, and persists the session at the end of the request
/// via a [`SessionStoreImplementation`].
///
/// Session ids presented by clients are never trusted: a session id is only used if it is the key
/// of a stored, unexpired session, and new sessions always get a freshly generated id.
#[derive(Debug)]
pub struct SessionStore<Implementation, Generator = DefaultSessionIdGenerator> {
    implementation: Implementation,
    id_generator: Generator,
    config: Config,
}

/// Threads the state of a request from [`SessionStore::load_session`] to [`SessionStore::save_session`].
///
/// It holds the time at which the session was loaded and the session that was loaded, if any.
/// After saving, it holds the session that is now stored, which is what the session cookie
/// should be set to.
#[derive(Debug, Clone, Eq, PartialEq)]
#[must_use]
pub struct SaveSessionToken {
    now: DateTime<Utc>,
    baseline: Option<Session>,
}

impl SaveSessionToken {
    /// The time at which the session was loaded.
    /// Saving uses this time as well.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The session that was loaded or saved, if any.
    pub fn baseline(&self) -> Option<&Session> {
        self.baseline.as_ref()
    }

    /// The id of the session that was loaded or saved, if any.
    /// After saving, this is the value of the session cookie.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.baseline.as_ref().map(|session| &session.key)
    }

    /// Consumes the token, returning the session that was loaded or saved, if any.
    pub fn into_baseline(self) -> Option<Session> {
        self.baseline
    }

    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            now,
            baseline: None,
        }
    }
}

impl<Implementation: SessionStoreImplementation> SessionStore<Implementation> {
    /// Create a new session store with the given implementation and configuration,
    /// generating session ids with the [`DefaultSessionIdGenerator`].
    pub fn new(implementation: Implementation, config: Config) -> Self {
        Self::new_with_id_generator(implementation, DefaultSessionIdGenerator, config)
    }
}

impl<Implementation: SessionStoreImplementation, Generator: SessionIdGenerator>
    SessionStore<Implementation, Generator>
{
    /// Create a new session store with the given implementation, session id generator and configuration.
    pub fn new_with_id_generator(
        implementation: Implementation,
        id_generator: Generator,
        config: Config,
    ) -> Self {
        Self {
            implementation,
            id_generator,
            config,
        }
    }

    /// The configuration of this session store.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The storage backend of this session store.
    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    /// Consume the session store, returning its storage backend.
    pub fn into_inner(self) -> Implementation {
        self.implementation
    }

    /// Load the session for a request.
    ///
    /// The `cookie_value` is the raw value of the session cookie, if the client sent one.
    /// Returns the session map the application should see, and a token to pass to
    /// [`save_session`](Self::save_session) at the end of the request.
    ///
    /// If there is no cookie, the cookie is malformed, or it does not identify a stored unexpired
    /// session, an empty session map is returned. Storage is only consulted for well-formed cookies.
    /// Errors of the storage backend are returned unchanged and should abort the request.
    pub async fn load_session(
        &self,
        cookie_value: Option<&str>,
    ) -> Result<(SessionMap, SaveSessionToken), Implementation::Error> {
        self.load_session_at(Utc::now(), cookie_value).await
    }

    /// Like [`load_session`](Self::load_session), but with an explicit current time.
    pub async fn load_session_at(
        &self,
        now: DateTime<Utc>,
        cookie_value: Option<&str>,
    ) -> Result<(SessionMap, SaveSessionToken), Implementation::Error> {
        let empty = || (SessionMap::new(), SaveSessionToken::empty(now));

        let Some(cookie_value) = cookie_value else {
            trace!("No session cookie presented");
            return Ok(empty());
        };
        let id = match SessionId::parse(cookie_value) {
            Ok(id) => id,
            Err(error) => {
                debug!("Ignoring malformed session cookie: {error}");
                return Ok(empty());
            }
        };

        let Some(session) = self.implementation.get_session(&id).await? else {
            debug!("Session {id:?} does not exist");
            return Ok(empty());
        };
        if check_expired(now, &self.config, &session).is_none() {
            debug!("Session {id:?} is expired");
            return Ok(empty());
        }

        trace!("Loaded session {id:?}");
        let session_map = to_session_map(&self.config, &session);
        Ok((
            session_map,
            SaveSessionToken {
                now,
                baseline: Some(session),
            },
        ))
    }

    /// Save the session of a request.
    ///
    /// `session_map` is the session map as left by the application, and `token` is the token
    /// returned by [`load_session`](Self::load_session) for the same request.
    /// The returned token holds the session that is now stored, if any.
    ///
    /// * If the session map contains a [`ForceInvalidate`] directive, the loaded session
    ///   (or all sessions of its auth id) is deleted first, and saving continues as if no
    ///   session was loaded.
    /// * If no session was loaded, a session with a freshly generated id is inserted,
    ///   unless the session map is empty.
    /// * If a session was loaded, it is replaced under its existing id. The write is skipped
    ///   if the data is unchanged and the session was accessed within the
    ///   [timeout resolution](Config::timeout_resolution).
    ///
    /// A save issues at most one mutating storage call, except after a [`ForceInvalidate`]
    /// directive, where the delete may be followed by an insert of the remaining data.
    pub async fn save_session(
        &self,
        session_map: &SessionMap,
        token: SaveSessionToken,
    ) -> Result<SaveSessionToken, Implementation::Error> {
        let SaveSessionToken { now, baseline } = token;
        let decomposed = decompose_session(&self.config, session_map);

        let baseline = match (decomposed.force_invalidate, baseline) {
            (ForceInvalidate::DoNotForceInvalidate, baseline) => baseline,
            (force_invalidate, Some(baseline)) => {
                self.invalidate(force_invalidate, &baseline).await?;
                None
            }
            (force_invalidate, None) => {
                trace!("No session to invalidate for {force_invalidate:?}");
                None
            }
        };

        let saved = match baseline {
            None => self.insert_new_session(now, decomposed).await?,
            Some(baseline) => Some(self.refresh_session(now, baseline, decomposed).await?),
        };

        Ok(SaveSessionToken {
            now,
            baseline: saved,
        })
    }

    /// The expiry of the session cookie for the given session.
    /// See [`cookie_expires`](crate::cookie_expires).
    pub fn cookie_expires(&self, session: &Session) -> Option<DateTime<Utc>> {
        cookie_expires(&self.config, session)
    }

    /// The expiry of the session cookie for the session held by the token, as of the time
    /// the request loaded its session. Returns `None` if the token holds no session.
    /// See [`cookie_expires_at`](crate::cookie_expires_at).
    pub fn cookie_expires_at(&self, token: &SaveSessionToken) -> Option<DateTime<Utc>> {
        let session = token.baseline()?;
        cookie_expires_at(token.now(), &self.config, session)
    }

    /// Delete all sessions of the given auth id, e.g. to log a principal out everywhere.
    pub async fn invalidate_auth_id(&self, auth_id: &AuthId) -> Result<(), Implementation::Error> {
        debug!("Deleting all sessions of an auth id");
        self.implementation
            .delete_all_sessions_of_auth_id(auth_id)
            .await
    }

    async fn invalidate(
        &self,
        force_invalidate: ForceInvalidate,
        baseline: &Session,
    ) -> Result<(), Implementation::Error> {
        match (force_invalidate, &baseline.auth_id) {
            (ForceInvalidate::AllSessionsOfAuthId, Some(auth_id)) => {
                debug!("Invalidating all sessions of the auth id of {:?}", baseline.key);
                self.implementation
                    .delete_all_sessions_of_auth_id(auth_id)
                    .await
            }
            _ => {
                debug!("Invalidating session {:?}", baseline.key);
                self.implementation.delete_session(&baseline.key).await
            }
        }
    }

    async fn insert_new_session(
        &self,
        now: DateTime<Utc>,
        decomposed: DecomposedSession,
    ) -> Result<Option<Session>, Implementation::Error> {
        let DecomposedSession { auth_id, data, .. } = decomposed;
        if auth_id.is_none() && data.is_empty() {
            trace!("Not storing empty session");
            return Ok(None);
        }

        let session = Session::new(self.id_generator.generate_session_id(), auth_id, data, now);
        debug!("Inserting new session {:?}", session.key);
        self.implementation.insert_session(&session).await?;
        Ok(Some(session))
    }

    async fn refresh_session(
        &self,
        now: DateTime<Utc>,
        baseline: Session,
        decomposed: DecomposedSession,
    ) -> Result<Session, Implementation::Error> {
        let DecomposedSession { auth_id, data, .. } = decomposed;
        let unchanged = baseline.auth_id == auth_id && baseline.data == data;
        let recently_accessed = self
            .config
            .timeout_resolution()
            .map_or(false, |resolution| now - baseline.accessed_at < resolution);
        if unchanged && recently_accessed {
            trace!("Session {:?} is unchanged, skipping write", baseline.key);
            return Ok(baseline);
        }

        let session = Session {
            key: baseline.key,
            auth_id,
            data,
            created_at: baseline.created_at,
            accessed_at: now.max(baseline.created_at),
        };
        debug!("Replacing session {:?}", session.key);
        self.implementation.replace_session(&session).await?;
        Ok(session)
    }
}

/// This is the backend-facing interface of the session store.
/// It defines simple [CRUD]-methods on sessions.
///
/// The session key is expected to be the primary key, uniquely identifying a session.
/// Each method is a unit of work on its own, e.g. a database transaction, and must appear
/// atomic to concurrent callers: a read racing a write on the same key observes either the
/// complete previous state or the complete new state.
/// The session store never relies on two calls being executed together.
///
/// [CRUD]: https://en.wikipedia.org/wiki/Create,_read,_update_and_delete
#[async_trait]
pub trait SessionStoreImplementation: Send + Sync {
    /// The errors of the backend itself, e.g. connection failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the session with the given `id`.
    /// This must reflect the most recent completed write of any caller.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, Self::Error>;

    /// Create a new session.
    /// Fails with [`SessionAlreadyExists`](crate::Error::SessionAlreadyExists) without changing
    /// anything if a session with the same key exists.
    async fn insert_session(&self, session: &Session) -> Result<(), Self::Error>;

    /// Overwrite an existing session.
    /// Fails with [`SessionDoesNotExist`](crate::Error::SessionDoesNotExist) without changing
    /// anything if no session with the same key exists.
    async fn replace_session(&self, session: &Session) -> Result<(), Self::Error>;

    /// Delete the session with the given `id`. Does nothing if it does not exist.
    async fn delete_session(&self, id: &SessionId) -> Result<(), Self::Error>;

    /// Delete all sessions with the given `auth_id`.
    async fn delete_all_sessions_of_auth_id(&self, auth_id: &AuthId) -> Result<(), Self::Error>;
}
