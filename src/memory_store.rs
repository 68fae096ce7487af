use crate::expiry::check_expired;
use crate::{AuthId, Config, Error, Result, Session, SessionId, SessionStoreImplementation};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

/// # in-memory session store
/// Because there is no external
/// persistence, this session store is ephemeral and will be cleared
/// on server restart.
///
/// The whole table lives behind an [`ArcSwap`]. Reads atomically load the current table,
/// and writes atomically swap in an updated copy, so every operation is indivisible for
/// concurrent callers. Clones of a memory store share the same table.
///
/// Besides being usable on its own, it is the reference backend that the
/// [conformance suite](crate::conformance) is checked against.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. Sessions stored in memory are cleared only if they are deleted or [`MemoryStore::cleanup`] is called.
///    If sessions are not cleaned up properly it might result in OOM
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
///    This might be solved by using load balancers with sticky sessions.
/// 5. Every write copies the whole table.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    table: Arc<ArcSwap<SessionTable>>,
    logger: Option<Arc<Mutex<Vec<Operation>>>>,
}

#[derive(Debug, Clone, Default)]
struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    sessions_by_auth_id: HashMap<AuthId, HashSet<SessionId>>,
}

/// An operation executed on a [`MemoryStore`], as recorded by its logger.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Operation {
    /// [`SessionStoreImplementation::get_session`]
    GetSession {
        /// The requested id.
        id: SessionId,
    },
    /// [`SessionStoreImplementation::insert_session`]
    InsertSession {
        /// The inserted session.
        session: Session,
    },
    /// [`SessionStoreImplementation::replace_session`]
    ReplaceSession {
        /// The replacing session.
        session: Session,
    },
    /// [`SessionStoreImplementation::delete_session`]
    DeleteSession {
        /// The deleted id.
        id: SessionId,
    },
    /// [`SessionStoreImplementation::delete_all_sessions_of_auth_id`]
    DeleteAllSessionsOfAuthId {
        /// The auth id whose sessions were deleted.
        auth_id: AuthId,
    },
}

#[async_trait]
impl SessionStoreImplementation for MemoryStore {
    type Error = Infallible;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, Self::Error> {
        self.log(|| Operation::GetSession { id: *id });
        Ok(self.table.load().sessions.get(id).cloned())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), Self::Error> {
        self.log(|| Operation::InsertSession {
            session: session.clone(),
        });
        let previous = self.update(|table| {
            if !table.sessions.contains_key(&session.key) {
                table.insert(session.clone());
            }
        });

        match previous.sessions.get(&session.key) {
            Some(existing) => Err(Error::SessionAlreadyExists {
                existing: Box::new(existing.clone()),
            }),
            None => Ok(()),
        }
    }

    async fn replace_session(&self, session: &Session) -> Result<(), Self::Error> {
        self.log(|| Operation::ReplaceSession {
            session: session.clone(),
        });
        let previous = self.update(|table| {
            if table.remove(&session.key).is_some() {
                table.insert(session.clone());
            }
        });

        if previous.sessions.contains_key(&session.key) {
            Ok(())
        } else {
            Err(Error::SessionDoesNotExist {
                session: Box::new(session.clone()),
            })
        }
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), Self::Error> {
        self.log(|| Operation::DeleteSession { id: *id });
        self.update(|table| {
            table.remove(id);
        });
        Ok(())
    }

    async fn delete_all_sessions_of_auth_id(&self, auth_id: &AuthId) -> Result<(), Self::Error> {
        self.log(|| Operation::DeleteAllSessionsOfAuthId {
            auth_id: auth_id.clone(),
        });
        self.update(|table| {
            for id in table
                .sessions_by_auth_id
                .remove(auth_id)
                .into_iter()
                .flatten()
            {
                table.sessions.remove(&id);
            }
        });
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new empty memory store that records all operations executed on it.
    /// The log is shared between clones of the store.
    pub fn new_with_logger() -> Self {
        Self {
            logger: Some(Default::default()),
            ..Default::default()
        }
    }

    /// Returns the operations recorded so far, oldest first.
    /// Returns an empty list if this store was not created with [`MemoryStore::new_with_logger`].
    pub fn logged_operations(&self) -> Vec<Operation> {
        self.logger
            .as_ref()
            .map(|logger| {
                logger
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .unwrap_or_default()
    }

    /// Returns the number of sessions in the memory store.
    pub fn len(&self) -> usize {
        self.table.load().sessions.len()
    }

    /// Returns true if the memory store is empty.
    pub fn is_empty(&self) -> bool {
        self.table.load().sessions.is_empty()
    }

    /// Calls `f` on a snapshot of every stored session.
    pub fn for_each(&self, f: impl FnMut(&Session)) {
        self.table.load().sessions.values().for_each(f);
    }

    /// Deletes all sessions.
    pub fn clear(&self) {
        self.table.store(Default::default());
    }

    /// Performs session cleanup, deleting all sessions that are expired at `now` under `config`.
    /// This should be run on an intermittent basis if this store is run for long enough that
    /// memory accumulation is a concern.
    ///
    /// Returns the number of deleted sessions.
    pub fn cleanup(&self, now: DateTime<Utc>, config: &Config) -> usize {
        tracing::trace!("Cleaning up memory store...");
        let mut deleted = 0;
        self.update(|table| {
            let expired: Vec<_> = table
                .sessions
                .values()
                .filter(|session| check_expired(now, config, session).is_none())
                .map(|session| session.key)
                .collect();
            deleted = expired.len();
            for id in &expired {
                table.remove(id);
            }
        });
        tracing::trace!("Deleted {deleted} expired sessions");
        deleted
    }

    /// Atomically applies `f` to a copy of the current table and swaps the copy in.
    /// `f` may run more than once if concurrent writes interfere.
    /// Returns the table that was replaced.
    fn update(&self, mut f: impl FnMut(&mut SessionTable)) -> Arc<SessionTable> {
        self.table.rcu(|current| {
            let mut table = SessionTable::clone(current);
            f(&mut table);
            table
        })
    }

    fn log(&self, operation: impl FnOnce() -> Operation) {
        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(operation());
        }
    }
}

impl SessionTable {
    /// Inserts the session and indexes its auth id.
    /// The key must not be present.
    fn insert(&mut self, session: Session) {
        if let Some(auth_id) = &session.auth_id {
            self.sessions_by_auth_id
                .entry(auth_id.clone())
                .or_default()
                .insert(session.key);
        }
        self.sessions.insert(session.key, session);
    }

    fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        if let Some(auth_id) = &session.auth_id {
            if let Some(ids) = self.sessions_by_auth_id.get_mut(auth_id) {
                ids.remove(id);
                if ids.is_empty() {
                    self.sessions_by_auth_id.remove(auth_id);
                }
            }
        }
        Some(session)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(SessionTable::default())),
            logger: None,
        }
    }
}
