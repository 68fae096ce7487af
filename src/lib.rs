//! Server-side HTTP sessions.
//!
//! This crate provides a generic interface between cookie values and
//! storage backends to create a concept of sessions. The [`SessionStore`] decides
//! which session data a request sees, whether that session is still valid, and how
//! to persist changes at the end of the request. Storage backends implement
//! [`SessionStoreImplementation`].
//!
//! # Request lifecycle
//!
//! 1. The transport layer extracts the raw session cookie value, if any, and calls
//!    [`SessionStore::load_session`]. This returns a [`SessionMap`] and a [`SaveSessionToken`].
//! 2. The application reads and mutates the session map.
//! 3. The transport layer calls [`SessionStore::save_session`] with the session map and the token.
//!    The returned token holds the session that is now stored. The cookie should be set to its
//!    [`session_id`](SaveSessionToken::session_id), expiring at [`SessionStore::cookie_expires`],
//!    with the name and flags of the [`Config`]. If no session is stored, the cookie should be removed.
//!
//! # Security
//!
//! Session ids presented by clients are never trusted. Malformed ids never reach the storage
//! backend, and an id that does not belong to a stored unexpired session is dropped: new sessions
//! always get a freshly generated id, and backends never create a session when asked to replace
//! one. This prevents session fixation. Applications should additionally set a
//! [`ForceInvalidate`] directive when a user logs in or out, so that the session continues
//! under a fresh id.
//!
//! Session ids consist of 24 characters from the URL-safe base64 alphabet, which gives 144 bits
//! of entropy when generated by a cryptographically secure random source.
//!
//! # Expiry
//!
//! Sessions expire if they are not used for the [idle timeout](Config::idle_timeout), or if
//! they are older than the [absolute timeout](Config::absolute_timeout).
//! To reduce writes, an unchanged session is only written back once its last access is older
//! than the [timeout resolution](Config::timeout_resolution).
//!
//! # Example
//!
//! ```
//! use server_session::{Config, MemoryStore, SessionStore};
//!
//! # fn main() -> Result<(), server_session::Error<std::convert::Infallible>> {
//! # async_std::task::block_on(async {
//! #
//! // Init a new session store we can persist sessions to.
//! let store = SessionStore::new(MemoryStore::new(), Config::default());
//!
//! // A request without session cookie sees an empty session.
//! let (mut session_map, token) = store.load_session(None).await?;
//! assert!(session_map.is_empty());
//!
//! // The application stores some data, and a new session is created when saving.
//! session_map.insert("theme".to_owned(), b"dark".to_vec());
//! let token = store.save_session(&session_map, token).await?;
//! let cookie_value = token.session_id().unwrap().to_string();
//!
//! // The next request presents the cookie and sees the data.
//! let (session_map, _token) = store.load_session(Some(&cookie_value)).await?;
//! assert_eq!(session_map["theme"], b"dark");
//! #
//! # Ok(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

/// A result whose error is this crate's [`Error`] over the given storage backend error.
pub type Result<T, StorageError> = std::result::Result<T, Error<StorageError>>;

pub mod conformance;
mod config;
mod error;
mod expiry;
mod memory_store;
mod session;
mod session_map;
mod session_store;

pub use config::{Config, DEFAULT_AUTH_KEY, DEFAULT_COOKIE_NAME};
pub use error::{Error, SessionIdError};
pub use expiry::{
    check_expired, cookie_expires, cookie_expires_at, next_expires,
    COOKIE_EXPIRY_DAYS_WITHOUT_TIMEOUTS,
};
pub use memory_store::{MemoryStore, Operation};
pub use session::{AuthId, Session, SessionId, SESSION_ID_LENGTH};
pub use session_map::{
    decompose_session, to_session_map, DecomposedSession, ForceInvalidate, SessionMap,
    FORCE_INVALIDATE_KEY,
};
pub use session_store::{
    DebugSessionIdGenerator, DefaultSessionIdGenerator, SaveSessionToken, SessionIdGenerator,
    SessionStore, SessionStoreImplementation,
};
