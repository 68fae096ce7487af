use crate::Session;

/// All errors that the session store and its backends can produce.
///
/// `StorageError` is the error type of the storage backend, see
/// [`SessionStoreImplementation::Error`](crate::SessionStoreImplementation::Error).
#[derive(Debug, thiserror::Error)]
pub enum Error<StorageError> {
    /// A session was inserted, but a session with the same key already exists.
    /// Backends must never overwrite in this case.
    /// This indicates either a key collision or a bug in the session store, and
    /// the request that caused it should be aborted.
    #[error("a session with the inserted key already exists")]
    SessionAlreadyExists {
        /// The session that is already stored under the key.
        existing: Box<Session>,
    },

    /// A session was attempted to be replaced, but no session with its key exists.
    /// Backends must never create a session in this case, since that would allow
    /// resurrecting a client-chosen session id.
    /// This may happen due to concurrent deletion. If you receive this error, revert
    /// everything that you did while handling the request that used this session.
    #[error("the session that was attempted to be replaced does not exist, which indicates that it was concurrently deleted")]
    SessionDoesNotExist {
        /// The session that was attempted to be written.
        session: Box<Session>,
    },

    /// An error occurred in the storage backend.
    #[error("{0}")]
    Storage(StorageError),
}

impl<StorageError> From<StorageError> for Error<StorageError> {
    fn from(error: StorageError) -> Self {
        Self::Storage(error)
    }
}

/// The given text is not a well-formed session id.
///
/// Callers must treat this exactly like "no session was presented".
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum SessionIdError {
    /// The given text has a wrong length.
    #[error("the given session id has length {actual}, but is expected to have length {expected}")]
    WrongLength {
        /// The expected length.
        expected: usize,
        /// The actual length, in bytes.
        actual: usize,
    },

    /// The given text contains a byte outside the session id alphabet.
    #[error("the given session id contains an invalid character at position {position}")]
    InvalidCharacter {
        /// The byte offset of the first invalid character.
        position: usize,
    },
}

mod expect_impl_error {
    trait ExpectImplError: std::error::Error {}

    impl<StorageError: std::error::Error> ExpectImplError for super::Error<StorageError> {}
    impl ExpectImplError for super::SessionIdError {}
}
