use crate::error::SessionIdError;
use crate::SessionMap;
use chrono::{DateTime, Utc};
use rand::distributions::Distribution;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The opaque identifier of the authenticated principal owning a session.
pub type AuthId = Vec<u8>;

/// A session as persisted by a [`SessionStoreImplementation`](crate::SessionStoreImplementation).
///
/// Sessions are created by the [`SessionStore`](crate::SessionStore) on the first save of a
/// session that had no stored record, and refreshed on every later save.
/// It is always true that `accessed_at >= created_at`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The primary key of the session.
    pub key: SessionId,
    /// The authenticated principal, if any.
    /// Allows to delete all sessions of one principal at once.
    pub auth_id: Option<AuthId>,
    /// The application data, without the auth key.
    pub data: SessionMap,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last saved.
    pub accessed_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session that was created and accessed at `now`.
    pub fn new(
        key: SessionId,
        auth_id: Option<AuthId>,
        data: SessionMap,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            auth_id,
            data,
            created_at: now,
            accessed_at: now,
        }
    }
}

/// The number of characters of a session id.
pub const SESSION_ID_LENGTH: usize = 24;

/// The alphabet of session ids, which is the URL-safe base64 alphabet.
/// Each character carries 6 bits of entropy, hence a session id carries 144 bits.
const ALPHABET: &[u8; 64] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

/// A session id.
///
/// Session ids are either generated from a cryptographically secure random source,
/// or parsed from untrusted text, in which case they are validated byte by byte.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId([u8; SESSION_ID_LENGTH]);

/// Samples characters of the session id alphabet uniformly.
#[derive(Debug, Clone, Copy)]
struct UrlSafe;

impl Distribution<u8> for UrlSafe {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        // The alphabet has exactly 64 entries, so the upper six bits index it without bias.
        ALPHABET[(rng.next_u32() >> 26) as usize]
    }
}

impl SessionId {
    /// Generate a new random session id.
    ///
    /// The random source must be cryptographically secure.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use server_session::SessionId;
    /// let id = SessionId::generate(&mut rand::thread_rng());
    /// assert_eq!(SessionId::parse(id.as_str()), Ok(id));
    /// ```
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut id = [0; SESSION_ID_LENGTH];
        for byte in id.iter_mut() {
            *byte = UrlSafe.sample(rng);
        }
        Self(id)
    }

    /// Parse a session id from untrusted text, e.g. a cookie value.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use server_session::{SessionId, SessionIdError};
    /// assert!(SessionId::parse("abcdefghijklmnopqrstuvwx").is_ok());
    /// assert_eq!(
    ///     SessionId::parse("too-short"),
    ///     Err(SessionIdError::WrongLength { expected: 24, actual: 9 })
    /// );
    /// ```
    pub fn parse(text: &str) -> Result<Self, SessionIdError> {
        let bytes = text.as_bytes();
        let id: [u8; SESSION_ID_LENGTH] =
            bytes.try_into().map_err(|_| SessionIdError::WrongLength {
                expected: SESSION_ID_LENGTH,
                actual: bytes.len(),
            })?;

        if let Some(position) = id.iter().position(|byte| !is_alphabet_byte(*byte)) {
            return Err(SessionIdError::InvalidCharacter { position });
        }

        Ok(Self(id))
    }

    /// The textual form of this session id, as sent to the client.
    pub fn as_str(&self) -> &str {
        // Only ASCII bytes from the alphabet can be stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

fn is_alphabet_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionIdError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::parse(text)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for SessionId {
    /// Prints only a prefix of the id, so that ids do not end up in logs.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({}…)", &self.as_str()[..4])
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
