use crate::session::SESSION_ID_LENGTH;
use crate::SessionId;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// A type with the ability to generate session ids.
///
/// This is the random source of a [`SessionStore`](crate::SessionStore).
/// Implementations used in production must be cryptographically secure.
pub trait SessionIdGenerator: Send + Sync {
    /// Generate a fresh session id.
    fn generate_session_id(&self) -> SessionId;
}

/// The default session id generator with focus on security.
/// It uses [rand::thread_rng], which is a cryptographically secure generator, as random source.
/// This gives `log_2(64) = 6` bits of entropy per character, and 144 bits per session id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSessionIdGenerator;

impl SessionIdGenerator for DefaultSessionIdGenerator {
    fn generate_session_id(&self) -> SessionId {
        SessionId::generate(&mut rand::thread_rng())
    }
}

/// A debug session id generator that generates an ascending sequence of integers, formatted as strings padded with zeroes.
///
/// **This generator is insecure and should only be used in tests.**
#[derive(Debug, Default)]
pub struct DebugSessionIdGenerator {
    next_index: AtomicU64,
}

impl DebugSessionIdGenerator {
    /// Returns the id that the `index`th call to [`generate_session_id`](SessionIdGenerator::generate_session_id) returns, starting at zero.
    pub fn session_id(index: u64) -> SessionId {
        let mut id = String::new();
        write!(&mut id, "{:0width$}", index, width = SESSION_ID_LENGTH)
            .unwrap_or_else(|_| unreachable!("writing to a string never fails"));
        SessionId::parse(&id)
            .unwrap_or_else(|error| unreachable!("zero-padded integers are valid ids: {error}"))
    }
}

impl SessionIdGenerator for DebugSessionIdGenerator {
    fn generate_session_id(&self) -> SessionId {
        Self::session_id(self.next_index.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_generator_counts_up() {
        let generator = DebugSessionIdGenerator::default();
        assert_eq!(
            generator.generate_session_id().as_str(),
            "000000000000000000000000"
        );
        assert_eq!(
            generator.generate_session_id().as_str(),
            "000000000000000000000001"
        );
        assert_eq!(
            generator.generate_session_id(),
            DebugSessionIdGenerator::session_id(2)
        );
    }

    #[test]
    fn default_generator_does_not_repeat() {
        let generator = DefaultSessionIdGenerator;
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| generator.generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
