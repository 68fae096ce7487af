//! Idle and absolute expiry of sessions.
//!
//! A session has up to two deadlines: the idle deadline `accessed_at + idle_timeout`,
//! and the absolute deadline `created_at + absolute_timeout`.
//! It is valid as long as the current time has not passed any configured deadline.

use crate::{Config, Session};
use chrono::{DateTime, Duration, Utc};

/// How many days in the future a persistent cookie expires if sessions never expire.
pub const COOKIE_EXPIRY_DAYS_WITHOUT_TIMEOUTS: i64 = 3652;

/// Returns the session if it is not expired at `now`, and `None` otherwise.
///
/// # Example
///
/// ```rust
/// # use server_session::{check_expired, Config, Session, SessionId};
/// # use chrono::{Duration, Utc};
/// let now = Utc::now();
/// let config = Config::default().with_idle_timeout(Some(Duration::hours(1)));
/// let key = SessionId::generate(&mut rand::thread_rng());
/// let session = Session::new(key, None, Default::default(), now);
/// assert!(check_expired(now + Duration::hours(1), &config, &session).is_some());
/// assert!(check_expired(now + Duration::hours(2), &config, &session).is_none());
/// ```
pub fn check_expired<'session>(
    now: DateTime<Utc>,
    config: &Config,
    session: &'session Session,
) -> Option<&'session Session> {
    match next_expires(config, session) {
        Some(deadline) if deadline < now => None,
        _ => Some(session),
    }
}

/// The earliest configured deadline of the session, or `None` if it never expires.
pub fn next_expires(config: &Config, session: &Session) -> Option<DateTime<Utc>> {
    let idle_deadline = config
        .idle_timeout()
        .and_then(|timeout| session.accessed_at.checked_add_signed(timeout));
    let absolute_deadline = config
        .absolute_timeout()
        .and_then(|timeout| session.created_at.checked_add_signed(timeout));

    match (idle_deadline, absolute_deadline) {
        (Some(idle), Some(absolute)) => Some(idle.min(absolute)),
        (deadline, None) | (None, deadline) => deadline,
    }
}

/// The expiry to put on the session cookie, as of the current time.
/// See [`cookie_expires_at`].
pub fn cookie_expires(config: &Config, session: &Session) -> Option<DateTime<Utc>> {
    cookie_expires_at(Utc::now(), config, session)
}

/// The expiry to put on the session cookie.
///
/// Non-persistent cookies never carry an expiry. Persistent cookies expire together with
/// the session, or [`COOKIE_EXPIRY_DAYS_WITHOUT_TIMEOUTS`] days after `now` if sessions
/// never expire.
pub fn cookie_expires_at(
    now: DateTime<Utc>,
    config: &Config,
    session: &Session,
) -> Option<DateTime<Utc>> {
    if !config.persistent_cookies() {
        return None;
    }

    next_expires(config, session)
        .or_else(|| now.checked_add_signed(Duration::days(COOKIE_EXPIRY_DAYS_WITHOUT_TIMEOUTS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionId;

    fn session(created_ago: Duration, accessed_ago: Duration, now: DateTime<Utc>) -> Session {
        let mut session = Session::new(
            SessionId::generate(&mut rand::thread_rng()),
            None,
            Default::default(),
            now - created_ago,
        );
        session.accessed_at = now - accessed_ago;
        session
    }

    fn timeout_configs() -> Vec<Config> {
        let timeouts = [
            None,
            Some(Duration::zero()),
            Some(Duration::seconds(30)),
            Some(Duration::hours(1)),
            Some(Duration::days(7)),
        ];
        let mut configs = Vec::new();
        for idle in timeouts {
            for absolute in timeouts {
                configs.push(
                    Config::default()
                        .with_idle_timeout(idle)
                        .with_absolute_timeout(absolute),
                );
            }
        }
        configs
    }

    #[test]
    fn check_expired_agrees_with_next_expires() {
        let now = Utc::now();
        let ages = [
            Duration::zero(),
            Duration::seconds(30),
            Duration::seconds(31),
            Duration::minutes(59),
            Duration::hours(1),
            Duration::hours(2),
            Duration::days(8),
        ];
        for config in timeout_configs() {
            for created_ago in ages {
                for accessed_ago in ages.iter().copied().filter(|ago| *ago <= created_ago) {
                    let session = session(created_ago, accessed_ago, now);
                    let valid = check_expired(now, &config, &session).is_some();
                    let deadline_not_passed =
                        next_expires(&config, &session).map_or(true, |deadline| deadline >= now);
                    assert_eq!(valid, deadline_not_passed, "{config:?} {session:?}");
                }
            }
        }
    }

    #[test]
    fn deadline_is_inclusive() {
        let now = Utc::now();
        let config = Config::default()
            .with_idle_timeout(Some(Duration::seconds(30)))
            .with_absolute_timeout(None);
        let session = session(Duration::seconds(30), Duration::seconds(30), now);
        assert_eq!(next_expires(&config, &session), Some(now));
        assert!(check_expired(now, &config, &session).is_some());
        assert!(check_expired(now + Duration::nanoseconds(1), &config, &session).is_none());
    }

    #[test]
    fn next_expires_takes_earliest_deadline() {
        let now = Utc::now();
        let session = session(Duration::days(59), Duration::hours(1), now);
        let config = Config::default();
        assert_eq!(
            next_expires(&config, &session),
            Some(session.created_at + Duration::days(60))
        );
        let config = config.with_absolute_timeout(None);
        assert_eq!(
            next_expires(&config, &session),
            Some(session.accessed_at + Duration::days(7))
        );
        let config = config.with_idle_timeout(None);
        assert_eq!(next_expires(&config, &session), None);
        assert!(check_expired(now + Duration::days(10_000), &config, &session).is_some());
    }

    #[test]
    fn non_persistent_cookies_never_expire() {
        let now = Utc::now();
        let session = session(Duration::hours(2), Duration::hours(1), now);
        for config in timeout_configs() {
            let config = config.with_persistent_cookies(false);
            assert_eq!(cookie_expires(&config, &session), None);
        }
    }

    #[test]
    fn persistent_cookies_without_timeouts_last_ten_years() {
        let now = Utc::now();
        let session = session(Duration::days(400), Duration::days(300), now);
        let config = Config::default()
            .with_idle_timeout(None)
            .with_absolute_timeout(None);
        let expires = cookie_expires(&config, &session).unwrap();
        assert!(expires >= now + Duration::days(3650), "{expires}");
    }

    #[test]
    fn cookie_expiry_without_timeouts_is_relative_to_given_time() {
        let now = Utc::now();
        let session = session(Duration::days(400), Duration::days(300), now);
        let config = Config::default()
            .with_idle_timeout(None)
            .with_absolute_timeout(None);
        let then = now - Duration::days(100);
        assert_eq!(
            cookie_expires_at(then, &config, &session),
            Some(then + Duration::days(COOKIE_EXPIRY_DAYS_WITHOUT_TIMEOUTS))
        );
        assert_eq!(
            cookie_expires_at(then, &config.with_persistent_cookies(false), &session),
            None
        );
    }

    #[test]
    fn persistent_cookies_follow_session_deadline() {
        let now = Utc::now();
        let session = session(Duration::hours(2), Duration::hours(1), now);
        for config in timeout_configs() {
            if config.idle_timeout().is_some() || config.absolute_timeout().is_some() {
                assert_eq!(
                    cookie_expires(&config, &session),
                    next_expires(&config, &session)
                );
            }
        }
    }
}
