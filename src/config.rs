use chrono::Duration;
use serde::{Deserialize, Serialize};

/// The default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "JSESSIONID";
/// The default session data key holding the auth id.
pub const DEFAULT_AUTH_KEY: &str = "_ID";

/// The policy of a [`SessionStore`](crate::SessionStore).
///
/// This is owned by the hosting application and read-only while requests are processed.
/// Every timeout may be unset, meaning that sessions never expire along that axis.
///
/// # Example
///
/// ```rust
/// # use server_session::Config;
/// let config = Config::default()
///     .with_cookie_name("SID")
///     .with_idle_timeout(Some(chrono::Duration::hours(2)))
///     .with_absolute_timeout(None);
/// assert_eq!(config.cookie_name(), "SID");
/// assert_eq!(config.idle_timeout(), Some(chrono::Duration::hours(2)));
/// assert_eq!(config.absolute_timeout(), None);
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    cookie_name: String,
    auth_key: String,
    #[serde(with = "optional_seconds")]
    idle_timeout: Option<Duration>,
    #[serde(with = "optional_seconds")]
    absolute_timeout: Option<Duration>,
    #[serde(with = "optional_seconds")]
    timeout_resolution: Option<Duration>,
    persistent_cookies: bool,
    http_only_cookies: bool,
    secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            auth_key: DEFAULT_AUTH_KEY.to_owned(),
            idle_timeout: Some(Duration::days(7)),
            absolute_timeout: Some(Duration::days(60)),
            timeout_resolution: Some(Duration::minutes(10)),
            persistent_cookies: true,
            http_only_cookies: true,
            secure_cookies: false,
        }
    }
}

impl Config {
    /// Set the name under which the session id is transported.
    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    /// Set the reserved session data key that holds the auth id.
    pub fn with_auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    /// Set the maximum time a session may stay unused.
    ///
    /// The timeout must not be negative, or every session expires as soon as it is created.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the maximum age of a session, regardless of use.
    ///
    /// The timeout must not be negative, or every session expires as soon as it is created.
    pub fn with_absolute_timeout(mut self, absolute_timeout: Option<Duration>) -> Self {
        self.absolute_timeout = absolute_timeout;
        self
    }

    /// Set the granularity at which `accessed_at` is refreshed.
    ///
    /// A session whose data did not change is only written back if its last access is
    /// at least this long ago. `None` writes back on every save.
    /// The resolution must not be negative.
    pub fn with_timeout_resolution(mut self, timeout_resolution: Option<Duration>) -> Self {
        self.timeout_resolution = timeout_resolution;
        self
    }

    /// Set whether the session cookie carries an explicit expiry.
    pub fn with_persistent_cookies(mut self, persistent_cookies: bool) -> Self {
        self.persistent_cookies = persistent_cookies;
        self
    }

    /// Set the `HttpOnly` flag of the session cookie.
    pub fn with_http_only_cookies(mut self, http_only_cookies: bool) -> Self {
        self.http_only_cookies = http_only_cookies;
        self
    }

    /// Set the `Secure` flag of the session cookie.
    pub fn with_secure_cookies(mut self, secure_cookies: bool) -> Self {
        self.secure_cookies = secure_cookies;
        self
    }

    /// The name under which the session id is transported.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// The reserved session data key that holds the auth id.
    pub fn auth_key(&self) -> &str {
        &self.auth_key
    }

    /// The maximum time a session may stay unused.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// The maximum age of a session.
    pub fn absolute_timeout(&self) -> Option<Duration> {
        self.absolute_timeout
    }

    /// The granularity at which `accessed_at` is refreshed.
    pub fn timeout_resolution(&self) -> Option<Duration> {
        self.timeout_resolution
    }

    /// Whether the session cookie carries an explicit expiry.
    pub fn persistent_cookies(&self) -> bool {
        self.persistent_cookies
    }

    /// Whether the session cookie is `HttpOnly`.
    pub fn http_only_cookies(&self) -> bool {
        self.http_only_cookies
    }

    /// Whether the session cookie is `Secure`.
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

/// (De)serializes an optional duration as a number of whole seconds.
/// Negative numbers are rejected.
mod optional_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&duration.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<i64>::deserialize(deserializer)?
            .map(|seconds| {
                if seconds < 0 {
                    return Err(serde::de::Error::custom(format!(
                        "timeout of {seconds}s is negative"
                    )));
                }
                Duration::try_seconds(seconds).ok_or_else(|| {
                    serde::de::Error::custom(format!("timeout of {seconds}s is out of range"))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.cookie_name(), "JSESSIONID");
        assert_eq!(config.auth_key(), "_ID");
        assert_eq!(config.idle_timeout(), Some(Duration::days(7)));
        assert_eq!(config.absolute_timeout(), Some(Duration::days(60)));
        assert!(config.persistent_cookies());
        assert!(config.http_only_cookies());
        assert!(!config.secure_cookies());
    }

    #[test]
    fn deserialize_partial() {
        let config: Config = serde_json::from_str(
            r#"{"cookie_name": "SID", "idle_timeout": 3600, "absolute_timeout": null}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            Config::default()
                .with_cookie_name("SID")
                .with_idle_timeout(Some(Duration::hours(1)))
                .with_absolute_timeout(None)
        );
    }

    #[test]
    fn serialize_roundtrip() {
        let config = Config::default().with_timeout_resolution(None);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""idle_timeout":604800"#), "{json}");
        assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
    }

    #[test]
    fn deserialize_rejects_negative_timeouts() {
        for field in ["idle_timeout", "absolute_timeout", "timeout_resolution"] {
            let json = format!(r#"{{"{field}": -5}}"#);
            let error = serde_json::from_str::<Config>(&json).unwrap_err();
            assert!(error.to_string().contains("negative"), "{error}");
        }
        let config: Config = serde_json::from_str(r#"{"idle_timeout": 0}"#).unwrap();
        assert_eq!(config.idle_timeout(), Some(Duration::zero()));
    }
}
