//! Relay Configuration
//!
//! Where the relay lives and the timing the session layer honours.
//! None of the timing values are protocol facts; all of them can be tuned.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::core::room::RoomId;

/// Port the relay listens on.
pub const DEFAULT_RELAY_PORT: u16 = 8080;

/// Fixed delay before each automatic reconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Automatic reconnects allowed before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Minimum spacing between outbound sends, also the connect debounce window.
pub const DEFAULT_MESSAGE_THROTTLE: Duration = Duration::from_millis(3000);

/// Longest a single connection attempt may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay address and session timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Use `wss` instead of `ws`.
    pub secure: bool,
    /// Delay before each automatic reconnect.
    pub reconnect_delay: Duration,
    /// Automatic reconnects allowed after an unclean close.
    pub max_reconnect_attempts: u32,
    /// Minimum spacing between sends and between connect attempts.
    pub message_throttle: Duration,
    /// Longest a connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            secure: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            message_throttle: DEFAULT_MESSAGE_THROTTLE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("DURAK_RELAY_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = parse_var::<u16>(&lookup, "DURAK_RELAY_PORT") {
            config.port = port;
        }
        if let Some(secure) = lookup("DURAK_RELAY_SECURE") {
            config.secure = secure == "true" || secure == "1";
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DURAK_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "DURAK_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DURAK_MESSAGE_THROTTLE_MS") {
            config.message_throttle = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DURAK_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Mirror a page origin such as `https://cards.example.org:443/lobby`.
    ///
    /// The scheme picks `ws`/`wss` and the hostname becomes the relay host;
    /// the page's own port is ignored because the relay port is fixed.
    pub fn for_origin(origin: &str) -> Self {
        let (secure, rest) = match origin.split_once("://") {
            Some((scheme, rest)) => (scheme.eq_ignore_ascii_case("https"), rest),
            None => (false, origin),
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = match authority.strip_prefix('[') {
            // IPv6 literal keeps its brackets
            Some(v6) => v6.split(']').next().map(|h| format!("[{}]", h)),
            None => authority.split(':').next().map(str::to_string),
        };

        let mut config = Self { secure, ..Self::default() };
        if let Some(host) = host.filter(|h| !h.is_empty() && h != "[]") {
            config.host = host;
        }
        config
    }

    /// URL scheme for the relay socket.
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Relay socket URL for a room.
    pub fn relay_url(&self, room: &RoomId) -> String {
        format!("{}://{}:{}/ws?room={}", self.scheme(), self.host, self.port, room)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.message_throttle, Duration::from_millis(3000));
        assert!(!config.secure);
    }

    #[test]
    fn test_relay_url() {
        let room = RoomId::parse("q1w2e3r").unwrap();
        let mut config = RelayConfig { host: "relay.local".into(), ..Default::default() };
        assert_eq!(config.relay_url(&room), "ws://relay.local:8080/ws?room=q1w2e3r");

        config.secure = true;
        assert_eq!(config.relay_url(&room), "wss://relay.local:8080/ws?room=q1w2e3r");
    }

    #[test]
    fn test_for_origin_mirrors_scheme() {
        let config = RelayConfig::for_origin("https://cards.example.org:4443/lobby");
        assert!(config.secure);
        assert_eq!(config.host, "cards.example.org");
        assert_eq!(config.port, DEFAULT_RELAY_PORT);

        let config = RelayConfig::for_origin("http://192.168.1.20:3000");
        assert!(!config.secure);
        assert_eq!(config.host, "192.168.1.20");

        let config = RelayConfig::for_origin("http://[::1]:3000/");
        assert_eq!(config.host, "[::1]");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("DURAK_RELAY_HOST", "relay.example.org"),
            ("DURAK_RELAY_PORT", "9000"),
            ("DURAK_RELAY_SECURE", "1"),
            ("DURAK_RECONNECT_DELAY_MS", "500"),
            ("DURAK_MAX_RECONNECT_ATTEMPTS", "2"),
            ("DURAK_MESSAGE_THROTTLE_MS", "250"),
        ]));

        assert_eq!(config.host, "relay.example.org");
        assert_eq!(config.port, 9000);
        assert!(config.secure);
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.message_throttle, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("DURAK_RELAY_PORT", "eighty"),
            ("DURAK_MAX_RECONNECT_ATTEMPTS", "-1"),
        ]));
        assert_eq!(config, RelayConfig::default());
    }
}
