//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset variables fall back to
//! defaults; set-but-invalid variables are a [`ConfigError`].

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Where commands are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEndpoint {
    /// In-process broadcast bus.
    Local,
    /// Rosbridge v2 server reachable over WebSocket.
    Rosbridge(String),
}

impl FromStr for BusEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            Ok(Self::Local)
        } else if s.starts_with("ws://") || s.starts_with("wss://") {
            Ok(Self::Rosbridge(s.to_string()))
        } else {
            Err("expected `local` or a ws:// / wss:// URL".to_string())
        }
    }
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to bind the HTTP/WebSocket server to.
    pub listen_addr: SocketAddr,

    /// Publish frequency of the rate limiter, in Hz. Always > 0.
    pub rate_limit_hz: f64,

    /// Fail-safe deadline after the last valid command.
    pub watchdog_timeout: Duration,

    /// Deadline for the first command after admission.
    pub handshake_timeout: Duration,

    /// Largest accepted component magnitude. Values in
    /// `(1.0, tolerance]` are clamped, values beyond are rejected.
    pub sequence_tolerance: f64,

    /// Consecutive decode errors before the session is closed.
    pub max_decode_errors: u32,

    /// Middleware bus target.
    pub bus_endpoint: BusEndpoint,

    /// Message type advertised to rosbridge.
    pub bus_message_type: String,

    /// Capacity of the in-process bus broadcast channel.
    pub local_bus_capacity: usize,

    /// Accepted operator tokens. Empty means every handshake is refused.
    pub operator_tokens: HashSet<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            rate_limit_hz: 20.0,
            watchdog_timeout: Duration::from_millis(300),
            handshake_timeout: Duration::from_millis(5000),
            sequence_tolerance: 1.1,
            max_decode_errors: 10,
            bus_endpoint: BusEndpoint::Local,
            bus_message_type: "teleop_msgs/Joystick".to_string(),
            local_bus_capacity: 1024,
            operator_tokens: HashSet::new(),
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value
    /// that cannot be parsed or violates its constraint.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let watchdog_ms: u64 = parse_env("WATCHDOG_TIMEOUT_MS", 300)?;
        let handshake_ms: u64 = parse_env("HANDSHAKE_TIMEOUT_MS", 5000)?;
        let operator_tokens = std::env::var("OPERATOR_TOKENS")
            .map(|raw| parse_tokens(&raw))
            .unwrap_or_default();

        let config = Self {
            listen_addr: parse_env("LISTEN_ADDR", defaults.listen_addr)?,
            rate_limit_hz: parse_env("RATE_LIMIT_HZ", defaults.rate_limit_hz)?,
            watchdog_timeout: Duration::from_millis(watchdog_ms),
            handshake_timeout: Duration::from_millis(handshake_ms),
            sequence_tolerance: parse_env("SEQUENCE_TOLERANCE", defaults.sequence_tolerance)?,
            max_decode_errors: parse_env("MAX_DECODE_ERRORS", defaults.max_decode_errors)?,
            bus_endpoint: parse_env("BUS_ENDPOINT", defaults.bus_endpoint)?,
            bus_message_type: std::env::var("BUS_MESSAGE_TYPE")
                .unwrap_or(defaults.bus_message_type),
            local_bus_capacity: parse_env("LOCAL_BUS_CAPACITY", defaults.local_bus_capacity)?,
            operator_tokens,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints that parsing alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending
    /// variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if period_from_hz(self.rate_limit_hz).is_none() {
            return Err(invalid(
                "RATE_LIMIT_HZ",
                self.rate_limit_hz,
                "publish period must be between 1 ms and 1 h",
            ));
        }
        if !(self.sequence_tolerance.is_finite() && self.sequence_tolerance >= 1.0) {
            return Err(invalid(
                "SEQUENCE_TOLERANCE",
                self.sequence_tolerance,
                "must be >= 1.0",
            ));
        }
        if self.watchdog_timeout.is_zero() {
            return Err(invalid("WATCHDOG_TIMEOUT_MS", 0, "must be > 0"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(invalid("HANDSHAKE_TIMEOUT_MS", 0, "must be > 0"));
        }
        Ok(())
    }

    /// Publish period derived from [`Self::rate_limit_hz`].
    ///
    /// Always within [`MIN_PUBLISH_PERIOD`]..=[`MAX_PUBLISH_PERIOD`]; a rate
    /// that [`Self::validate`] would reject is clamped to the nearer bound.
    #[must_use]
    pub fn publish_period(&self) -> Duration {
        period_from_hz(self.rate_limit_hz).unwrap_or(if self.rate_limit_hz > 1.0 {
            MIN_PUBLISH_PERIOD
        } else {
            MAX_PUBLISH_PERIOD
        })
    }
}

/// Shortest accepted publish period (1 kHz).
pub const MIN_PUBLISH_PERIOD: Duration = Duration::from_millis(1);

/// Longest accepted publish period.
pub const MAX_PUBLISH_PERIOD: Duration = Duration::from_secs(3600);

/// `1 / hz` as a [`Duration`], or `None` if it is not representable or
/// falls outside the accepted period bounds.
fn period_from_hz(hz: f64) -> Option<Duration> {
    if !(hz.is_finite() && hz > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / hz)
        .ok()
        .filter(|period| (MIN_PUBLISH_PERIOD..=MAX_PUBLISH_PERIOD).contains(period))
}

/// Splits a comma-separated token list, ignoring blanks.
fn parse_tokens(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses an environment variable as `T`, returning `default` when unset.
fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_period_is_fifty_ms() {
        assert_eq!(
            BridgeConfig::default().publish_period(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn default_config_is_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn extreme_rates_are_rejected_not_panicking() {
        for hz in [1e10, 1e-20, f64::INFINITY, f64::NAN, 0.0, -5.0] {
            let config = BridgeConfig {
                rate_limit_hz: hz,
                ..BridgeConfig::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Invalid { key: "RATE_LIMIT_HZ", .. })
                ),
                "{hz} accepted"
            );
            let period = config.publish_period();
            assert!(period >= MIN_PUBLISH_PERIOD && period <= MAX_PUBLISH_PERIOD);
        }
    }

    #[test]
    fn huge_rate_clamps_to_shortest_period() {
        let config = BridgeConfig {
            rate_limit_hz: 1e10,
            ..BridgeConfig::default()
        };
        assert_eq!(config.publish_period(), MIN_PUBLISH_PERIOD);
    }

    #[test]
    fn rate_range_ends_are_accepted() {
        for hz in [1000.0, 0.001] {
            let config = BridgeConfig {
                rate_limit_hz: hz,
                ..BridgeConfig::default()
            };
            assert!(config.validate().is_ok(), "{hz} rejected");
        }
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let no_handshake = BridgeConfig {
            handshake_timeout: Duration::ZERO,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            no_handshake.validate(),
            Err(ConfigError::Invalid { key: "HANDSHAKE_TIMEOUT_MS", .. })
        ));
        let no_watchdog = BridgeConfig {
            watchdog_timeout: Duration::ZERO,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            no_watchdog.validate(),
            Err(ConfigError::Invalid { key: "WATCHDOG_TIMEOUT_MS", .. })
        ));
    }

    #[test]
    fn bus_endpoint_parsing() {
        assert_eq!("local".parse(), Ok(BusEndpoint::Local));
        assert_eq!(
            "ws://localhost:9090".parse(),
            Ok(BusEndpoint::Rosbridge("ws://localhost:9090".to_string()))
        );
        assert!("tcp://localhost:9090".parse::<BusEndpoint>().is_err());
    }

    #[test]
    fn tokens_are_trimmed_and_blank_dropped() {
        let tokens = parse_tokens(" alpha, beta ,,");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("alpha"));
        assert!(tokens.contains("beta"));
    }
}
