//! Gateway configuration
//!
//! Configuration is environment-driven with CLI overrides. Every knob has
//! a sensible default so a bare `tether` invocation works out of the box.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Default listen port
pub const DEFAULT_PORT: u16 = 4800;

/// Default transport heartbeat interval in seconds
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Heartbeat intervals a connection may miss before it is considered dead.
/// Idle-but-responsive connections survive; only unresponsive ones close.
const HEARTBEAT_GRACE_INTERVALS: u32 = 3;

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Address to bind the HTTP/WebSocket listener on
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path to the SQLite database
    pub db_path: PathBuf,

    /// Secret used to sign session tokens. Generated per-process when
    /// unset, which invalidates outstanding sessions on restart.
    pub session_secret: SecretString,

    /// Transport-level heartbeat interval
    pub heartbeat_interval: Duration,

    /// Silence window after which a connection is force-closed
    pub heartbeat_timeout: Duration,

    /// Requests per minute for the unauthenticated auth endpoints,
    /// `None` disables rate limiting (development mode)
    pub rate_limit_rpm: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            db_path: default_db_path(),
            session_secret: generate_secret(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            heartbeat_timeout: Duration::from_secs(
                DEFAULT_HEARTBEAT_SECS * u64::from(HEARTBEAT_GRACE_INTERVALS),
            ),
            rate_limit_rpm: None,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TETHER_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("TETHER_PORT") {
            config.port = port;
        }
        if let Ok(path) = std::env::var("TETHER_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(secret) = std::env::var("TETHER_SESSION_SECRET") {
            if !secret.is_empty() {
                config.session_secret = SecretString::from(secret);
            }
        }
        if let Some(secs) = env_parse::<u64>("TETHER_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs);
            config.heartbeat_timeout =
                Duration::from_secs(secs * u64::from(HEARTBEAT_GRACE_INTERVALS));
        }
        if let Some(rpm) = env_parse("TETHER_RATE_LIMIT_RPM") {
            config.rate_limit_rpm = Some(rpm);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Default database path, `~/.local/share/omni/tether/gateway.db`
fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/omni/tether/gateway.db"),
        |d| d.data_dir().join("omni").join("tether").join("gateway.db"),
    )
}

/// Generate a random per-process session secret
fn generate_secret() -> SecretString {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    SecretString::from(hex::encode(bytes))
}
