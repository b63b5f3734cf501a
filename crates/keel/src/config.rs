//! Server configuration.
//!
//! A [`ServerConfig`] is an explicitly constructed, immutable value: it
//! is deserialized (or built in code) once at startup and passed by
//! reference into the acceptor, the per-connection wiring, and the
//! heartbeat supervisor. Nothing here is a process-wide global.
//!
//! TLS material and database credentials are opaque inputs — they are
//! carried for the collaborators that consume them (a TLS acceptor, an
//! [`Authenticator`](keel_session::Authenticator) backed by a database)
//! and never interpreted by the server core itself.

use std::path::Path;
use std::time::Duration;

use keel_heartbeat::HeartbeatConfig;
use serde::Deserialize;

use crate::KeelError;

/// How a connection's write queue is treated on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMode {
    /// Drain queued frames before releasing the socket. A close frame
    /// already queued (e.g. a final `LOGIN_FAIL`) still reaches the peer.
    Graceful,
    /// Abort the writer immediately; queued frames are dropped.
    Abortive,
}

/// Connection settings for the database behind the authenticator.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            name: "game".to_string(),
            user: "game".to_string(),
            password: String::new(),
        }
    }
}

/// Complete server configuration surface.
///
/// Every field has a serde default so a partial JSON file only needs to
/// name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the game acceptor listens on.
    pub game_listen_port: u16,
    /// Port reserved for the admin surface.
    pub admin_listen_port: u16,
    /// Listen backlog applied when binding.
    pub listen_backlog: u32,
    /// Whether `TCP_NODELAY` is set on accepted streams.
    pub tcp_no_delay: bool,
    /// Path to the TLS certificate chain. Opaque; consumed by a TLS
    /// acceptor when one is wired in.
    pub certificate_file: String,
    /// Path to the TLS private key. Opaque.
    pub private_key_file: String,
    /// Shared secret for admin authentication. Opaque.
    pub auth_key: String,
    /// Database behind the authenticator.
    pub db: DbConfig,
    /// Interval between liveness probes, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Unacknowledged probes tolerated before the connection is closed.
    pub heartbeat_retries: u32,
    /// Failed logins tolerated before the connection is closed.
    pub max_login_attempts: u32,
    /// Per-message body ceiling in bytes. Frames declaring more are
    /// rejected before the body is buffered.
    pub max_body_size: usize,
    /// Write-queue treatment on close.
    pub close_mode: CloseMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            game_listen_port: 9190,
            admin_listen_port: 9191,
            listen_backlog: 1024,
            tcp_no_delay: true,
            certificate_file: String::new(),
            private_key_file: String::new(),
            auth_key: String::new(),
            db: DbConfig::default(),
            heartbeat_interval_ms: 5_000,
            heartbeat_retries: 3,
            max_login_attempts: 3,
            max_body_size: u16::MAX as usize,
            close_mode: CloseMode::Graceful,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let bytes = std::fs::read(path)?;
        let config = serde_json::from_slice(&bytes)?;
        Ok(config)
    }

    /// The heartbeat settings in the supervisor's vocabulary. The
    /// default first-probe jitter is kept so connections accepted at the
    /// same instant do not probe in lockstep.
    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(self.heartbeat_interval_ms),
            retries: self.heartbeat_retries,
            ..HeartbeatConfig::default()
        }
    }
}
