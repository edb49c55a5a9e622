//! Engine configuration.
//!
//! With the `serde` feature enabled every type here derives
//! `Serialize`/`Deserialize` and [`EngineConfig::from_toml_str`] is available.

use std::time::Duration;

use crate::capability::DEFAULT_CAPABILITIES;
use crate::error::{EngineError, Result};

/// Maximum accepted inbound line length, terminator included.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Default number of unacknowledged lines allowed in flight.
pub const DEFAULT_WINDOW_SIZE: u64 = 8;

/// Default interval between keepalive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(24);

/// What the writer does when the window stays full past the stall timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StallPolicy {
    /// Terminate the connection.
    #[default]
    Disconnect,
    /// Treat everything sent so far as acknowledged and keep going.
    Resume,
}

/// Flow-control and buffering parameters for the line transport.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransportConfig {
    /// Maximum outstanding lines, keepalive probe included. Minimum 2.
    pub window_size: u64,
    /// Interval between keepalive probes.
    pub keepalive_interval: Duration,
    /// How long a full window may wait on an outstanding probe.
    pub stall_timeout: Duration,
    /// Action taken once `stall_timeout` elapses.
    pub stall_policy: StallPolicy,
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
    /// Lines longer than this are discarded.
    pub max_line_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            keepalive_interval: KEEPALIVE_INTERVAL,
            stall_timeout: KEEPALIVE_INTERVAL * 3,
            stall_policy: StallPolicy::Disconnect,
            read_buffer_size: 8192,
            max_line_len: MAX_IRC_LINE_LEN,
        }
    }
}

/// SASL credentials.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SaslCredentials {
    /// Account name (authentication identity).
    pub account: String,
    /// Password. Not needed for EXTERNAL.
    pub password: Option<String>,
    /// Authorization identity, if different from the account.
    pub authzid: Option<String>,
    /// Realm override; the mechanism's default realm is accepted otherwise.
    pub realm: Option<String>,
}

/// Configuration for one engine instance.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Desired nickname.
    pub nickname: String,
    /// Username (ident).
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, if required.
    pub password: Option<String>,
    /// Character encoding label (`utf-8`, `iso-8859-1`, ...).
    pub encoding: String,
    /// Capabilities to request when offered.
    pub capabilities: Vec<String>,
    /// Version argument for `CAP LS`; `None` sends a bare `CAP LS`.
    pub cap_version: Option<u32>,
    /// SASL credentials. Without them `sasl` is never requested.
    pub sasl: Option<SaslCredentials>,
    /// Identify to NickServ when it asks and SASL did not log us in.
    pub nickserv: bool,
    /// Transport parameters.
    pub transport: TransportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nickname: "slirc".to_owned(),
            username: "slirc".to_owned(),
            realname: "slirc engine".to_owned(),
            password: None,
            encoding: "utf-8".to_owned(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| (*c).to_owned()).collect(),
            cap_version: Some(302),
            sasl: None,
            nickserv: true,
            transport: TransportConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.nickname.is_empty() || self.nickname.contains(' ') {
            return Err(EngineError::Config(format!(
                "invalid nickname {:?}",
                self.nickname
            )));
        }
        if self.username.is_empty() {
            return Err(EngineError::Config("username must not be empty".to_owned()));
        }
        if self.transport.window_size < 2 {
            return Err(EngineError::Config(format!(
                "window size must be at least 2, got {}",
                self.transport.window_size
            )));
        }
        if self.transport.keepalive_interval.is_zero() {
            return Err(EngineError::Config(
                "keepalive interval must be positive".to_owned(),
            ));
        }
        self.resolve_encoding()?;
        Ok(())
    }

    /// Resolve the encoding label.
    pub fn resolve_encoding(&self) -> Result<&'static encoding::Encoding> {
        encoding::Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| EngineError::UnknownEncoding(self.encoding.clone()))
    }

    /// Capabilities actually worth requesting given the rest of the config.
    pub fn desired_capabilities(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| self.sasl.is_some() || c.as_str() != "sasl")
            .cloned()
            .collect()
    }

    /// Load a configuration from TOML. Missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
