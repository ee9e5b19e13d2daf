// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline configuration.
//!
//! Supports programmatic construction, TOML files, and the flat string
//! settings map handed over by a module host.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default protocol collaborator name.
pub const DEFAULT_PROTOCOL_MODULE: &str = "Protocol";
/// Default packet pool collaborator name.
pub const DEFAULT_PACKETPOOL_MODULE: &str = "PacketPool";
/// Default bounded queue capacity.
pub const DEFAULT_PACKETBUFFER_SIZE: usize = 128;
/// Default UDP port.
pub const DEFAULT_SOCKET_PORT: u16 = 49300;
/// Default receive timeout (milliseconds).
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 1500;
/// Largest accepted queue capacity (slots are allocated up front).
pub const MAX_PACKETBUFFER_SIZE: usize = 1 << 20;

/// Key read when `socket-timeout-ms` is absent.
const LEGACY_SOCKET_TIMEOUT_KEY: &str = "socket-timeout";

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Name of the protocol collaborator.
    #[serde(default = "default_protocol_module")]
    pub protocol_module_name: String,

    /// Name of the packet pool collaborator.
    #[serde(default = "default_packetpool_module")]
    pub packetpool_module_name: String,

    /// Bounded queue capacity.
    #[serde(default = "default_packetbuffer_size")]
    pub packetbuffer_size: usize,

    /// UDP port to bind (0 = ephemeral).
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,

    /// Receive timeout in milliseconds.
    #[serde(default = "default_socket_timeout_ms", alias = "socket-timeout")]
    pub socket_timeout_ms: u64,

    /// Enqueue budget in milliseconds; falls back to `socket_timeout_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueue_timeout_ms: Option<u64>,

    /// Local address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Recycle queued packets at stop instead of dropping them.
    #[serde(default)]
    pub recycle_on_stop: bool,

    /// Fail start when a collaborator cannot be resolved.
    #[serde(default = "default_true")]
    pub require_collaborators: bool,
}

fn default_protocol_module() -> String {
    DEFAULT_PROTOCOL_MODULE.to_string()
}

fn default_packetpool_module() -> String {
    DEFAULT_PACKETPOOL_MODULE.to_string()
}

fn default_packetbuffer_size() -> usize {
    DEFAULT_PACKETBUFFER_SIZE
}

fn default_socket_port() -> u16 {
    DEFAULT_SOCKET_PORT
}

fn default_socket_timeout_ms() -> u64 {
    DEFAULT_SOCKET_TIMEOUT_MS
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            protocol_module_name: default_protocol_module(),
            packetpool_module_name: default_packetpool_module(),
            packetbuffer_size: DEFAULT_PACKETBUFFER_SIZE,
            socket_port: DEFAULT_SOCKET_PORT,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            enqueue_timeout_ms: None,
            bind_address: default_bind_address(),
            recycle_on_stop: false,
            require_collaborators: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML configuration.
    ///
    /// When both `socket-timeout-ms` and `socket-timeout` are present the
    /// newer key wins, as in [`from_settings`](Self::from_settings).
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = content.parse()?;
        if table.contains_key("socket-timeout-ms") {
            table.remove(LEGACY_SOCKET_TIMEOUT_KEY);
        }
        let config: Self = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from a host settings map.
    ///
    /// Unknown keys are ignored; recognized keys must parse.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = settings.get("protocol-module-name") {
            config.protocol_module_name = name.clone();
        }
        if let Some(name) = settings.get("packetpool-module-name") {
            config.packetpool_module_name = name.clone();
        }
        if let Some(value) = settings.get("packetbuffer-size") {
            config.packetbuffer_size = parse_setting("packetbuffer-size", value)?;
        }
        if let Some(value) = settings.get("socket-port") {
            config.socket_port = parse_setting("socket-port", value)?;
        }
        // The newer key wins when both are present.
        if let Some(value) = settings.get(LEGACY_SOCKET_TIMEOUT_KEY) {
            config.socket_timeout_ms = parse_setting(LEGACY_SOCKET_TIMEOUT_KEY, value)?;
        }
        if let Some(value) = settings.get("socket-timeout-ms") {
            config.socket_timeout_ms = parse_setting("socket-timeout-ms", value)?;
        }
        if let Some(value) = settings.get("enqueue-timeout-ms") {
            config.enqueue_timeout_ms = Some(parse_setting("enqueue-timeout-ms", value)?);
        }
        if let Some(value) = settings.get("bind-address") {
            config.bind_address = parse_setting("bind-address", value)?;
        }
        if let Some(value) = settings.get("recycle-on-stop") {
            config.recycle_on_stop = parse_setting("recycle-on-stop", value)?;
        }
        if let Some(value) = settings.get("require-collaborators") {
            config.require_collaborators = parse_setting("require-collaborators", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_module_name.is_empty() {
            return Err(ConfigError::Invalid("protocol-module-name is empty".into()));
        }
        if self.packetpool_module_name.is_empty() {
            return Err(ConfigError::Invalid(
                "packetpool-module-name is empty".into(),
            ));
        }
        if self.packetbuffer_size == 0 {
            return Err(ConfigError::Invalid(
                "packetbuffer-size must be at least 1".into(),
            ));
        }
        if self.packetbuffer_size > MAX_PACKETBUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "packetbuffer-size {} exceeds maximum {}",
                self.packetbuffer_size, MAX_PACKETBUFFER_SIZE
            )));
        }
        if self.socket_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "socket-timeout-ms must be greater than 0".into(),
            ));
        }
        if self.enqueue_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "enqueue-timeout-ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Receive timeout applied to the socket.
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Budget for a blocked enqueue before the packet is dropped.
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms.unwrap_or(self.socket_timeout_ms))
    }

    /// Address the socket binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.socket_port)
    }

    /// Set the bind address and port.
    pub fn bind(mut self, address: IpAddr, port: u16) -> Self {
        self.bind_address = address;
        self.socket_port = port;
        self
    }

    /// Set the bounded queue capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.packetbuffer_size = capacity;
        self
    }

    /// Set the receive timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout_ms = duration_ms(timeout);
        self
    }

    /// Decouple the enqueue budget from the receive timeout.
    pub fn enqueue_timeout_override(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Set collaborator names.
    pub fn collaborators(
        mut self,
        protocol: impl Into<String>,
        packet_pool: impl Into<String>,
    ) -> Self {
        self.protocol_module_name = protocol.into();
        self.packetpool_module_name = packet_pool.into();
        self
    }
}

fn duration_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{} = '{}': {}", key, value, e)))
}
