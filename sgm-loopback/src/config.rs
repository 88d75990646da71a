//! Configuration for the loopback simulation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sgm_core::{CONTROL_CHANNEL, ClientConfig, PeerId, Result, ServerConfig, SgmError};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// The listening role.
    pub server: ServerConfig,
    /// The connecting roles.
    pub clients: ClientsConfig,
    /// Tick schedule.
    pub simulation: SimulationConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Connecting roles. One client is created per name, with peer ids
/// counting up from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub names: Vec<String>,
    /// Names whose tickets the auth service rejects after validation starts.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Identity of the server endpoint.
    pub server_id: u64,
    /// Number of poll rounds before the clients leave.
    pub ticks: u32,
    /// Delay between rounds in milliseconds. 0 runs flat out.
    pub tick_interval_ms: u64,
    /// Channel used for application traffic.
    pub data_channel: i32,
    /// Round in which every connected client sends a chat line.
    pub chat_tick: u32,
    /// Round in which the server broadcasts a spawn.
    pub spawn_tick: u32,
    /// Whether the server reports itself as secure.
    pub secure: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            names: vec!["Nova".into(), "Ash".into(), "Quill".into()],
            rejected: Vec::new(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            server_id: 0x0110_0001_0000_0001,
            ticks: 10,
            tick_interval_ms: 50,
            data_channel: 1,
            chat_tick: 3,
            spawn_tick: 5,
            secure: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl LoopbackConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        if self.simulation.data_channel == CONTROL_CHANNEL {
            return Err(SgmError::Config("data_channel 0 is reserved for control".into()));
        }
        if !self.server_id().is_valid() {
            return Err(SgmError::Config("server_id must be non-zero".into()));
        }
        if self.simulation.server_id <= self.clients.names.len() as u64 {
            return Err(SgmError::Config("server_id collides with a client id".into()));
        }
        if self.clients.names.iter().any(String::is_empty) {
            return Err(SgmError::Config("client names must not be empty".into()));
        }
        Ok(())
    }

    pub fn server_id(&self) -> PeerId {
        PeerId(self.simulation.server_id)
    }

    /// Peer id and role settings for each configured client.
    pub fn client_configs(&self) -> Vec<(PeerId, ClientConfig)> {
        self.clients
            .names
            .iter()
            .zip(1u64..)
            .map(|(name, id)| {
                let config = ClientConfig {
                    display_name: name.clone(),
                };
                (PeerId(id), config)
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────
