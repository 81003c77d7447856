//! Load config from file and environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lantalk_core::protocol::{self, MAX_CHUNK_PAYLOAD};
use lantalk_core::RetryPolicy;
use serde::Deserialize;

/// Node configuration. File: ~/.config/lantalk/config.toml or /etc/lantalk/config.toml.
/// Env overrides: NODE_NAME / LANTALK_NODE_NAME, LANTALK_PORT, LANTALK_BROADCAST_IP,
/// LANTALK_DOWNLOAD_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Identity announced in heartbeats (default: $NODE_NAME, else $HOSTNAME).
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Protocol UDP port (default 5007).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_ip")]
    pub bind_ip: IpAddr,
    /// Heartbeat destination (default 255.255.255.255).
    #[serde(default = "default_broadcast_ip")]
    pub broadcast_ip: IpAddr,
    /// Heartbeat destination port; `port` when unset.
    #[serde(default)]
    pub broadcast_port: Option<u16>,
    /// Address announced in heartbeats; looked up from the routing table when unset.
    #[serde(default)]
    pub advertise_ip: Option<IpAddr>,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// File block size per CHUNK frame (default 1024).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Where received files are written.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Inbound transfers idle this long are dropped; 0 keeps them forever.
    #[serde(default = "default_session_idle_timeout_ms")]
    pub session_idle_timeout_ms: u64,
    /// Peers silent this long are forgotten; 0 keeps them forever.
    #[serde(default)]
    pub peer_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "lantalk".to_string())
}
fn default_port() -> u16 {
    protocol::DEFAULT_PORT
}
fn default_bind_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_broadcast_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}
fn default_heartbeat_interval_ms() -> u64 {
    protocol::DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64
}
fn default_reply_timeout_ms() -> u64 {
    protocol::DEFAULT_REPLY_TIMEOUT.as_millis() as u64
}
fn default_chunk_size() -> usize {
    protocol::DEFAULT_CHUNK_SIZE
}
fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_session_idle_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            port: default_port(),
            bind_ip: default_bind_ip(),
            broadcast_ip: default_broadcast_ip(),
            broadcast_port: None,
            advertise_ip: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            chunk_size: default_chunk_size(),
            download_dir: default_download_dir(),
            session_idle_timeout_ms: default_session_idle_timeout_ms(),
            peer_timeout_ms: 0,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load config: defaults, then `explicit` (or the first standard config file present),
    /// then env vars. An explicit path must exist and parse.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let mut c = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            },
        };
        c.apply_env(|key| std::env::var(key).ok());
        c.validate()?;
        Ok(c)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides; unparsable values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("LANTALK_NODE_NAME").or_else(|| var("NODE_NAME")) {
            if !name.trim().is_empty() {
                self.node_name = name.trim().to_string();
            }
        }
        if let Some(p) = var("LANTALK_PORT").and_then(|s| s.parse::<u16>().ok()) {
            self.port = p;
        }
        if let Some(ip) = var("LANTALK_BROADCAST_IP").and_then(|s| s.parse::<IpAddr>().ok()) {
            self.broadcast_ip = ip;
        }
        if let Some(dir) = var("LANTALK_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_name.is_empty() || self.node_name.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "node_name {:?} must be a single non-empty word",
                self.node_name
            )));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_PAYLOAD {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_PAYLOAD}"
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_ms must be > 0".into()));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reply_timeout_ms must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.session_idle_timeout_ms)
    }

    pub fn peer_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.peer_timeout_ms)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    pub fn heartbeat_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_ip, self.broadcast_port.unwrap_or(self.port))
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/lantalk/config.toml"));
    }
    out.push(PathBuf::from("/etc/lantalk/config.toml"));
    out
}
