//! LanTalk node: UDP peer discovery, text messages and verified file transfer on a LAN.

pub mod config;
pub mod console;
pub mod error;
mod exchange;
pub mod net;
mod node;
pub mod pending;
pub mod transfer;

pub use config::{Config, ConfigError};
pub use error::NodeError;
pub use node::{Node, NodeEvent};
pub use transfer::TransferReport;
