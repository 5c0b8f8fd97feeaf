//! Agent Client Protocol adapter bridging an ACP-compliant editor to the
//! `cursor-agent` CLI over JSON-RPC 2.0 on stdio.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod slash;
pub mod tools;
pub mod transport;

pub use cli::Cli;
pub use config::AppConfig;
pub use dispatch::Dispatcher;
pub use error::{AgentError, Result};
