//! Document and server state management.

mod config;
mod document;

pub use config::ServerConfig;
pub use document::DocumentState;
