//! HTTP API module.
//!
//! The HTTP surface the dashboard talks to, plus the log broadcaster the
//! pipeline reports through.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::start_server;
pub use types::*;
