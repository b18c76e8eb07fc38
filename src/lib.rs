//! # ssh-sandbox
//!
//! Sandboxed SSH server with a fixed command set.
//!
//! Every connection gets an interactive session that never touches a real
//! shell: lines typed by the peer are sanitized and resolved against a small
//! allow-list of built-in commands. The server supervises all sessions and
//! shuts down gracefully, giving each one a bounded amount of time to say
//! goodbye before it is terminated.
//!
//! ## Features
//!
//! - **No shell access**: input is resolved, never executed
//! - **Input sanitization**: escape sequences and control bytes are stripped
//! - **Session lifecycle**: explicit state machine per connection
//! - **Graceful shutdown**: SIGINT/SIGTERM drain sessions up to a deadline
//!
//! ## Quick Start
//!
//! ```no_run
//! use ssh_sandbox::server::{self, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> ssh_sandbox::Result<()> {
//!     ssh_sandbox::logging::init_with_level("info").ok();
//!
//!     let config = ServerConfig::default().with_host_key("id_ed25519");
//!     let report = server::run(config).await?;
//!
//!     println!("{} sessions closed, {} forced", report.completed, report.forced);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod server;
pub mod session;
pub mod ssh;

// Re-export commonly used types
pub use commands::resolve;
pub use config::{Config, ConfigError};
pub use error::{Result, SandboxError};
pub use input::InputSanitizer;
pub use server::{ServerConfig, Shutdown, ShutdownReport, Supervisor, Transport};
pub use session::{SessionEnd, SessionHandler, SessionId, SessionReport, SessionState};
pub use ssh::SshTransport;
