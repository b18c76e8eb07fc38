//! Command resolution.
//!
//! Maps one sanitized input line and the caller's principal to the text
//! written back to the session. Resolution is pure: no I/O, no shared state,
//! and every input has a defined output.
//!
//! # Example
//!
//! ```
//! use ssh_sandbox::commands::{resolve, HELP_TEXT};
//!
//! assert_eq!(resolve("whoami", "alice"), "alice\n");
//! assert_eq!(resolve("help", "alice"), HELP_TEXT);
//! assert_eq!(resolve("ls -la", "alice"), "command not found: ls\n");
//! assert_eq!(resolve("", "alice"), "");
//! ```

mod invocation;
mod resolver;

pub use invocation::{CommandKind, Invocation};
pub use resolver::{resolve, FASTFETCH_BANNER, FAREWELL, HELP_TEXT};
