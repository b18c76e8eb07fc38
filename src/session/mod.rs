//! Session handling.
//!
//! One [`SessionHandler`] drives one connection: it frames input into lines,
//! sanitizes them, handles `exit` and `clear` itself, and hands everything
//! else to the command resolver. Sessions share no mutable state; the only
//! thing they observe from outside is the shutdown token.

mod handler;
mod id;
mod state;
pub mod terminal;

pub use handler::{
    SessionEnd, SessionHandler, SessionReport, CLEAR_SCREEN, SHUTDOWN_NOTICE, WELCOME,
};
pub use id::SessionId;
pub use state::SessionState;
pub use terminal::{LineReader, TerminalMode};
