//! Input sanitization.
//!
//! Lines typed by a peer are cleaned before they reach the command
//! resolver, so raw control bytes can never be reflected back into any
//! session's output stream.

mod sanitizer;

pub use sanitizer::InputSanitizer;
