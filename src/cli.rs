//! Command-line interface for ssh-sandbox.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Unset options fall through to the environment, the config file and
/// finally the defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to the host private key.
    pub host_key: Option<PathBuf>,
    /// Seconds sessions get to finish on shutdown.
    pub shutdown_timeout: Option<u64>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace) or filter directive.
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('k') | Long("host-key") => {
                result.host_key = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("shutdown-timeout") => {
                let value: String = parser.value()?.parse()?;
                result.shutdown_timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("shutdown-timeout", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"ssh-sandbox {version}
Sandboxed SSH command shell

USAGE:
    ssh-sandbox [OPTIONS]

OPTIONS:
    -H, --host <ADDR>              Host address to bind [default: 0.0.0.0]
    -p, --port <PORT>              Port to listen on [default: 2222]
    -k, --host-key <FILE>          Host private key [default: id_ed25519]
    -t, --shutdown-timeout <SECS>  Grace period for sessions on shutdown [default: 30]
    -c, --config <FILE>            Path to configuration file (JSON)
    -l, --log-level <LVL>          Log level (error, warn, info, debug, trace)
    -h, --help                     Print help
    -V, --version                  Print version

ENVIRONMENT VARIABLES:
    SSH_SANDBOX_HOST               Host address (overrides config)
    SSH_SANDBOX_PORT               Port number (overrides config)
    HOST_KEY_PATH                  Host key path (overrides config)
    SSH_SANDBOX_SHUTDOWN_TIMEOUT   Shutdown grace period in seconds
    SSH_SANDBOX_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                       Alternative log level setting

EXAMPLES:
    # Generate a host key and start with defaults (0.0.0.0:2222)
    ssh-keygen -t ed25519 -N '' -f id_ed25519
    ssh-sandbox

    # Local only, shorter shutdown grace period
    ssh-sandbox -H 127.0.0.1 -p 2022 -t 5

    # Connect
    ssh -p 2222 guest@localhost
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("ssh-sandbox {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
