//! Command-line interface for session-broadcast.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Command-line arguments.
#[derive(Debug, Clone)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Cache directory (overrides config file).
    pub cache_dir: Option<PathBuf>,
    /// Credential file to import into the cache, then exit.
    pub import: Option<PathBuf>,
    /// Enable debug logging.
    pub debug: bool,
    /// Disable live server queries.
    pub no_query: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: Some(PathBuf::from(DEFAULT_CONFIG_FILE)),
            cache_dir: None,
            import: None,
            debug: false,
            no_query: false,
            log_level: None,
            version: false,
            help: false,
        }
    }
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
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('C') | Long("cache-dir") => {
                result.cache_dir = Some(parser.value()?.parse()?);
            }
            Long("import") => {
                result.import = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("debug") => {
                result.debug = true;
            }
            Long("no-query") => {
                result.no_query = true;
            }
            Short('l') | Long("log-level") => {
                let value: String = parser.value()?.parse()?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidValue("log-level", value));
                }
                result.log_level = Some(value);
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
        r#"session-broadcast {version}
Advertise a game server on a remote session directory

USAGE:
    session-broadcast [OPTIONS]

OPTIONS:
    -c, --config <FILE>      Path to configuration file (JSON) [default: config.json]
    -C, --cache-dir <DIR>    Directory holding the cached credential
        --import <FILE>      Import a credential JSON file into the cache and exit
    -d, --debug              Enable debug logging
        --no-query           Do not query the server for live status
    -l, --log-level <LVL>    Log level (error, warn, info, debug, trace)
    -h, --help               Print help
    -V, --version            Print version

ENVIRONMENT VARIABLES:
    SESSION_BROADCAST_IP         Server address (overrides config)
    SESSION_BROADCAST_PORT       Server port (overrides config)
    SESSION_BROADCAST_WEBHOOK    Notification webhook URL (enables notifications)
    SESSION_BROADCAST_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                     Alternative log level setting

EXAMPLES:
    # Start with ./config.json (created with defaults if missing)
    session-broadcast

    # Import a credential obtained from a sign-in tool
    session-broadcast --import ./credential.json

    # Static advertisement only, verbose
    session-broadcast --no-query -d
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-broadcast {}", env!("CARGO_PKG_VERSION"));
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
