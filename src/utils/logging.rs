//! Log level parsing.
//!
//! Levels are given with the classic names (CRITICAL, ERROR, WARNING, INFO,
//! DEBUG) and mapped onto `log` level filters.

use log::LevelFilter;

use crate::config::ConfigurationError;

/// Level used when none is given on the command line
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Parse a log level name, case-insensitively.
///
/// - `CRITICAL` and `ERROR` -> `Error`
/// - `WARNING` -> `Warn`
/// - `INFO` -> `Info`
/// - `DEBUG` -> `Debug`
/// - `NOTSET` -> `Off`
///
/// # Examples
/// ```
/// use fattree_builder::utils::logging::parse_log_level;
/// use log::LevelFilter;
///
/// assert_eq!(parse_log_level("warning").unwrap(), LevelFilter::Warn);
/// assert!(parse_log_level("verbose").is_err());
/// ```
pub fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigurationError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "ERROR" => Ok(LevelFilter::Error),
        "WARNING" => Ok(LevelFilter::Warn),
        "INFO" => Ok(LevelFilter::Info),
        "DEBUG" => Ok(LevelFilter::Debug),
        "NOTSET" => Ok(LevelFilter::Off),
        _ => Err(ConfigurationError::InvalidLogLevel(level.to_string())),
    }
}

/// Level filter for the console logger; `quiet` wins over any level
pub fn log_filter(level: &str, quiet: bool) -> Result<LevelFilter, ConfigurationError> {
    if quiet {
        return Ok(LevelFilter::Off);
    }
    parse_log_level(level)
}
