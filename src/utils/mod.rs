//! Shared utilities: log level parsing and topology invariant checks.

pub mod logging;
pub mod validation;

pub use logging::{log_filter, parse_log_level};
pub use validation::{validate_guids, validate_links, InvariantViolation};
