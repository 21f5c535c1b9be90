//! Error types for session operations.
//!
//! Every failure is both returned and recorded as the session's
//! [`LastError`], so callers that only see a boolean outcome can still
//! display what went wrong.

use std::io;

use thiserror::Error;

use crate::engine::EngineError;

/// Fixed prefix of every recorded error text.
pub const ERROR_PREFIX: &str = "ntpq: ";

/// Upper bound on the recorded error text, in bytes.
pub const MAX_ERROR_TEXT: usize = 128;

/// Code reported for failures that did not come from the platform.
pub const ADAPTER_ERROR: i32 = -1;

/// Errors that can occur while creating, using, or destroying a session.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A session is already open
    #[error("session already open")]
    AlreadyOpen,

    /// No session is open
    #[error("session not open")]
    NotOpen,

    /// The capture buffer could not be allocated
    #[error("unable to allocate {requested} bytes for the capture buffer")]
    OutOfMemory { requested: usize },

    /// Empty command line
    #[error("missing arguments")]
    MissingArguments,

    #[error("unknown command `{keyword}'")]
    UnknownCommand { keyword: String },

    #[error("too few arguments for `{keyword}'")]
    TooFewArguments { keyword: String },

    #[error("invalid address `{value}'")]
    InvalidAddress { value: String },

    #[error("{reason}: `{index}'")]
    UnknownAssociation { index: String, reason: &'static str },

    #[error("invalid unsigned value `{value}'")]
    InvalidUnsignedValue { value: String },

    #[error("invalid signed value `{value}'")]
    InvalidSignedValue { value: String },

    #[error("invalid IP version `{value}', expected -4 or -6")]
    InvalidIpVersion { value: String },

    /// A running command re-entered an operation that needs the engine
    #[error("session busy running another command")]
    Busy,

    /// The command handler itself failed
    #[error("{keyword}: {source}")]
    EngineFailure {
        keyword: String,
        #[source]
        source: EngineError,
    },
}

impl QueryError {
    /// Numeric code: a platform errno where one applies, else [`ADAPTER_ERROR`].
    pub fn code(&self) -> i32 {
        match self {
            QueryError::AlreadyOpen => libc::EEXIST,
            QueryError::OutOfMemory { .. } => libc::ENOMEM,
            QueryError::EngineFailure { source, .. } => {
                source.os_error().unwrap_or(ADAPTER_ERROR)
            }
            _ => ADAPTER_ERROR,
        }
    }

    /// Stable identifier for logs and callers that match on strings.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::AlreadyOpen => "already_open",
            QueryError::NotOpen => "not_open",
            QueryError::OutOfMemory { .. } => "out_of_memory",
            QueryError::MissingArguments => "missing_arguments",
            QueryError::UnknownCommand { .. } => "unknown_command",
            QueryError::TooFewArguments { .. } => "too_few_arguments",
            QueryError::InvalidAddress { .. } => "invalid_address",
            QueryError::UnknownAssociation { .. } => "unknown_association",
            QueryError::InvalidUnsignedValue { .. } => "invalid_unsigned_value",
            QueryError::InvalidSignedValue { .. } => "invalid_signed_value",
            QueryError::InvalidIpVersion { .. } => "invalid_ip_version",
            QueryError::Busy => "busy",
            QueryError::EngineFailure { .. } => "engine_failure",
        }
    }
}

/// The most recent failure, as code and display text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LastError {
    pub code: i32,
    pub text: String,
}

impl LastError {
    pub fn from_error(err: &QueryError) -> Self {
        let code = err.code();
        let mut text = format!("{}{}", ERROR_PREFIX, err);
        if code > 0 {
            let description = io::Error::from_raw_os_error(code);
            text.push_str(&format!(": {}: {}", code, description));
        }
        truncate_on_char_boundary(&mut text, MAX_ERROR_TEXT);
        Self { code, text }
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_platform_where_it_applies() {
        assert_eq!(QueryError::AlreadyOpen.code(), libc::EEXIST);
        assert_eq!(QueryError::OutOfMemory { requested: 1 }.code(), libc::ENOMEM);
        assert_eq!(QueryError::NotOpen.code(), ADAPTER_ERROR);

        let refused = QueryError::EngineFailure {
            keyword: "peers".into(),
            source: EngineError::Io(io::Error::from_raw_os_error(libc::ECONNREFUSED)),
        };
        assert_eq!(refused.code(), libc::ECONNREFUSED);

        let timeout = QueryError::EngineFailure {
            keyword: "peers".into(),
            source: EngineError::Timeout,
        };
        assert_eq!(timeout.code(), ADAPTER_ERROR);
    }

    #[test]
    fn text_carries_prefix_and_keyword() {
        let err = QueryError::UnknownCommand {
            keyword: "bogus".into(),
        };
        let last = LastError::from_error(&err);
        assert_eq!(last.code, ADAPTER_ERROR);
        assert_eq!(last.text, "ntpq: unknown command `bogus'");
    }

    #[test]
    fn platform_errors_append_number_and_description() {
        let last = LastError::from_error(&QueryError::AlreadyOpen);
        let expected = format!("ntpq: session already open: {}: ", libc::EEXIST);
        assert!(last.text.starts_with(&expected), "{}", last.text);
        assert!(last.text.len() > expected.len());
    }

    #[test]
    fn text_is_bounded_on_a_char_boundary() {
        let err = QueryError::UnknownCommand {
            keyword: "é".repeat(200),
        };
        let last = LastError::from_error(&err);
        assert!(last.text.len() <= MAX_ERROR_TEXT);
        assert!(last.text.starts_with(ERROR_PREFIX));
    }

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(QueryError::MissingArguments.kind(), "missing_arguments");
        assert_eq!(
            QueryError::InvalidIpVersion { value: "-5".into() }.kind(),
            "invalid_ip_version"
        );
    }
}
