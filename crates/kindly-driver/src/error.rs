//! Error types for driving the engine and decoding its output.

use kindly_results::{ModelError, ResultModel};
use thiserror::Error;

/// Convenience alias for results within the driver crate.
pub type Result<T> = std::result::Result<T, DriverError>;

/// A record could not be decoded or did not fit the stream's structure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed record at byte {offset}: {source}")]
    Json {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected byte 0x{byte:02x} between records at byte {offset}")]
    UnexpectedByte { offset: u64, byte: u8 },

    #[error("'{kind}' record at byte {offset} is out of order: {reason}")]
    OutOfOrder {
        kind: &'static str,
        offset: u64,
        reason: String,
    },

    #[error("unknown {field} '{value}' in record at byte {offset}")]
    UnknownValue {
        field: &'static str,
        value: String,
        offset: u64,
    },

    #[error("output ended inside the record starting at byte {offset}")]
    UnterminatedRecord { offset: u64 },

    #[error("stream already aborted by an earlier decode failure")]
    Aborted,

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Everything the engine wrote while it ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

/// Errors from a verification session.
///
/// Errors raised after the engine started carry the partially decoded model
/// so that it can still be inspected.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("engine configuration error: {message}")]
    Configuration { message: String },

    #[error("engine terminated abnormally ({}); stderr: {}", describe_exit(.code), .output.stderr.trim())]
    AbnormalTermination {
        code: Option<i32>,
        output: CapturedOutput,
        partial: Box<ResultModel>,
    },

    #[error("failed to decode engine output: {source}")]
    Parse {
        #[source]
        source: ParseError,
        output: CapturedOutput,
        partial: Box<ResultModel>,
    },

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        DriverError::Configuration {
            message: message.into(),
        }
    }

    /// The model decoded before the failure, if the engine got that far.
    pub fn partial_model(&self) -> Option<&ResultModel> {
        match self {
            DriverError::AbnormalTermination { partial, .. } | DriverError::Parse { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }

    /// Output captured before the failure, if the engine got that far.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            DriverError::AbnormalTermination { output, .. } | DriverError::Parse { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}
