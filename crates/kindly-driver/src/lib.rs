//! Driving the external model checker.
//!
//! [`ProcessDriver`] owns the engine's lifecycle and cancellation,
//! [`StreamParser`] turns its structured output into a
//! [`kindly_results::ResultModel`] as records arrive.

pub mod args;
pub mod config;
pub mod driver;
pub mod error;
pub mod parser;
pub mod transcript;
pub mod wire;

pub use args::EngineArgs;
pub use config::{parse_version, DriverConfig};
pub use driver::{
    CancellationHandle, Completion, EngineInfo, ExitClass, ProcessDriver, ProgramInput, Session,
    SessionStatus,
};
pub use error::{CapturedOutput, DriverError, ParseError, Result};
pub use parser::{parse_output, StreamParser};
pub use transcript::{LogEntry, Transcript};
