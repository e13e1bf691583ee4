//! Process model: requests, results, handles, parsers and termination.
//!
//! ## Contents
//! - [`ProcessRequest`], [`ExecutionId`] what to run and how it is identified
//! - [`ProcessResult`], [`ProcessState`] the outcome of one execution
//! - [`ProcessHandle`] shared access to a running child
//! - [`LineParser`], [`ParserFn`] stdout line parsers feeding `Progress` events
//! - [`ProcessTerminator`], [`Terminable`] staged graceful → forceful → OS-kill stop

mod handle;
mod parser;
mod request;
mod result;
mod terminator;

pub use handle::{ChildOutput, ExitState, ProcessHandle};
pub use parser::{LineParser, ParserFn, ParserRef};
pub use request::{ExecutionId, ProcessRequest};
pub use result::{ProcessResult, ProcessState};
pub use terminator::{
    DEFAULT_GRACE, DEFAULT_KILL_WAIT, ProcessTerminator, Terminable, TerminationState,
};
