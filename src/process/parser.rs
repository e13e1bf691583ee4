//! # Line parsers and function-backed parser implementation.
//!
//! A [`LineParser`] turns one raw stdout line into optional structured data.
//! The monitor calls every registered parser for every non-blank stdout line;
//! a non-empty payload becomes a `Progress` event, an error (or a panic)
//! becomes an `Error` event carrying `parser_error`.
//!
//! [`ParserFn`] wraps a closure so collaborators do not need a named type.
//!
//! ## Example
//! ```rust
//! use procvisor::{ParserFn, ParserRef, Payload};
//!
//! let frames: ParserRef = ParserFn::arc("frames", |line: &str| {
//!     let Some(rest) = line.strip_prefix("frame=") else {
//!         return Ok(None);
//!     };
//!     let mut data = Payload::new();
//!     data.insert("frame".into(), rest.trim().into());
//!     Ok(Some(data))
//! });
//!
//! assert_eq!(frames.name(), "frames");
//! assert!(frames.parse("frame= 12").unwrap().is_some());
//! assert!(frames.parse("size=1kB").unwrap().is_none());
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::ParseError;
use crate::events::Payload;

/// Shared handle to a parser.
pub type ParserRef = Arc<dyn LineParser>;

/// # Converts raw output lines into structured data.
///
/// Implementations must be cheap: they run inline in the stdout read loop.
pub trait LineParser: Send + Sync + 'static {
    /// Returns a stable parser name (copied into `Progress` events as `parser`).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Parses one trimmed, non-blank line.
    ///
    /// `Ok(None)` (or an empty payload) means "nothing of interest on this line".
    fn parse(&self, line: &str) -> Result<Option<Payload>, ParseError>;
}

/// Function-backed parser.
#[derive(Debug)]
pub struct ParserFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ParserFn<F>
where
    F: Fn(&str) -> Result<Option<Payload>, ParseError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the parser and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> LineParser for ParserFn<F>
where
    F: Fn(&str) -> Result<Option<Payload>, ParseError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, line: &str) -> Result<Option<Payload>, ParseError> {
        (self.f)(line)
    }
}
