//! The crate's narrow fallible surface.
//!
//! Almost nothing in this crate can fail: malformed Markdown is never rejected, it's rendered as
//! literal text (see the module docs on `inline` and `block`). The one exception is runaway tree
//! depth on adversarial input, which would otherwise recurse the call stack into the ground.

use thiserror::Error;

/// Errors surfaced by [`crate::parse`] and [`crate::Parser::parse`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The document nested blocks or inlines deeper than [`crate::Options::maxdepth`] allows.
    ///
    /// The C ancestor this crate is modeled on aborts the process here (`errx(EXIT_FAILURE, ...)`).
    /// A library embedded in a long-running process can't do that to its host, so this crate
    /// reports the condition as an ordinary `Result` instead.
    #[error("maximum parse tree depth ({max}) exceeded")]
    MaxDepthExceeded {
        /// The configured limit that was exceeded.
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
