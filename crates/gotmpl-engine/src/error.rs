// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::ast::Span;
use thiserror::Error;

/// Unified error type for the template engine.
///
/// Errors carry the message and, when available, the `Span` pointing at the
/// offending region of the template source. Prefer the `*_with_span`
/// constructors when propagating a failure that originates from a concrete
/// location; use the spanless constructors for failures discovered only at
/// evaluation time (e.g. an arity mismatch inside a user callable).
#[derive(Debug, Error)]
pub enum Error {
    /// Raised while turning source bytes into a `Template`.
    #[error("parse error: {message}")]
    Parse {
        /// Human-readable description of what went wrong.
        message: String,
        /// Byte-offset location in the source, when known.
        span: Option<Span>,
    },
    /// Raised while walking a parsed `Template` against data.
    #[error("render error: {message}")]
    Render {
        /// Human-readable description of what went wrong.
        message: String,
        /// Byte-offset location in the source, when known.
        span: Option<Span>,
    },
}

impl Error {
    /// Builds a parse error without a source span.
    pub fn parse(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Parse {
            message: message.into(),
            span,
        }
    }

    /// Builds a parse error anchored to `span`.
    pub fn parse_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::parse(message, Some(span))
    }

    /// Builds a render (execute) error without a source span.
    pub fn render(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Render {
            message: message.into(),
            span,
        }
    }

    /// Builds a render error anchored to `span`.
    pub fn render_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::render(message, Some(span))
    }

    /// The span this error is anchored to, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Parse { span, .. } | Error::Render { span, .. } => *span,
        }
    }
}
