// This module defines error types for the initialization pass using the thiserror crate.
// Errors fall in three groups. ParseFailure describes why a single annotation string was
// rejected; the parser returns it and callers decide how to surface it. InitWarning is the
// non-fatal diagnostic collected during a run (malformed or duplicate annotations) and handed
// back in the pass report, since a rejected annotation never stops the pass. InitError covers
// precondition violations that abort the pass, such as asking the host to clone a function that
// has no body. InitResult<T> is the convenience alias for Result<T, InitError>.

//! Error types for the initialization pass.

use thiserror::Error;

/// Why an annotation string was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("empty annotation")]
    Empty,

    #[error("expected `range` or a `<int bits> <frac bits>` layout, found `{found}`")]
    UnrecognizedHead { found: String },

    #[error("fixed-point layout of {int_bits} + {frac_bits} bits is too wide")]
    LayoutTooWide { int_bits: u32, frac_bits: u32 },
}

/// Non-fatal diagnostic produced while collecting annotations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitWarning {
    #[error("annotation syntax error on `{declaration}`: {failure} (in annotation \"{annotation}\")")]
    Syntax {
        declaration: String,
        annotation: String,
        failure: ParseFailure,
    },

    #[error("duplicate annotation on `{declaration}` ignored (in annotation \"{annotation}\")")]
    Duplicate {
        declaration: String,
        annotation: String,
    },
}

/// Fatal error; the pass stops and the program must not be used further.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("cannot specialize `{name}`: function has no body")]
    NoBody { name: String },

    #[error("malformed annotation marker in `{function}`: {reason}")]
    MalformedMarker { function: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

/// Result type alias for pass operations.
pub type InitResult<T> = Result<T, InitError>;
