pub mod ast;
pub mod convert;
pub mod ir;
pub mod types;

use ast::Span;
use thiserror::Error;

pub use convert::{
    convert_module_to_package, convert_one_function, mangle_name, ConversionRecord, ConvertOptions,
};

/// Errors produced while converting a type-checked module to IR.
///
/// Every failure carries a best-effort source span of the originating AST
/// node and a human-readable message. Conversion never recovers from an
/// error; the current function's conversion is aborted and the error is
/// returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// An AST node was expected to have an IR binding but did not.
    #[error("{}value not found: {message}", span_prefix(.span))]
    NotFound { span: Option<Span>, message: String },

    /// An internal invariant was violated (e.g. missing type information).
    #[error("{}internal error: {message}", span_prefix(.span))]
    Internal { span: Option<Span>, message: String },

    /// Caller-provided inputs were malformed (e.g. bad mangling inputs).
    #[error("{}invalid argument: {message}", span_prefix(.span))]
    InvalidArgument { span: Option<Span>, message: String },

    /// The construct is not supported by IR conversion.
    #[error("{}unimplemented: {message}", span_prefix(.span))]
    Unimplemented { span: Option<Span>, message: String },
}

impl ConversionError {
    pub fn not_found(span: Option<Span>, message: impl Into<String>) -> Self {
        ConversionError::NotFound {
            span,
            message: message.into(),
        }
    }

    pub fn internal(span: Option<Span>, message: impl Into<String>) -> Self {
        ConversionError::Internal {
            span,
            message: message.into(),
        }
    }

    pub fn invalid_argument(span: Option<Span>, message: impl Into<String>) -> Self {
        ConversionError::InvalidArgument {
            span,
            message: message.into(),
        }
    }

    pub fn unimplemented(span: Option<Span>, message: impl Into<String>) -> Self {
        ConversionError::Unimplemented {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ConversionError::NotFound { span, .. }
            | ConversionError::Internal { span, .. }
            | ConversionError::InvalidArgument { span, .. }
            | ConversionError::Unimplemented { span, .. } => *span,
        }
    }
}

fn span_prefix(span: &Option<Span>) -> String {
    match span {
        Some(span) => format!("{span} "),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;
