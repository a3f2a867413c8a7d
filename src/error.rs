//! The error model shared by the compiler and the execution engine.
//!
//! Compile-time failures (unknown symbol, calling a non-callable, malformed
//! expression shapes) and runtime failures (type errors, division by zero,
//! out-of-bounds indexing, user-signaled errors) are both represented by the
//! same [`Error`] value so that hosts handle them uniformly. An error carries
//! an [`ErrorKind`] describing what went wrong plus a backtrace of the
//! expressions that were being evaluated, most recent first.

use std::fmt;

use crate::ast::{NumberType, Value};

/// Categorizes the different kinds of failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Text could not be turned into an expression
    ParseError(String),
    /// Generic evaluation failure, including user-signaled errors
    EvalError(String),
    /// An argument had the wrong shape (number vs. list vs. nil)
    TypeError(String),
    /// A symbol was not bound anywhere along the environment chain
    UnboundVariable(String),
    /// The operator position did not resolve to something that can be called
    IllegalCall(String),
    ArityError {
        expected: usize,
        got: usize,
    },
    IndexOutOfBounds {
        index: NumberType,
        len: usize,
    },
    DivisionByZero,
    /// A root-level declaration targeted a symbol that is already bound
    AlreadyDefined(String),
    /// An attempt was made to bind `nil`, `t` or `&rest`
    ReservedSymbol(String),
    /// Engine invariant violated; indicates a defect rather than a user error
    Internal(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ParseError(msg) => write!(f, "ParseError: {msg}"),
            ErrorKind::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            ErrorKind::TypeError(msg) => write!(f, "Type error: {msg}"),
            ErrorKind::UnboundVariable(name) => write!(f, "Unknown symbol: \"{name}\""),
            ErrorKind::IllegalCall(what) => {
                write!(f, "Illegal function call: {what} is not callable")
            }
            ErrorKind::ArityError { expected, got } => write!(
                f,
                "ArityError: function expected {expected} arguments but got {got}"
            ),
            ErrorKind::IndexOutOfBounds { index, len } => {
                write!(f, "Index {index} out of bounds for list of length {len}")
            }
            ErrorKind::DivisionByZero => write!(f, "Illegal division by zero"),
            ErrorKind::AlreadyDefined(name) => write!(f, "Symbol \"{name}\" already defined"),
            ErrorKind::ReservedSymbol(name) => {
                write!(f, "Reserved symbol \"{name}\" cannot be bound")
            }
            ErrorKind::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

/// A propagated failure with an accumulated backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    /// Originating expressions, most recent first
    backtrace: Vec<Value>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            backtrace: Vec::new(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvalError(message.into()))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError(message.into()))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError(message.into()))
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnboundVariable(name.into()))
    }

    pub fn illegal_call(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalCall(what.into()))
    }

    pub fn arity_error(expected: usize, got: usize) -> Self {
        Self::new(ErrorKind::ArityError { expected, got })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// The error message without the backtrace
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Expressions that were being evaluated when the error surfaced,
    /// innermost first.
    pub fn backtrace(&self) -> &[Value] {
        &self.backtrace
    }

    /// Records the expression an error originated from.
    pub(crate) fn push_origin(&mut self, expr: Value) {
        self.backtrace.push(expr);
    }

    /// Appends the backtrace accumulated by an execution run and drops the
    /// oldest entries beyond `cap`.
    pub(crate) fn extend_backtrace<I>(&mut self, trace: I, cap: usize)
    where
        I: IntoIterator<Item = Value>,
    {
        self.backtrace.extend(trace);
        self.backtrace.truncate(cap.max(1));
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.backtrace.is_empty() {
            return Ok(());
        }
        write!(f, " at")?;
        for expr in &self.backtrace {
            write!(f, "\n  {expr}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
