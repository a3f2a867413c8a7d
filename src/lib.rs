//! slicelisp - embeddable s-expression runtime with a time-sliced engine
//!
//! This crate compiles s-expressions into flat instruction streams and runs
//! them on a trampoline, either to completion or in bounded time slices so a
//! host event loop is never starved. Deep user recursion, including tail
//! calls through `if`, never grows the host call stack.
//!
//! ```scheme
//! (+ 1 2 3)                                 ; 6
//! (car [])                                  ; nil
//! (let ((f (lambda (n acc)
//!            (if (= n 0) acc (recur (- n 1) (+ acc n))))))
//!   (f 50000 0))                            ; recursion via `recur`
//! ```
//!
//! The same programs can be written as JSON arrays, the surface syntax of
//! the `json` front-end:
//!
//! ```json
//! ["+", 1, 2, 3]
//! ["if", "t", 1, 2]
//! ```
//!
//! ## Pipeline
//!
//! text → [`Value`] tree → [`compile`] → [`Thunk`] → [`Thunk::execute`] or
//! [`Thunk::execute_incremental`] → [`Value`] or [`Error`]
//!
//! ## Modules
//!
//! - `ast`: values, callables and closures
//! - `environment`: delegation-chain scopes and symbol tables
//! - `compiler`: expression trees to instruction streams
//! - `thunk`: instruction streams, the trampoline and incremental tasks
//! - `builtinops`: the standard library
//! - `interpreter`: construction options and the embedding API
//! - `sexpr`: s-expression text front-end
//! - `json`: JSON-array front-end and deparser
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "sexpr")] {
//! use slicelisp::{Interpreter, Value};
//!
//! let interpreter = Interpreter::new();
//! assert_eq!(interpreter.eval_str("(+ 1 2 3)"), Ok(Value::from(6)));
//! # }
//! ```

use std::time::Duration;

/// Maximum nesting accepted by the text front-ends
pub const MAX_PARSE_DEPTH: usize = 128;

/// Default wall time of one incremental slice
pub const DEFAULT_SLICE_BUDGET: Duration = Duration::from_millis(250);

/// Default number of frames executed between two clock checks
pub const DEFAULT_MIN_OPS_PER_CHECK: usize = 1000;

/// Default number of expressions kept in an error's backtrace
pub const DEFAULT_MAX_BACKTRACE: usize = 10;

/// The nil marker
pub const NIL_SYMBOL: &str = "nil";

/// The true marker
pub const TRUE_SYMBOL: &str = "t";

/// Marks the start of the rest parameter in a lambda list
pub const REST_SYMBOL: &str = "&rest";

/// Bound to the running closure inside every invocation
pub const RECUR_SYMBOL: &str = "recur";

pub mod ast;
pub mod builtinops;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod intooperation;
pub mod thunk;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "sexpr")]
pub mod sexpr;

pub use ast::{Callable, Closure, NumberType, Outcome, Value};
pub use builtinops::standard_library;
pub use compiler::compile;
pub use environment::{Environment, SymbolTable};
pub use error::{Error, ErrorKind};
pub use interpreter::{Interpreter, InterpreterBuilder, InterpreterConfig};
pub use intooperation::{Arity, NumIter, ValueIter};
pub use thunk::{Progress, Task, Thunk};
