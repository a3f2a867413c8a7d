//! Interpreter construction and the embedding API.
//!
//! An [`Interpreter`] owns one root environment, seeded once from a base
//! symbol table (the standard library unless replaced) with host extensions
//! merged on top. Everything compiled by the interpreter resolves against
//! that root.
//!
//! The interpreter also installs the `export` special form for building up
//! libraries:
//!
//! ```scheme
//! (export ((square (lambda (x) (* x x)))
//!          (answer 42)))
//! ```
//!
//! Each init form is evaluated synchronously in the root environment and
//! bound there. A name can be exported only once; exporting over an existing
//! root binding is an error and leaves that binding untouched. Like every
//! other root entry, `export` can be replaced by a host extension of the
//! same name.

use std::time::Duration;

use log::debug;

use crate::ast::{Callable, Outcome, Value};
use crate::builtinops::{parse_bindings, standard_library};
use crate::compiler::compile;
use crate::environment::{Environment, SymbolTable};
use crate::error::{Error, ErrorKind};
use crate::intooperation::Arity;
use crate::thunk::{Task, Thunk};
use crate::{DEFAULT_MAX_BACKTRACE, DEFAULT_MIN_OPS_PER_CHECK, DEFAULT_SLICE_BUDGET};

/// Execution settings shared by every run of one interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Wall time an incremental run may use before yielding
    pub slice_budget: Duration,
    /// Frames executed between two clock checks
    pub min_ops_per_check: usize,
    /// Expressions kept in an error's backtrace
    pub max_backtrace: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            slice_budget: DEFAULT_SLICE_BUDGET,
            min_ops_per_check: DEFAULT_MIN_OPS_PER_CHECK,
            max_backtrace: DEFAULT_MAX_BACKTRACE,
        }
    }
}

impl InterpreterConfig {
    pub fn with_slice_budget(mut self, slice_budget: Duration) -> Self {
        self.slice_budget = slice_budget;
        self
    }

    pub fn with_min_ops_per_check(mut self, min_ops_per_check: usize) -> Self {
        self.min_ops_per_check = min_ops_per_check;
        self
    }

    pub fn with_max_backtrace(mut self, max_backtrace: usize) -> Self {
        self.max_backtrace = max_backtrace;
        self
    }
}

/// Builder for [`Interpreter`].
#[derive(Default)]
pub struct InterpreterBuilder {
    runtime: Option<SymbolTable>,
    extensions: SymbolTable,
    config: InterpreterConfig,
}

impl InterpreterBuilder {
    /// Replaces the base library (the standard library by default).
    pub fn runtime(mut self, runtime: SymbolTable) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Host natives merged on top of the base library. Entries here take
    /// precedence over base entries of the same name.
    pub fn extensions(mut self, extensions: SymbolTable) -> Self {
        self.extensions.merge(extensions);
        self
    }

    pub fn config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Interpreter {
        let mut table = self.runtime.unwrap_or_else(standard_library);

        let max_backtrace = self.config.max_backtrace;
        let export = Callable::special_form("export", move |args, env| {
            special_export(args, env, max_backtrace)
        });
        table.define("export", Value::Callable(export));
        // Extensions may replace any root entry, `export` included
        table.merge(self.extensions);

        debug!("creating interpreter with {} root symbols", table.len());
        Interpreter {
            root: Environment::from(table),
            config: self.config,
        }
    }
}

/// An embeddable interpreter instance.
pub struct Interpreter {
    root: Environment,
    config: InterpreterConfig,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter over the standard library with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::default()
    }

    pub fn root(&self) -> &Environment {
        &self.root
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Compiles `expr` against the root environment.
    pub fn compile(&self, expr: &Value) -> Thunk {
        compile(&self.root, expr)
    }

    /// Runs a compiled stream to completion.
    pub fn execute(&self, thunk: &Thunk) -> Result<Value, Error> {
        thunk.execute_with_backtrace(self.config.max_backtrace)
    }

    /// Compiles and runs `expr` to completion.
    pub fn evaluate(&self, expr: &Value) -> Result<Value, Error> {
        self.execute(&self.compile(expr))
    }

    /// Starts a time-sliced run of a compiled stream using the configured
    /// slice budget, check interval and backtrace cap.
    pub fn execute_incremental(&self, thunk: &Thunk) -> Task {
        thunk
            .execute_incremental(self.config.slice_budget, self.config.min_ops_per_check)
            .with_max_backtrace(self.config.max_backtrace)
    }

    /// Compiles `expr` and starts a time-sliced run.
    pub fn evaluate_incremental(&self, expr: &Value) -> Task {
        self.execute_incremental(&self.compile(expr))
    }

    /// Parses s-expression text and evaluates it.
    #[cfg(feature = "sexpr")]
    pub fn eval_str(&self, input: &str) -> Result<Value, Error> {
        let expr = crate::sexpr::parse_sexpr(input)?;
        self.evaluate(&expr)
    }
}

fn special_export(args: &[Value], env: &Environment, max_backtrace: usize) -> Result<Outcome, Error> {
    Arity::Exact(1).validate(args.len())?;
    let (names, inits) = parse_bindings(&args[0])?;
    let root = env.root();

    for (name, init) in names.iter().zip(&inits) {
        let name = match name {
            Value::Symbol(name) => name,
            Value::Nil | Value::True => return Err(ErrorKind::ReservedSymbol(name.to_string()).into()),
            other => return Err(Error::type_error(format!("cannot export {other}"))),
        };
        if root.contains_local(name) {
            return Err(ErrorKind::AlreadyDefined(name.clone()).into());
        }
        let value = compile(&root, init).execute_with_backtrace(max_backtrace)?;
        root.bind(name, value)?;
        debug!("exported {name}");
    }

    Ok(Outcome::Value(Value::True))
}
