//! Linearizes expression trees into [`Thunk`]s.
//!
//! Compilation walks the tree with an explicit work list rather than host
//! recursion, so the compiler's stack use does not depend on nesting depth.
//! Symbols are resolved against the environment as they are met; the first
//! compile-time failure appends an error frame and stops compilation.

use log::{debug, trace};

use crate::ast::{Callable, Outcome, Value};
use crate::environment::Environment;
use crate::error::Error;
use crate::thunk::Thunk;
use crate::{NIL_SYMBOL, TRUE_SYMBOL};

/// Compiles `expr` against `env` into an instruction stream.
///
/// The returned stream is always executable; if compilation failed its
/// first frame to run is the error (see [`Thunk::is_failed`]).
pub fn compile(env: &Environment, expr: &Value) -> Thunk {
    let mut thunk = Thunk::new();
    let mut pending = vec![expr.clone()];

    while let Some(expr) = pending.pop() {
        if let Err(mut error) = compile_expr(env, &expr, &mut thunk, &mut pending) {
            debug!("compile error in {expr}: {}", error.message());
            error.push_origin(expr);
            thunk.push_error(error);
            break;
        }
        // A special form handed back a stream that already failed
        if thunk.is_failed() {
            break;
        }
    }

    thunk
}

fn compile_expr(
    env: &Environment,
    expr: &Value,
    thunk: &mut Thunk,
    pending: &mut Vec<Value>,
) -> Result<(), Error> {
    match expr {
        Value::Symbol(name) if name == NIL_SYMBOL => thunk.push_value(Value::Nil),
        Value::Symbol(name) if name == TRUE_SYMBOL => thunk.push_value(Value::True),
        Value::Symbol(name) => thunk.push_value(env.lookup(name)?),
        Value::List(items) => match items.split_first() {
            None => thunk.push_value(Value::Nil),
            Some((op, args)) => compile_application(env, expr, op, args, thunk, pending)?,
        },
        atom => thunk.push_value(atom.clone()),
    }
    Ok(())
}

fn compile_application(
    env: &Environment,
    expr: &Value,
    op: &Value,
    args: &[Value],
    thunk: &mut Thunk,
    pending: &mut Vec<Value>,
) -> Result<(), Error> {
    let callable = match op {
        // Computed operator: (op-expr a b) becomes (call op-expr a b)
        Value::List(items) if !items.is_empty() => {
            let mut rewritten = Vec::with_capacity(args.len() + 2);
            rewritten.push(Value::Callable(call_operation()));
            rewritten.push(op.clone());
            rewritten.extend(args.iter().cloned());
            pending.push(Value::List(rewritten));
            return Ok(());
        }
        Value::Symbol(name) => match &env.lookup(name)? {
            Value::Callable(callable) => callable.clone(),
            _ => return Err(Error::illegal_call(name.clone())),
        },
        Value::Callable(callable) => callable.clone(),
        other => return Err(Error::illegal_call(other.to_string())),
    };

    match &callable {
        Callable::Macro(mac) => {
            let expansion = mac.expand(args, env)?;
            trace!("expanded {expr} into {expansion}");
            pending.push(expansion);
        }
        Callable::SpecialForm(form) => match form.apply(args, env)? {
            Outcome::Value(value) => thunk.push_value(value),
            Outcome::Thunk(more) => thunk.merge(more),
        },
        Callable::Native(_) | Callable::Closure(_) => {
            thunk.push_call(callable.clone(), args.len(), expr.clone());
            // Pushed left to right, so the last argument compiles first and
            // sits nearest the call frame
            pending.extend(args.iter().cloned());
        }
    }
    Ok(())
}

/// Invokes its first argument with the remaining ones.
pub(crate) fn call_operation() -> Callable {
    Callable::native("call", |mut args| {
        if args.is_empty() {
            return Err(Error::arity_error(1, 0));
        }
        let target = args.remove(0);
        match &target {
            Value::Callable(callable) => callable.invoke(args),
            other => Err(Error::illegal_call(other.to_string())),
        }
    })
}
