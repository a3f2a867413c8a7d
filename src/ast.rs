//! This module defines the tagged data shapes flowing through the runtime.
//! The main enum, [`Value`], is used both as the expression tree the
//! compiler consumes (atoms and lists) and as the runtime result of
//! evaluating one: numbers, lists, the nil and true markers, and callables.
//! Ergonomic helper functions such as [`val`], [`sym`] and [`nil`] are
//! provided for convenient tree construction in both code and tests, and the
//! usual conversion traits are implemented for Rust numbers, booleans,
//! arrays, slices and vectors.
//!
//! Callables come in four flavours, see [`Callable`]: ordinary natives and
//! closures run at execution time with evaluated arguments, while special
//! forms and macros run at compile time with the unevaluated argument
//! expressions.

use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::compiler::compile;
use crate::environment::{Environment, Garbage};
use crate::error::{Error, ErrorKind};
use crate::intooperation::OperationFn;
use crate::thunk::Thunk;
use crate::{NIL_SYMBOL, RECUR_SYMBOL, REST_SYMBOL, TRUE_SYMBOL};

/// Type alias for number values in the runtime
pub type NumberType = f64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$&%";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if (first_char == '-' || first_char == '+')
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Symbols that are markers rather than bindable names
pub(crate) fn is_reserved_symbol(name: &str) -> bool {
    name == NIL_SYMBOL || name == TRUE_SYMBOL || name == REST_SYMBOL
}

/// Core value and expression type.
///
/// As an expression, a `Value` is either an atom (symbol, number, `Nil`,
/// `True`) or a `List` used as call syntax `[op, arg1, arg2, ...]`. The empty
/// list is synonymous with nil: both satisfy [`Value::is_nil`] and compare
/// equal.
///
/// To build a tree, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for nil
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Number(NumberType),
    Symbol(String),
    /// The nil marker
    Nil,
    /// The true marker
    True,
    List(Vec<Value>),
    Callable(Callable),
}

impl Value {
    /// Check if a value represents nil (the marker or the empty list)
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Every value except nil counts as true
    pub fn is_true(&self) -> bool {
        !self.is_nil()
    }

    /// View a list value as a slice; nil reads as the empty list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    /// Short type description for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::Nil => "nil",
            Value::True => "t",
            Value::List(_) => "list",
            Value::Callable(_) => "function",
        }
    }

    /// Maps a Rust boolean onto the `t`/`nil` markers
    pub fn from_truth(b: bool) -> Value {
        if b { Value::True } else { Value::Nil }
    }

    /// Whether dropping this value may free further values or scopes.
    fn owns_nested(&self) -> bool {
        match self {
            Value::List(items) => items
                .iter()
                .any(|item| matches!(item, Value::List(_) | Value::Callable(Callable::Closure(_)))),
            Value::Callable(Callable::Closure(closure)) => Rc::strong_count(closure) == 1,
            _ => false,
        }
    }

    /// Unlinks list elements and the contents of a uniquely owned closure
    /// into `garbage`, leaving `self` shallow.
    pub(crate) fn detach_into(&mut self, garbage: &mut Garbage) {
        match self {
            Value::List(items) => garbage.values.append(items),
            Value::Callable(Callable::Closure(closure)) => {
                if let Some(closure) = Rc::get_mut(closure) {
                    garbage.values.push(mem::replace(&mut closure.body, Value::Nil));
                    closure.env.detach_into(garbage);
                }
            }
            _ => {}
        }
    }
}

// Nested lists and closure chains are freed from a loop so that their depth
// never reaches the host stack.
impl Drop for Value {
    fn drop(&mut self) {
        if self.owns_nested() {
            let mut garbage = Garbage::default();
            self.detach_into(&mut garbage);
            garbage.release();
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Nil => write!(f, "Nil"),
            Value::True => write!(f, "True"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Callable(callable) => write!(f, "Callable({callable})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Nil => write!(f, "{NIL_SYMBOL}"),
            Value::True => write!(f, "{TRUE_SYMBOL}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Callable(callable) => write!(f, "{callable}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::True, Value::True) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            // Nil and the empty list are the same value
            (a, b) if a.is_nil() && b.is_nil() => true,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_truth(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Callable(callable)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);
impl_from_integer!(usize);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::List(slice.iter().cloned().map(|x| x.into()).collect())
    }
}

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = &self {
            Ok(*n)
        } else {
            Err(Error::type_error(format!(
                "not a number: {self} is a {}",
                self.type_name()
            )))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the nil marker
pub fn nil() -> Value {
    Value::Nil
}

/// What an ordinary callable or special form hands back: either a ready value
/// or more work for the trampoline.
pub enum Outcome {
    Value(Value),
    Thunk(Thunk),
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<Thunk> for Outcome {
    fn from(thunk: Thunk) -> Self {
        Outcome::Thunk(thunk)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => write!(f, "Value({value:?})"),
            Outcome::Thunk(thunk) => write!(f, "Thunk({} frames)", thunk.len()),
        }
    }
}

/// Compile-time hook receiving the unevaluated arguments and the enclosing
/// environment.
pub type SpecialFormFn = dyn Fn(&[Value], &Environment) -> Result<Outcome, Error>;

/// Compile-time rewriter returning a replacement expression.
pub type MacroFn = dyn Fn(&[Value], &Environment) -> Result<Value, Error>;

/// A callable value. The tag decides when and how it runs.
#[derive(Clone)]
pub enum Callable {
    /// Rust function invoked at execution time with evaluated arguments
    Native(NativeFn),
    /// Invoked at compile time with unevaluated arguments
    SpecialForm(SpecialForm),
    /// Invoked at compile time; its result is recompiled in place
    Macro(Macro),
    /// User function created by `lambda`
    Closure(Rc<Closure>),
}

impl Callable {
    pub fn native<F>(id: &str, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Outcome, Error> + 'static,
    {
        Callable::Native(NativeFn {
            id: id.into(),
            func: Rc::new(func),
        })
    }

    pub fn special_form<F>(id: &str, func: F) -> Self
    where
        F: Fn(&[Value], &Environment) -> Result<Outcome, Error> + 'static,
    {
        Callable::SpecialForm(SpecialForm {
            id: id.into(),
            func: Rc::new(func),
        })
    }

    pub fn macro_form<F>(id: &str, func: F) -> Self
    where
        F: Fn(&[Value], &Environment) -> Result<Value, Error> + 'static,
    {
        Callable::Macro(Macro {
            id: id.into(),
            func: Rc::new(func),
        })
    }

    /// Runs an ordinary callable with evaluated arguments. Special forms and
    /// macros only exist at compile time and cannot be called as values.
    pub(crate) fn invoke(&self, args: Vec<Value>) -> Result<Outcome, Error> {
        match self {
            Callable::Native(native) => (native.func)(args),
            Callable::Closure(closure) => closure.invoke(args),
            Callable::SpecialForm(_) | Callable::Macro(_) => {
                Err(Error::illegal_call(self.to_string()))
            }
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(native) => write!(f, "#<native:{}>", native.id),
            Callable::SpecialForm(form) => write!(f, "#<special-form:{}>", form.id),
            Callable::Macro(mac) => write!(f, "#<macro:{}>", mac.id),
            Callable::Closure(_) => write!(f, "#<closure>"),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Compare builtins by id string, not function pointer
            (Callable::Native(a), Callable::Native(b)) => a.id == b.id,
            (Callable::SpecialForm(a), Callable::SpecialForm(b)) => a.id == b.id,
            (Callable::Macro(a), Callable::Macro(b)) => a.id == b.id,
            (Callable::Closure(a), Callable::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct NativeFn {
    id: Rc<str>,
    func: Rc<OperationFn>,
}

impl NativeFn {
    pub(crate) fn from_operation(id: &str, func: Rc<OperationFn>) -> Self {
        NativeFn {
            id: id.into(),
            func,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone)]
pub struct SpecialForm {
    id: Rc<str>,
    func: Rc<SpecialFormFn>,
}

impl SpecialForm {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn apply(&self, args: &[Value], env: &Environment) -> Result<Outcome, Error> {
        (self.func)(args, env)
    }
}

#[derive(Clone)]
pub struct Macro {
    id: Rc<str>,
    func: Rc<MacroFn>,
}

impl Macro {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn expand(&self, args: &[Value], env: &Environment) -> Result<Value, Error> {
        (self.func)(args, env)
    }
}

/// A user function: parameters, unevaluated body and the defining
/// environment, captured by reference.
pub struct Closure {
    params: Vec<String>,
    /// Present when the parameter list contains `&rest`; `Some(None)` means
    /// the trailing arguments are discarded
    rest: Option<Option<String>>,
    body: Value,
    env: Environment,
}

impl Closure {
    /// Builds a closure from a `lambda` parameter list.
    ///
    /// Parameters must be symbols without duplicates; `&rest` may be
    /// followed by at most one name collecting the trailing arguments.
    pub fn new(param_list: &Value, body: Value, env: Environment) -> Result<Self, Error> {
        let Some(param_values) = param_list.as_list() else {
            return Err(Error::type_error(format!(
                "lambda parameters must be a list, got {param_list}"
            )));
        };

        let mut params: Vec<String> = Vec::new();
        let mut rest = None;
        let mut iter = param_values.iter();

        while let Some(param) = iter.next() {
            let name = match param {
                Value::Symbol(name) => name,
                Value::Nil | Value::True => {
                    return Err(ErrorKind::ReservedSymbol(param.to_string()).into());
                }
                other => {
                    return Err(Error::type_error(format!(
                        "lambda parameters must be symbols, got {other}"
                    )));
                }
            };

            if name == REST_SYMBOL {
                let rest_name = match iter.next() {
                    None => None,
                    Some(Value::Symbol(rest_name)) if !is_reserved_symbol(rest_name) => {
                        Some(rest_name.clone())
                    }
                    Some(marker @ (Value::Symbol(_) | Value::Nil | Value::True)) => {
                        return Err(ErrorKind::ReservedSymbol(marker.to_string()).into());
                    }
                    Some(other) => {
                        return Err(Error::type_error(format!(
                            "{REST_SYMBOL} must be followed by a parameter name, got {other}"
                        )));
                    }
                };
                if let Some(extra) = iter.next() {
                    return Err(Error::eval(format!(
                        "unexpected parameter {extra} after rest parameter"
                    )));
                }
                if let Some(rest_name) = &rest_name
                    && params.contains(rest_name)
                {
                    return Err(Error::eval(format!("Duplicate parameter name: {rest_name}")));
                }
                rest = Some(rest_name);
                break;
            }

            if is_reserved_symbol(name) {
                return Err(ErrorKind::ReservedSymbol(name.clone()).into());
            }
            if params.contains(name) {
                return Err(Error::eval(format!("Duplicate parameter name: {name}")));
            }
            params.push(name.clone());
        }

        Ok(Closure {
            params,
            rest,
            body,
            env,
        })
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn rest_param(&self) -> Option<&str> {
        self.rest.as_ref().and_then(|rest| rest.as_deref())
    }

    /// Binds the arguments in a fresh child of the defining environment and
    /// hands the compiled body back to the trampoline.
    ///
    /// Missing positional arguments are bound to nil. Excess arguments are
    /// collected into the rest parameter when one is declared and ignored
    /// otherwise.
    fn invoke(self: &Rc<Self>, args: Vec<Value>) -> Result<Outcome, Error> {
        let scope = self.env.child();
        scope.define(RECUR_SYMBOL, Value::Callable(Callable::Closure(Rc::clone(self))));

        let mut args = args.into_iter();
        for param in &self.params {
            scope.define(param, args.next().unwrap_or(Value::Nil));
        }
        if let Some(Some(rest_name)) = &self.rest {
            scope.define(rest_name, Value::List(args.collect()));
        }

        Ok(Outcome::Thunk(compile(&scope, &self.body)))
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure(params={:?}, rest={:?}, body={:?})", self.params, self.rest, self.body)
    }
}
