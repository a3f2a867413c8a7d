//! The standard library: natives, special forms and macros.
//!
//! Everything here is registered through the same adapter layer hosts use
//! for their own extensions, and [`standard_library`] packages it as a
//! [`SymbolTable`] ready to seed an interpreter.
//!
//! ## Natives, special forms and macros
//!
//! - **Natives** run at execution time with evaluated arguments (`+`, `car`,
//!   `nth`, ...). They validate argument types themselves and signal a type
//!   error instead of coercing.
//! - **Special forms** run at compile time with the unevaluated arguments and
//!   control how their operands are compiled (`quote`, `lambda`, `if`,
//!   `progn`). `if` and `progn` answer with a thunk whose continuations
//!   compile the next operand only once the previous value is known.
//! - **Macros** rewrite their call into another expression (`let`, `let*`,
//!   `and`, `or`). Expansions refer to the forms they build on by value, so
//!   they keep working when user code shadows those names.
//!
//! ```text
//! (let ((a 1) (b 2)) body)  =>  ((lambda (recur a b) body) recur 1 2)
//! (let* ((a 1) (b a)) body) =>  (let ((a 1)) (let ((b a)) body))
//! (and a b c)               =>  (if a (if b c nil) nil)
//! ```
//!
//! Nil and the empty list are interchangeable for every list primitive:
//! `(car [])` is nil and `(cdr nil)` is the empty list.

use std::iter;
use std::rc::Rc;

use crate::RECUR_SYMBOL;
use crate::ast::{Callable, Closure, NumberType, Outcome, Value, sym};
use crate::compiler::{call_operation, compile};
use crate::environment::{Environment, SymbolTable};
use crate::error::{Error, ErrorKind};
use crate::intooperation::{
    Arity, IntoOperation, IntoVariadicOperation, NumIter, OperationFn, ValueIter,
};
use crate::thunk::Thunk;

type SpecialFormImpl = fn(&[Value], &Environment) -> Result<Outcome, Error>;
type MacroImpl = fn(&[Value], &Environment) -> Result<Value, Error>;

/// Implementation of a builtin
#[derive(Clone)]
pub enum OpKind {
    /// Runs at execution time with evaluated arguments
    Function(Rc<OperationFn>),
    /// Runs at compile time with unevaluated arguments
    SpecialForm(SpecialFormImpl),
    /// Rewrites its call at compile time
    Macro(MacroImpl),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
            OpKind::Macro(_) => write!(f, "Macro(<fn>)"),
        }
    }
}

/// Definition of a builtin
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Checked before the implementation runs
    pub arity: Arity,
}

impl BuiltinOp {
    /// Wraps the implementation into a callable that validates arity first.
    pub fn to_callable(&self) -> Callable {
        let arity = self.arity;
        match &self.op_kind {
            OpKind::Function(func) => {
                let func = Rc::clone(func);
                Callable::native(self.id, move |args| {
                    arity.validate(args.len())?;
                    func(args)
                })
            }
            OpKind::SpecialForm(form) => {
                let form = *form;
                Callable::special_form(self.id, move |args, env| {
                    arity.validate(args.len())?;
                    form(args, env)
                })
            }
            OpKind::Macro(mac) => {
                let mac = *mac;
                Callable::macro_form(self.id, move |args, env| {
                    arity.validate(args.len())?;
                    mac(args, env)
                })
            }
        }
    }
}

//
// Natives
//

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: NumberType, rest: NumIter<'_>) -> bool {
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

/// Chained equality over numbers; two nils are also equal.
fn builtin_eq(first: Value, rest: ValueIter<'_>) -> Result<bool, Error> {
    let mut prev = &first;
    for current in rest {
        match (prev, current) {
            (a, b) if a.is_nil() && b.is_nil() => {}
            (Value::Number(a), Value::Number(b)) => {
                if a != b {
                    return Ok(false);
                }
            }
            (a, b) => {
                return Err(Error::type_error(format!(
                    "cannot compare {} with {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        }
        prev = current;
    }
    Ok(true)
}

fn builtin_add(args: NumIter<'_>) -> NumberType {
    args.sum()
}

fn builtin_sub(first: NumberType, rest: NumIter<'_>) -> NumberType {
    if rest.len() == 0 {
        return -first;
    }
    rest.fold(first, |acc, n| acc - n)
}

fn builtin_mul(args: NumIter<'_>) -> NumberType {
    args.product()
}

fn builtin_div(first: NumberType, rest: NumIter<'_>) -> Result<NumberType, Error> {
    if rest.len() == 0 {
        return divide(1.0, first);
    }
    let mut quotient = first;
    for divisor in rest {
        quotient = divide(quotient, divisor)?;
    }
    Ok(quotient)
}

fn divide(dividend: NumberType, divisor: NumberType) -> Result<NumberType, Error> {
    if divisor == 0.0 {
        Err(ErrorKind::DivisionByZero.into())
    } else {
        Ok(dividend / divisor)
    }
}

fn builtin_not(value: Value) -> bool {
    value.is_nil()
}

fn builtin_cons(first: Value, rest: Value) -> Result<Value, Error> {
    match rest.as_list() {
        Some(tail) => {
            let mut list = Vec::with_capacity(tail.len() + 1);
            list.push(first);
            list.extend_from_slice(tail);
            Ok(Value::List(list))
        }
        None => Err(Error::type_error(format!(
            "cons requires a list as second argument, got {}",
            rest.type_name()
        ))),
    }
}

fn builtin_car(mut list: ValueIter<'_>) -> Value {
    list.next().cloned().unwrap_or(Value::Nil)
}

fn builtin_cdr(list: ValueIter<'_>) -> Value {
    Value::List(list.skip(1).cloned().collect())
}

/// Takes ownership of the evaluated arguments, so building a list never
/// copies the values it wraps.
fn list_native() -> OpKind {
    OpKind::Function(Rc::new(|args: Vec<Value>| Ok(Outcome::Value(Value::List(args)))))
}

fn builtin_length(list: ValueIter<'_>) -> usize {
    list.len()
}

fn builtin_nth(index: NumberType, mut list: ValueIter<'_>) -> Result<Value, Error> {
    let len = list.len();
    if index.fract() != 0.0 {
        return Err(Error::type_error(format!("list index must be a whole number, got {index}")));
    }
    if index < 0.0 || index >= len as NumberType {
        return Err(ErrorKind::IndexOutOfBounds { index, len }.into());
    }
    list.nth(index as usize)
        .cloned()
        .ok_or_else(|| ErrorKind::IndexOutOfBounds { index, len }.into())
}

fn builtin_null(value: Value) -> bool {
    value.is_nil()
}

fn builtin_apply(callable: Callable, args: ValueIter<'_>) -> Result<Outcome, Error> {
    callable.invoke(args.cloned().collect())
}

fn builtin_error(args: ValueIter<'_>) -> Result<Value, Error> {
    let parts: Vec<String> = args.map(ToString::to_string).collect();
    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };
    Err(Error::eval(message))
}

//
// Special forms
//

fn special_quote(args: &[Value], _env: &Environment) -> Result<Outcome, Error> {
    Ok(Outcome::Value(args.first().cloned().unwrap_or(Value::Nil)))
}

/// `(lambda (params...) body...)`; several body forms run in sequence.
fn special_lambda(args: &[Value], env: &Environment) -> Result<Outcome, Error> {
    let Some((params, body)) = args.split_first() else {
        return Err(Error::arity_error(1, 0));
    };
    let body = match body {
        [] => Value::Nil,
        [single] => single.clone(),
        forms => form_call(progn_form(), forms.iter().cloned()),
    };
    let closure = Closure::new(params, body, env.clone())?;
    Ok(Outcome::Value(Value::Callable(Callable::Closure(Rc::new(closure)))))
}

/// `(if cond then [else])`. The branch is compiled only after the condition
/// has been evaluated, so a recursive call in a branch becomes more work for
/// the trampoline rather than a nested compilation.
fn special_if(args: &[Value], env: &Environment) -> Result<Outcome, Error> {
    let (condition, consequent, alternative) = match args {
        [c, t] => (c, t.clone(), Value::Nil),
        [c, t, e] => (c, t.clone(), e.clone()),
        _ => return Err(Error::arity_error(3, args.len())),
    };

    let scope = env.clone();
    let branch = Callable::native("if", move |values| {
        let chosen = if values.first().is_some_and(Value::is_true) {
            &consequent
        } else {
            &alternative
        };
        Ok(Outcome::Thunk(compile(&scope, chosen)))
    });

    let mut thunk = Thunk::new();
    thunk.push_call(branch, 1, form_call(sym("if"), args.iter().cloned()));
    thunk.merge(compile(env, condition));
    Ok(Outcome::Thunk(thunk))
}

/// `(progn e1 e2 ...)` evaluates left to right and yields the last value.
fn special_progn(args: &[Value], env: &Environment) -> Result<Outcome, Error> {
    let Some((first, rest)) = args.split_first() else {
        return Ok(Outcome::Value(Value::Nil));
    };

    let origin = form_call(sym("progn"), args.iter().cloned());
    let mut thunk = Thunk::new();
    for expr in rest.iter().rev() {
        let scope = env.clone();
        let expr = expr.clone();
        let next = Callable::native("progn", move |_previous| {
            Ok(Outcome::Thunk(compile(&scope, &expr)))
        });
        thunk.push_call(next, 1, origin.clone());
    }
    thunk.merge(compile(env, first));
    Ok(Outcome::Thunk(thunk))
}

//
// Macros
//

/// Splits `((name init) ...)` into names and init forms. A bare `name` or
/// `(name)` binds nil.
pub(crate) fn parse_bindings(bindings: &Value) -> Result<(Vec<Value>, Vec<Value>), Error> {
    let Some(items) = bindings.as_list() else {
        return Err(Error::type_error(format!("expected a binding list, got {bindings}")));
    };

    let mut names = Vec::with_capacity(items.len());
    let mut inits = Vec::with_capacity(items.len());
    for binding in items {
        let (name, init) = match binding {
            Value::Symbol(_) => (binding.clone(), Value::Nil),
            Value::List(pair) => match pair.as_slice() {
                // Markers pass through so binding them reports a reserved name
                [name @ (Value::Symbol(_) | Value::Nil | Value::True)] => (name.clone(), Value::Nil),
                [name @ (Value::Symbol(_) | Value::Nil | Value::True), init] => {
                    (name.clone(), init.clone())
                }
                _ => return Err(Error::eval(format!("malformed binding {binding}"))),
            },
            _ => return Err(Error::eval(format!("malformed binding {binding}"))),
        };
        names.push(name);
        inits.push(init);
    }
    Ok((names, inits))
}

/// `(let ((a 1) (b 2)) body...)` becomes an immediately applied lambda. The
/// lambda takes the enclosing `recur` as its first parameter so the body
/// still refers to the enclosing function.
fn macro_let(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    let Some((bindings, body)) = args.split_first() else {
        return Err(Error::arity_error(1, 0));
    };
    let (names, inits) = parse_bindings(bindings)?;

    let params = iter::once(sym(RECUR_SYMBOL)).chain(names).collect();
    let lambda = form_call(
        lambda_form(),
        iter::once(Value::List(params)).chain(body.iter().cloned()),
    );
    Ok(Value::List(
        iter::once(lambda)
            .chain(iter::once(sym(RECUR_SYMBOL)))
            .chain(inits)
            .collect(),
    ))
}

fn macro_let_star(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    let Some((bindings, body)) = args.split_first() else {
        return Err(Error::arity_error(1, 0));
    };
    let (names, inits) = parse_bindings(bindings)?;

    let single_let = |binding: Option<Value>, body: Vec<Value>| {
        let bindings = Value::List(binding.into_iter().collect());
        form_call(let_form(), iter::once(bindings).chain(body))
    };

    let mut pairs = names
        .into_iter()
        .zip(inits)
        .map(|(name, init)| Value::List(vec![name, init]))
        .rev();
    let mut expansion = single_let(pairs.next(), body.to_vec());
    for binding in pairs {
        expansion = single_let(Some(binding), vec![expansion]);
    }
    Ok(expansion)
}

fn macro_and(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::True);
    };
    Ok(init.iter().rev().fold(last.clone(), |acc, condition| {
        form_call(if_form(), [condition.clone(), acc, Value::Nil])
    }))
}

/// `(or a b)` yields the first true operand, evaluating each one at most
/// once:
///
/// ```text
/// ((lambda (recur v k) (if v v (k recur))) recur a (lambda (recur) b))
/// ```
fn macro_or(args: &[Value], _env: &Environment) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::Nil);
    };
    Ok(init.iter().rev().fold(last.clone(), |acc, condition| {
        let (value, rest) = (sym("v"), sym("k"));
        let test = form_call(
            if_form(),
            [value.clone(), value.clone(), Value::List(vec![rest.clone(), sym(RECUR_SYMBOL)])],
        );
        let chooser = form_call(lambda_form(), [Value::List(vec![sym(RECUR_SYMBOL), value, rest]), test]);
        let deferred = form_call(lambda_form(), [Value::List(vec![sym(RECUR_SYMBOL)]), acc]);
        Value::List(vec![chooser, sym(RECUR_SYMBOL), condition.clone(), deferred])
    }))
}

fn form_call(op: Value, args: impl IntoIterator<Item = Value>) -> Value {
    Value::List(iter::once(op).chain(args).collect())
}

fn if_form() -> Value {
    Value::Callable(IF.to_callable())
}

fn progn_form() -> Value {
    Value::Callable(PROGN.to_callable())
}

fn lambda_form() -> Value {
    Value::Callable(LAMBDA.to_callable())
}

fn let_form() -> Value {
    Value::Callable(LET.to_callable())
}

const IF: BuiltinOp = BuiltinOp {
    id: "if",
    op_kind: OpKind::SpecialForm(special_if),
    arity: Arity::AtLeast(2),
};

const PROGN: BuiltinOp = BuiltinOp {
    id: "progn",
    op_kind: OpKind::SpecialForm(special_progn),
    arity: Arity::Any,
};

const LAMBDA: BuiltinOp = BuiltinOp {
    id: "lambda",
    op_kind: OpKind::SpecialForm(special_lambda),
    arity: Arity::AtLeast(1),
};

const LET: BuiltinOp = BuiltinOp {
    id: "let",
    op_kind: OpKind::Macro(macro_let),
    arity: Arity::AtLeast(1),
};

/// Every builtin of the standard library.
pub fn builtin_ops() -> Vec<BuiltinOp> {
    fn fixed<Args, F: IntoOperation<Args>>(f: F) -> OpKind {
        OpKind::Function(f.into_operation())
    }

    fn variadic<Args, F: IntoVariadicOperation<Args>>(f: F) -> OpKind {
        OpKind::Function(f.into_variadic_operation())
    }

    let op = |id, op_kind, arity| BuiltinOp { id, op_kind, arity };

    vec![
        // Arithmetic
        op("+", variadic::<(NumIter<'static>,), _>(builtin_add), Arity::Any),
        op("-", variadic::<(NumberType, NumIter<'static>), _>(builtin_sub), Arity::AtLeast(1)),
        op("*", variadic::<(NumIter<'static>,), _>(builtin_mul), Arity::Any),
        op("/", variadic::<(NumberType, NumIter<'static>), _>(builtin_div), Arity::AtLeast(1)),
        // Comparison and logic
        op("=", variadic::<(Value, ValueIter<'static>), _>(builtin_eq), Arity::AtLeast(2)),
        op(">", variadic::<(NumberType, NumIter<'static>), _>(builtin_gt), Arity::AtLeast(2)),
        op("<", variadic::<(NumberType, NumIter<'static>), _>(builtin_lt), Arity::AtLeast(2)),
        op(">=", variadic::<(NumberType, NumIter<'static>), _>(builtin_ge), Arity::AtLeast(2)),
        op("<=", variadic::<(NumberType, NumIter<'static>), _>(builtin_le), Arity::AtLeast(2)),
        op("not", fixed::<(Value,), _>(builtin_not), Arity::Exact(1)),
        // Lists
        op("cons", fixed::<(Value, Value), _>(builtin_cons), Arity::Exact(2)),
        op("car", fixed::<(ValueIter<'static>,), _>(builtin_car), Arity::Exact(1)),
        op("cdr", fixed::<(ValueIter<'static>,), _>(builtin_cdr), Arity::Exact(1)),
        op("list", list_native(), Arity::Any),
        op("length", fixed::<(ValueIter<'static>,), _>(builtin_length), Arity::Exact(1)),
        op("nth", fixed::<(NumberType, ValueIter<'static>), _>(builtin_nth), Arity::Exact(2)),
        op("null?", fixed::<(Value,), _>(builtin_null), Arity::Exact(1)),
        // Calling
        op("call", call_native(), Arity::AtLeast(1)),
        op("apply", fixed::<(Callable, ValueIter<'static>), _>(builtin_apply), Arity::Exact(2)),
        op("error", variadic::<(ValueIter<'static>,), _>(builtin_error), Arity::Any),
        // Special forms
        op("quote", OpKind::SpecialForm(special_quote), Arity::Exact(1)),
        LAMBDA,
        IF,
        PROGN,
        // Macros
        LET,
        op("let*", OpKind::Macro(macro_let_star), Arity::AtLeast(1)),
        op("and", OpKind::Macro(macro_and), Arity::Any),
        op("or", OpKind::Macro(macro_or), Arity::Any),
    ]
}

fn call_native() -> OpKind {
    let call = call_operation();
    OpKind::Function(Rc::new(move |args: Vec<Value>| call.invoke(args)))
}

/// The standard library as a symbol table, including the root `recur`
/// binding (nil outside any closure).
pub fn standard_library() -> SymbolTable {
    let mut table = SymbolTable::new();
    for op in builtin_ops() {
        table.define(op.id, Value::Callable(op.to_callable()));
    }
    table.define(RECUR_SYMBOL, Value::Nil);
    table
}
