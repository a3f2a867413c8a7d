//! Adapter layer turning strongly-typed Rust functions into natives.
//!
//! A native receives its evaluated arguments as an owned `Vec<Value>` and
//! hands back an [`Outcome`]. Writing every builtin against that erased
//! signature is tedious, so this module lets hosts register plain functions
//! such as `fn(NumberType, NumIter<'_>) -> Result<NumberType, Error>` and
//! performs arity checking and argument conversion on their behalf.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::ast::{Callable, NumberType, Outcome, Value};
use crate::error::Error;

/// Canonical erased native signature used by the execution engine.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Outcome, Error>;

/// Expected number of arguments for a builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(&self, count: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(expected) if count != expected => Err(Error::arity_error(expected, count)),
            Arity::AtLeast(min) if count < min => Err(Error::arity_error(min, count)),
            _ => Ok(()),
        }
    }
}

// =====================================================================
// Fixed parameters
// =====================================================================

/// Converts one evaluated argument into a typed parameter.
///
/// `Param<'a>` may borrow from the argument slot (iterators over a list
/// argument) or take it by value.
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Nil))
    }
}

// Covers NumberType and Callable via their TryInto impls
impl<T> FromParam for T
where
    Value: std::convert::TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let owned = std::mem::replace(value, Value::Nil);
        <Value as std::convert::TryInto<T>>::try_into(owned)
    }
}

impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value.as_list() {
            Some(items) => TypedValueIter::<K>::new(items),
            None => Err(Error::type_error(format!(
                "expected list, got {}",
                value.type_name()
            ))),
        }
    }
}

impl std::convert::TryInto<Callable> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Callable, Error> {
        match &self {
            Value::Callable(callable) => Ok(callable.clone()),
            other => Err(Error::illegal_call(other.to_string())),
        }
    }
}

// =====================================================================
// Typed iteration over list arguments and rest parameters
// =====================================================================

/// Describes how a slice of values is viewed element by element.
/// `precheck` validates the whole slice up front so `project` cannot fail.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    fn precheck(slice: &[Value]) -> Result<(), Error>;
    fn project<'a>(v: &'a Value) -> Self::Item<'a>;
}

#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: std::slice::Iter<'a, Value>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(K::project)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K> ExactSizeIterator for TypedValueIter<'a, K> where K: ValueElementKind {}
impl<'a, K> FusedIterator for TypedValueIter<'a, K> where K: ValueElementKind {}

#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item<'a> = &'a Value;

    fn precheck(_slice: &[Value]) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = NumberType;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        match slice.iter().find(|v| !matches!(v, Value::Number(_))) {
            Some(bad) => Err(Error::type_error(format!(
                "expected number, got {} ({})",
                bad,
                bad.type_name()
            ))),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        match v {
            Value::Number(n) => *n,
            // precheck rejected everything else
            _ => NumberType::NAN,
        }
    }
}

/// Borrowed iterator over arbitrary values.
pub type ValueIter<'a> = TypedValueIter<'a, ValueKind>;

/// Borrowed iterator over numbers; the whole sequence is type checked
/// before the first element is produced.
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

/// Builds rest parameters from the trailing argument slice.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedValueIter<'static, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        TypedValueIter::<K>::new(slice)
    }
}

// =====================================================================
// Return types
// =====================================================================

/// Normalizes builtin return types to `Result<Outcome, Error>`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Outcome, Error>;
}

impl<T> IntoOutcome for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_outcome(self) -> Result<Outcome, Error> {
        self.map(|v| Outcome::Value(v.into()))
    }
}

impl<T> IntoOutcome for T
where
    T: Into<Value>,
{
    fn into_outcome(self) -> Result<Outcome, Error> {
        Ok(Outcome::Value(self.into()))
    }
}

impl IntoOutcome for Result<Outcome, Error> {
    fn into_outcome(self) -> Result<Outcome, Error> {
        self
    }
}

/// Converts a fixed-arity Rust function into an erased native.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Rc<OperationFn>;
}

/// Converts a function ending in a rest parameter (`ValueIter` or
/// `NumIter`), optionally after fixed parameters, into an erased native.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Rc<OperationFn>;
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + 'static,
    R: IntoOutcome,
{
    fn into_variadic_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| {
            let rest = <I as FromRest>::from_rest(&args[..])?;
            (self)(rest).into_outcome()
        })
    }
}

macro_rules! impl_variadic_with_prefix {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + 'static,
            R: IntoOutcome,
        {
            fn into_variadic_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $( let $p = <$A as FromParam>::from_arg($v)?; )+
                            let rest = <I as FromRest>::from_rest(&*rest)?;
                            (self)( $( $p ),+, rest ).into_outcome()
                        }
                        _ => Err(Error::arity_error($prefix, len)),
                    }
                })
            }
        }
    };
}

impl_variadic_with_prefix!(1, v0, p0: A1);
impl_variadic_with_prefix!(2, v0, p0: A1, v1, p1: A2);
impl_variadic_with_prefix!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

macro_rules! impl_fixed_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R + 'static,
            $( $A: FromParam, )+
            R: IntoOutcome,
        {
            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $( let $p = <$A as FromParam>::from_arg($v)?; )+
                            (self)( $( $p ),+ ).into_outcome()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoOutcome,
{
    fn into_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }
            (self)().into_outcome()
        })
    }
}

impl_fixed_arity!(1, v0, p0: A1);
impl_fixed_arity!(2, v0, p0: A1, v1, p1: A2);
impl_fixed_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
impl_fixed_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);
