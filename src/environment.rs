//! Delegation-chain environments and construction-time symbol tables.
//!
//! An [`Environment`] is a binding table plus an optional link to its parent.
//! Creating a child never copies the parent's bindings; lookup walks the
//! chain outward instead. Handles are reference counted so any number of
//! closures can share one defining environment.
//!
//! A [`SymbolTable`] is the plain name-to-value map a host assembles before
//! an interpreter exists (the standard library, native extensions). It
//! carries the builtin registration API.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::ast::{Callable, NativeFn, Outcome, Value, is_reserved_symbol};
use crate::error::{Error, ErrorKind};
use crate::intooperation::{Arity, IntoOperation, IntoVariadicOperation, OperationFn};

struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

impl Scope {
    fn detach_into(&mut self, garbage: &mut Garbage) {
        garbage.values.extend(mem::take(self.bindings.get_mut()).into_values());
        garbage.scopes.extend(self.parent.take());
    }
}

// A scope may hold the only reference to a closure whose scope holds the
// next one, and so on for every level of user recursion.
impl Drop for Scope {
    fn drop(&mut self) {
        let mut garbage = Garbage::default();
        self.detach_into(&mut garbage);
        garbage.release();
    }
}

/// Values and scopes unlinked from their owners, waiting to be freed.
///
/// Releasing hollows out every uniquely owned entry before dropping it, so
/// freeing a chain of any length uses constant host stack.
#[derive(Default)]
pub(crate) struct Garbage {
    pub(crate) values: Vec<Value>,
    scopes: Vec<Environment>,
}

impl Garbage {
    pub(crate) fn release(mut self) {
        loop {
            if let Some(mut value) = self.values.pop() {
                value.detach_into(&mut self);
            } else if let Some(mut scope) = self.scopes.pop() {
                scope.detach_into(&mut self);
            } else {
                break;
            }
        }
    }
}

/// Shared handle to one level of lexical scope.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

impl Environment {
    /// Creates an empty root environment.
    pub fn new() -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Creates an empty environment delegating to `self`. O(1).
    pub fn child(&self) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// The outermost environment of the chain.
    pub fn root(&self) -> Environment {
        let mut scope = self;
        while let Some(parent) = scope.parent() {
            scope = parent;
        }
        scope.clone()
    }

    /// Resolves a symbol along the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent()?;
        }
    }

    /// Like [`Environment::get`], failing with an unknown-symbol error.
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name).ok_or_else(|| Error::unbound(name))
    }

    /// Whether `name` is bound at this level, ignoring parents.
    pub fn contains_local(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    /// Binds `name` in this scope.
    ///
    /// Reserved markers can never be bound. At the root a name can be bound
    /// only once; in a child scope binding always succeeds and shadows any
    /// outer binding.
    pub fn bind(&self, name: &str, value: Value) -> Result<(), Error> {
        if is_reserved_symbol(name) {
            return Err(ErrorKind::ReservedSymbol(name.to_owned()).into());
        }
        if self.is_root() && self.contains_local(name) {
            return Err(ErrorKind::AlreadyDefined(name.to_owned()).into());
        }
        self.define(name, value);
        Ok(())
    }

    /// Moves the bindings and parent link into `garbage` when no other handle
    /// shares this scope.
    pub(crate) fn detach_into(&mut self, garbage: &mut Garbage) {
        if let Some(scope) = Rc::get_mut(&mut self.0) {
            scope.detach_into(garbage);
        }
    }

    /// Unchecked binding used while seeding tables and entering closures.
    pub(crate) fn define(&self, name: &str, value: Value) {
        self.0.bindings.borrow_mut().insert(name.to_owned(), value);
    }

    /// Number of scopes between this environment and the root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut scope = self;
        while let Some(parent) = scope.parent() {
            depth += 1;
            scope = parent;
        }
        depth
    }

    /// All visible bindings sorted by name; inner bindings shadow outer ones.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut visible: BTreeMap<String, Value> = BTreeMap::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            for (name, value) in current.0.bindings.borrow().iter() {
                visible.entry(name.clone()).or_insert_with(|| value.clone());
            }
            scope = current.parent();
        }
        visible.into_iter().collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("depth", &self.depth())
            .field("bindings", &self.0.bindings.borrow().len())
            .finish()
    }
}

impl From<SymbolTable> for Environment {
    fn from(table: SymbolTable) -> Self {
        let env = Environment::new();
        for (name, value) in table.entries {
            env.define(&name, value);
        }
        env
    }
}

/// Name-to-value table used to seed a root environment.
#[derive(Clone, Default)]
pub struct SymbolTable {
    entries: BTreeMap<String, Value>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Adds or replaces an entry.
    pub fn define(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_owned(), value);
    }

    /// Merges `other` on top of this table; entries from `other` win.
    pub fn merge(&mut self, other: SymbolTable) {
        self.entries.extend(other.entries);
    }

    /// Registers a native working on the raw argument slice.
    ///
    /// ```
    /// use slicelisp::{Error, SymbolTable, Value};
    ///
    /// fn count(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len()))
    /// }
    ///
    /// let mut table = SymbolTable::new();
    /// table.register_builtin_function("count", count);
    /// ```
    pub fn register_builtin_function(
        &mut self,
        name: &str,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) {
        let wrapped: Rc<OperationFn> = Rc::new(move |args: Vec<Value>| func(&args).map(Outcome::Value));
        self.insert_native(name, wrapped);
    }

    /// Registers a strongly-typed Rust function with automatic argument
    /// conversion and arity checking.
    ///
    /// Supported parameter types are `NumberType`, `Callable`, `Value` and
    /// the list iterators `ValueIter<'_>` and `NumIter<'_>` (which also
    /// accept nil as the empty list). Return types may be anything
    /// `Into<Value>`, `Result<T, Error>` of such, or `Result<Outcome, Error>`
    /// to hand more work to the trampoline.
    ///
    /// ```
    /// use slicelisp::{NumberType, SymbolTable};
    ///
    /// fn hypot(a: NumberType, b: NumberType) -> NumberType {
    ///     (a * a + b * b).sqrt()
    /// }
    ///
    /// let mut table = SymbolTable::new();
    /// table.register_builtin_operation::<(NumberType, NumberType), _>("hypot", hypot);
    /// ```
    pub fn register_builtin_operation<Args, F>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.insert_native(name, func.into_operation());
    }

    /// Registers a function whose last parameter is a rest iterator.
    ///
    /// The [`Arity`] is checked against the total argument count before the
    /// function runs, since bounds on variadic operations are not derivable
    /// from the Rust signature.
    pub fn register_variadic_builtin_operation<Args, F>(&mut self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        let inner = func.into_variadic_operation();
        let wrapped: Rc<OperationFn> = Rc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            inner(args)
        });
        self.insert_native(name, wrapped);
    }

    /// Registers a native using the erased signature directly.
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(Vec<Value>) -> Result<Outcome, Error> + 'static,
    {
        self.define(name, Value::Callable(Callable::native(name, func)));
    }

    pub fn register_special_form<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value], &Environment) -> Result<Outcome, Error> + 'static,
    {
        self.define(name, Value::Callable(Callable::special_form(name, func)));
    }

    pub fn register_macro<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value], &Environment) -> Result<Value, Error> + 'static,
    {
        self.define(name, Value::Callable(Callable::macro_form(name, func)));
    }

    fn insert_native(&mut self, name: &str, func: Rc<OperationFn>) {
        self.define(name, Value::Callable(Callable::Native(NativeFn::from_operation(name, func))));
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
