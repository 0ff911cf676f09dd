//! Builtin function registry
//!
//! A fixed table of name to function pointer, looked up case-insensitively
//! at compile time. Arity is checked when the call is parsed, so the
//! implementations can index their arguments freely through [`arg`].

mod cast;
mod date_time;
mod logical;
mod math;
mod text;

pub use cast::cast_value;

use super::ast::Expr;
use super::error::EvalResult;
use super::eval::Env;
use crate::domain::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Receives already-evaluated arguments
pub type EagerFn = fn(&[Value], &Env) -> EvalResult<Value>;

/// Receives unevaluated arguments and decides what to evaluate
pub type LazyFn = fn(&[Expr], &Env) -> EvalResult<Value>;

pub enum Implementation {
    Eager(EagerFn),
    Lazy(LazyFn),
}

pub struct Builtin {
    /// Canonical upper-case name
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub implementation: Implementation,
}

impl Builtin {
    pub const fn eager(name: &'static str, min_args: usize, max_args: Option<usize>, f: EagerFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation: Implementation::Eager(f),
        }
    }

    pub const fn lazy(name: &'static str, min_args: usize, max_args: Option<usize>, f: LazyFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation: Implementation::Lazy(f),
        }
    }

    /// Returns true if a call with `count` arguments is well-formed
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human-readable arity, e.g. `2`, `1 to 3`, `at least 1`
    pub fn arity_label(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.name)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn registry() -> &'static HashMap<&'static str, &'static Builtin> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static Builtin>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        logical::BUILTINS
            .iter()
            .chain(math::BUILTINS)
            .chain(text::BUILTINS)
            .chain(date_time::BUILTINS)
            .chain(cast::BUILTINS)
            .map(|builtin| (builtin.name, builtin))
            .collect()
    })
}

/// Finds a builtin by name, ignoring case
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    registry().get(name.to_ascii_uppercase().as_str()).copied()
}

/// All builtin names, sorted
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

static NULL: Value = Value::Null;

/// Argument `index`, or null when the call omitted it
pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

/// Numeric argument; `None` when absent or not numeric
pub(crate) fn num_arg(args: &[Value], index: usize) -> Option<f64> {
    arg(args, index).to_number()
}

/// Lower-cased text of a unit/type argument
pub(crate) fn unit_arg(args: &[Value], index: usize) -> String {
    arg(args, index).to_text().trim().to_lowercase()
}
