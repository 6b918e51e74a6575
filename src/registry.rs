//! Name-keyed registry of host functions.
//!
//! A registered function becomes a grounded atom `#<name>`. An expression is dispatched
//! to it either when its head is that grounded atom or when its head is the symbol with
//! the registered name, so `(+ 1 2)` as written in a script reaches the host `+`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::atom::{Atom, GroundedFn};
use crate::error::Result;
use crate::memory::OtherHasher;

/// How the arguments of a host function are handed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// Every argument is evaluated to a single result first.
    Applicative,
    /// Arguments are passed as written. Used by functions that treat code as data.
    Lazy,
}

#[derive(Debug, Default)]
pub struct Registry {
    functions: RwLock<HashMap<Box<str>, (Atom, Evaluation), OtherHasher>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `name`, replacing any earlier registration, and returns the
    /// grounded function atom.
    pub fn register<F>(&self, name: &str, func: F) -> Result<Atom>
    where
        F: Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static,
    {
        self.insert(name, func, Evaluation::Applicative)
    }
    pub fn register_lazy<F>(&self, name: &str, func: F) -> Result<Atom>
    where
        F: Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static,
    {
        self.insert(name, func, Evaluation::Lazy)
    }

    fn insert<F>(&self, name: &str, func: F, evaluation: Evaluation) -> Result<Atom>
    where
        F: Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static,
    {
        let atom = Atom::function(name, func)?;
        let mut functions = self.functions.write().unwrap_or_else(PoisonError::into_inner);
        if functions.insert(name.into(), (atom.clone(), evaluation)).is_some() {
            debug!(name, "grounded function replaced");
        }
        Ok(atom)
    }

    /// The function an expression with this head dispatches to, if any.
    pub fn resolve(&self, head: &Atom) -> Option<(GroundedFn, Evaluation)> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        let (name, direct) = match (head.as_function(), head.as_symbol()) {
            (Some(func), _) => (func.name(), Some(func)),
            (None, Some(symbol)) => (symbol, None),
            _ => return None,
        };
        match (functions.get(name), direct) {
            (Some((_, evaluation)), Some(func)) => Some((func.clone(), *evaluation)),
            (Some((atom, evaluation)), None) => atom.as_function().map(|f| (f.clone(), *evaluation)),
            // unregistered grounded functions are still callable
            (None, Some(func)) => Some((func.clone(), Evaluation::Applicative)),
            (None, None) => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<Atom> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        functions.get(name).map(|(atom, _)| atom.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = functions.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }
}
