//! Pattern/instance unification.
//!
//! Unification is worklist based so deeply nested terms never grow the call stack.
//! Both sides are fully resolved through the current [`Binding`] before they are
//! compared, an unbound variable is only bound after an occurs check, and expressions
//! are only descended into when their arities agree. A failed unification is a plain
//! `None`, never an error.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use crate::atom::{Atom, AtomKind};
use crate::memory::OtherHasher;

// ------------- Binding -------------
/// An immutable substitution from variables to atoms. Extending a binding yields a new one.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Binding {
    map: HashMap<Box<str>, Atom, OtherHasher>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
    /// Direct value of a variable, without following chains.
    pub fn get(&self, variable: &Atom) -> Option<&Atom> {
        variable.as_variable().and_then(|name| self.map.get(name))
    }
    /// Direct value of the variable named `name` (without the `$`).
    pub fn get_by_name(&self, name: &str) -> Option<&Atom> {
        self.map.get(name)
    }
    /// Value of a variable after following variable-to-variable chains and substituting.
    pub fn resolved(&self, variable: &Atom) -> Option<Atom> {
        self.get(variable).map(|_| substitute(variable, self))
    }
    /// Returns a new binding with `variable` bound to `value`. Non-variables and self
    /// bindings leave the binding unchanged.
    pub fn extend(&self, variable: &Atom, value: &Atom) -> Binding {
        let mut extended = self.clone();
        if let Some(name) = variable.as_variable() {
            if variable != value {
                extended.map.insert(name.into(), value.clone());
            }
        }
        extended
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Atom)> {
        self.map.iter().map(|(k, v)| (k.as_ref(), v))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{")?;
        for (i, (name, value)) in pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "${name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Follows variable chains until reaching an unbound variable or a non-variable.
/// `None` signals a cyclic chain.
fn resolve(atom: &Atom, binding: &Binding) -> Option<Atom> {
    let mut current = atom.clone();
    let mut steps = 0;
    while let Some(next) = binding.get(&current) {
        steps += 1;
        if steps > binding.len() {
            return None;
        }
        current = next.clone();
    }
    Some(current)
}

/// Whether `variable` occurs in `atom` once every bound variable is resolved.
pub fn occurs_in(variable: &Atom, atom: &Atom, binding: &Binding) -> bool {
    let mut stack = vec![atom.clone()];
    let mut seen: HashSet<Atom, OtherHasher> = HashSet::default();
    while let Some(next) = stack.pop() {
        let Some(next) = resolve(&next, binding) else {
            return true;
        };
        match next.kind() {
            AtomKind::Variable(_) if next == *variable => return true,
            AtomKind::Expression(children) => {
                if next.has_variables() && seen.insert(next.clone()) {
                    stack.extend(children.iter().cloned());
                }
            }
            _ => (),
        }
    }
    false
}

pub fn unify(pattern: &Atom, instance: &Atom) -> Option<Binding> {
    unify_with(pattern, instance, &Binding::new())
}

/// Extends `binding` so that `pattern` and `instance` become structurally identical.
pub fn unify_with(pattern: &Atom, instance: &Atom, binding: &Binding) -> Option<Binding> {
    let mut binding = binding.clone();
    let mut work = vec![(pattern.clone(), instance.clone())];
    while let Some((left, right)) = work.pop() {
        let left = resolve(&left, &binding)?;
        let right = resolve(&right, &binding)?;
        if left == right {
            continue;
        }
        match (left.kind(), right.kind()) {
            (AtomKind::Variable(name), _) => {
                if occurs_in(&left, &right, &binding) {
                    return None;
                }
                binding.map.insert(name.clone(), right.clone());
            }
            (_, AtomKind::Variable(name)) => {
                if occurs_in(&right, &left, &binding) {
                    return None;
                }
                binding.map.insert(name.clone(), left.clone());
            }
            (AtomKind::Expression(ls), AtomKind::Expression(rs)) => {
                if ls.len() != rs.len() {
                    return None;
                }
                // reversed so that children are visited left to right
                for (l, r) in ls.iter().zip(rs.iter()).rev() {
                    work.push((l.clone(), r.clone()));
                }
            }
            _ => return None,
        }
    }
    Some(binding)
}

/// Replaces bound variables, following chains. Unchanged subterms are shared, not rebuilt.
pub fn substitute(atom: &Atom, binding: &Binding) -> Atom {
    if binding.is_empty() {
        return atom.clone();
    }
    let mut chain = Vec::new();
    substitute_inner(atom, binding, &mut chain)
}

fn substitute_inner<'a>(atom: &'a Atom, binding: &'a Binding, chain: &mut Vec<&'a str>) -> Atom {
    match atom.kind() {
        AtomKind::Variable(name) => match binding.get_by_name(name) {
            // a variable already being expanded on this chain stays as it is
            Some(value) if !chain.contains(&name.as_ref()) => {
                chain.push(name);
                let substituted = substitute_inner(value, binding, chain);
                chain.pop();
                substituted
            }
            _ => atom.clone(),
        },
        AtomKind::Expression(children) => {
            if !atom.has_variables() {
                return atom.clone();
            }
            let mut changed = false;
            let mut substituted = Vec::with_capacity(children.len());
            for child in children {
                let next = substitute_inner(child, binding, chain);
                changed |= !next.ptr_eq(child);
                substituted.push(next);
            }
            if changed { Atom::expr(substituted) } else { atom.clone() }
        }
        _ => atom.clone(),
    }
}

/// Renames every variable `$x` to `$x'<suffix>` so a stored rule cannot capture the
/// variables of the expression it is applied to.
pub fn rename_apart(atom: &Atom, suffix: u64) -> Atom {
    match atom.kind() {
        AtomKind::Variable(name) => Atom::fresh_variable(&format!("{name}'{suffix}")),
        AtomKind::Expression(children) if atom.has_variables() => {
            Atom::expr(children.iter().map(|c| rename_apart(c, suffix)).collect())
        }
        _ => atom.clone(),
    }
}
