//! The closed set of term variants and their canonical identity.
//!
//! An [`Atom`] is a cheap, reference counted handle to an immutable node. Every node
//! carries its canonical identity string, computed once at construction:
//!
//! * Symbol `foo` has identity `foo`
//! * Variable `$x` has identity `$x`
//! * Grounded values have identities starting with `#` (`#42`, `#2.5`, `#"text"`)
//! * Grounded functions have identity `#<name>`
//! * Expressions have identity `(` + child identities joined by a space + `)`
//!
//! Names are validated so that identities of different variants never collide.
//! Two atoms are equal when they are the same instance or share an identity; after
//! interning through [`crate::memory::Memory`] the first check is the one that answers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AtomcladError, Result};

lazy_static! {
    static ref NUMERIC: Regex = Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?$").unwrap();
}

/// Signature of host functions wrapped by grounded atoms.
pub type HostFn = dyn Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync;

// ------------- Atom -------------
#[derive(Clone)]
pub struct Atom(Arc<Node>);

struct Node {
    id: Box<str>,
    kind: AtomKind,
    // no variable occurs anywhere below
    ground: bool,
}

#[derive(Clone)]
pub enum AtomKind {
    Symbol(Box<str>),
    Variable(Box<str>),
    Expression(Vec<Atom>),
    Grounded(Grounded),
}

#[derive(Clone)]
pub enum Grounded {
    Value(GroundedValue),
    Function(GroundedFn),
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroundedValue {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Clone)]
pub struct GroundedFn {
    name: Box<str>,
    func: Arc<HostFn>,
}

impl GroundedFn {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn call(&self, args: &[Atom]) -> Result<Option<Atom>> {
        (self.func)(args)
    }
}

impl fmt::Debug for GroundedFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GroundedFn({})", self.name)
    }
}

fn check_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AtomcladError::structure(format!("{what} name must not be empty")));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';'))
    {
        return Err(AtomcladError::structure(format!(
            "{what} name {name:?} contains the reserved character {c:?}"
        )));
    }
    if name.starts_with('$') || name.starts_with('#') {
        return Err(AtomcladError::structure(format!(
            "{what} name {name:?} must not start with '$' or '#'"
        )));
    }
    if NUMERIC.is_match(name) {
        return Err(AtomcladError::structure(format!(
            "{what} name {name:?} would read back as a number"
        )));
    }
    Ok(())
}

/// Surface form of a string, quoted and escaped.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Atom {
    fn from_kind(id: String, kind: AtomKind) -> Self {
        let ground = match &kind {
            AtomKind::Variable(_) => false,
            AtomKind::Expression(children) => children.iter().all(|c| c.0.ground),
            _ => true,
        };
        Self(Arc::new(Node { id: id.into_boxed_str(), kind, ground }))
    }

    pub fn symbol(name: &str) -> Result<Atom> {
        check_name(name, "symbol")?;
        Ok(Self::known(name))
    }
    pub fn variable(name: &str) -> Result<Atom> {
        check_name(name, "variable")?;
        Ok(Self::fresh_variable(name))
    }
    pub fn expr(children: Vec<Atom>) -> Atom {
        let mut id = String::from("(");
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                id.push(' ');
            }
            id.push_str(child.id());
        }
        id.push(')');
        Self::from_kind(id, AtomKind::Expression(children))
    }
    pub fn int(value: i64) -> Atom {
        Self::from_kind(format!("#{value}"), AtomKind::Grounded(Grounded::Value(GroundedValue::Int(value))))
    }
    /// Non-finite floats have no surface form and are rejected.
    pub fn float(value: f64) -> Result<Atom> {
        if !value.is_finite() {
            return Err(AtomcladError::structure(format!("float {value} is not finite")));
        }
        Ok(Self::from_kind(
            format!("#{value:?}"),
            AtomKind::Grounded(Grounded::Value(GroundedValue::Float(value))),
        ))
    }
    pub fn string(value: impl Into<String>) -> Atom {
        let value = value.into();
        Self::from_kind(
            format!("#{}", quote(&value)),
            AtomKind::Grounded(Grounded::Value(GroundedValue::Str(value))),
        )
    }
    pub fn function<F>(name: &str, func: F) -> Result<Atom>
    where
        F: Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static,
    {
        check_name(name, "function")?;
        Ok(Self::from_kind(
            format!("#<{name}>"),
            AtomKind::Grounded(Grounded::Function(GroundedFn { name: name.into(), func: Arc::new(func) })),
        ))
    }

    // Constructors for names the crate controls. They skip validation.
    pub(crate) fn known(name: &str) -> Atom {
        debug_assert!(check_name(name, "symbol").is_ok(), "invalid built-in symbol {name}");
        Self::from_kind(name.to_string(), AtomKind::Symbol(name.into()))
    }
    pub(crate) fn fresh_variable(name: &str) -> Atom {
        Self::from_kind(format!("${name}"), AtomKind::Variable(name.into()))
    }

    pub fn truth(value: bool) -> Atom {
        Self::known(if value { TRUE } else { FALSE })
    }
    pub fn unit() -> Atom {
        Self::expr(Vec::new())
    }

    /// `(Error <culprit> <Cause>)`
    pub fn error(culprit: &Atom, cause: ErrorCause) -> Atom {
        Self::expr(vec![Self::known(ERROR), culprit.clone(), Self::known(cause.name())])
    }

    /// Canonical identity string.
    pub fn id(&self) -> &str {
        &self.0.id
    }
    pub fn kind(&self) -> &AtomKind {
        &self.0.kind
    }
    pub fn ptr_eq(&self, other: &Atom) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.kind(), AtomKind::Symbol(_))
    }
    pub fn is_variable(&self) -> bool {
        matches!(self.kind(), AtomKind::Variable(_))
    }
    pub fn is_expression(&self) -> bool {
        matches!(self.kind(), AtomKind::Expression(_))
    }
    pub fn is_grounded(&self) -> bool {
        matches!(self.kind(), AtomKind::Grounded(_))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self.kind() {
            AtomKind::Symbol(name) => Some(name),
            _ => None,
        }
    }
    pub fn as_variable(&self) -> Option<&str> {
        match self.kind() {
            AtomKind::Variable(name) => Some(name),
            _ => None,
        }
    }
    pub fn children(&self) -> Option<&[Atom]> {
        match self.kind() {
            AtomKind::Expression(children) => Some(children),
            _ => None,
        }
    }
    /// First child of a non-empty expression.
    pub fn head(&self) -> Option<&Atom> {
        self.children().and_then(|c| c.first())
    }
    pub fn as_value(&self) -> Option<&GroundedValue> {
        match self.kind() {
            AtomKind::Grounded(Grounded::Value(value)) => Some(value),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&GroundedFn> {
        match self.kind() {
            AtomKind::Grounded(Grounded::Function(func)) => Some(func),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self.as_value() {
            Some(GroundedValue::Int(i)) => Some(*i),
            _ => None,
        }
    }
    pub fn as_number(&self) -> Option<f64> {
        match self.as_value() {
            Some(GroundedValue::Int(i)) => Some(*i as f64),
            Some(GroundedValue::Float(x)) => Some(*x),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self.as_value() {
            Some(GroundedValue::Str(s)) => Some(s),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_symbol() {
            Some(TRUE) => Some(true),
            Some(FALSE) => Some(false),
            _ => None,
        }
    }

    /// True for `(Error <culprit> <Cause>)` atoms.
    pub fn is_error(&self) -> bool {
        self.error_cause().is_some()
    }
    pub fn error_cause(&self) -> Option<&str> {
        match self.children() {
            Some([head, _, cause]) if head.as_symbol() == Some(ERROR) => cause.as_symbol(),
            _ => None,
        }
    }

    /// Whether any variable occurs in this atom.
    pub fn has_variables(&self) -> bool {
        !self.0.ground
    }
    /// Whether a grounded function occurs in this atom.
    pub fn has_functions(&self) -> bool {
        let mut stack = vec![self];
        while let Some(atom) = stack.pop() {
            match atom.kind() {
                AtomKind::Grounded(Grounded::Function(_)) => return true,
                AtomKind::Expression(children) => stack.extend(children.iter()),
                _ => (),
            }
        }
        false
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.id() == other.id()
    }
}
impl Eq for Atom {}
impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind() {
            AtomKind::Symbol(name) => write!(f, "{name}"),
            AtomKind::Variable(name) => write!(f, "${name}"),
            AtomKind::Grounded(Grounded::Value(GroundedValue::Int(i))) => write!(f, "{i}"),
            AtomKind::Grounded(Grounded::Value(GroundedValue::Float(x))) => write!(f, "{x:?}"),
            AtomKind::Grounded(Grounded::Value(GroundedValue::Str(s))) => write!(f, "{}", quote(s)),
            AtomKind::Grounded(Grounded::Function(func)) => write!(f, "{}", func.name()),
            AtomKind::Expression(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}
impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

// ------------- Vocabulary -------------
pub const EQUALS: &str = "=";
pub const TYPE_OF: &str = ":";
pub const ERROR: &str = "Error";
pub const TRUE: &str = "True";
pub const FALSE: &str = "False";

/// Categories carried by error atoms produced during evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCause {
    MaxDepthExceeded,
    GroundedFailed,
    GroundedPanicked,
    NoResult,
    AmbiguousArgument,
    TypeMismatch,
    ArityMismatch,
    DivisionByZero,
}

impl ErrorCause {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxDepthExceeded => "MaxDepthExceeded",
            Self::GroundedFailed => "GroundedFailed",
            Self::GroundedPanicked => "GroundedPanicked",
            Self::NoResult => "NoResult",
            Self::AmbiguousArgument => "AmbiguousArgument",
            Self::TypeMismatch => "TypeMismatch",
            Self::ArityMismatch => "ArityMismatch",
            Self::DivisionByZero => "DivisionByZero",
        }
    }
    pub fn all() -> [Self; 8] {
        [
            Self::MaxDepthExceeded,
            Self::GroundedFailed,
            Self::GroundedPanicked,
            Self::NoResult,
            Self::AmbiguousArgument,
            Self::TypeMismatch,
            Self::ArityMismatch,
            Self::DivisionByZero,
        ]
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
