//! Host functions installed into every runtime, and the rule prelude.

use std::sync::Arc;

use crate::atom::{Atom, ErrorCause, GroundedValue};
use crate::error::{AtomcladError, Result};
use crate::memory::Memory;
use crate::registry::Registry;
use crate::unify::substitute;
use crate::value::Truth;

/// Rules every runtime starts with.
pub const PRELUDE: &str = r#"
; conditionals are ordinary rewrite rules
(= (if True $then $else) $then)
(= (if False $then $else) $else)
"#;

pub const RESULTS: &str = "Results";
pub const TRUTH: &str = "Truth";
pub const IMPORTANCE: &str = "Importance";
pub const TYPES: &str = "Types";

#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }
}

fn number(atom: &Atom) -> Result<Number> {
    match atom.as_value() {
        Some(GroundedValue::Int(i)) => Ok(Number::Int(*i)),
        Some(GroundedValue::Float(x)) => Ok(Number::Float(*x)),
        _ => Err(AtomcladError::grounded(ErrorCause::TypeMismatch, format!("{atom} is not a number"))),
    }
}

fn arity<'a>(name: &str, args: &'a [Atom], expected: usize) -> Result<&'a [Atom]> {
    if args.len() == expected {
        Ok(args)
    } else {
        Err(AtomcladError::grounded(
            ErrorCause::ArityMismatch,
            format!("{name} takes {expected} arguments, got {}", args.len()),
        ))
    }
}

fn pair(name: &str, args: &[Atom]) -> Result<(Number, Number)> {
    let args = arity(name, args, 2)?;
    Ok((number(&args[0])?, number(&args[1])?))
}

fn text<'a>(atom: &'a Atom) -> Result<&'a str> {
    atom.as_str()
        .ok_or_else(|| AtomcladError::grounded(ErrorCause::TypeMismatch, format!("{atom} is not a string")))
}

type IntOp = fn(i64, i64) -> Option<i64>;
type FloatOp = fn(f64, f64) -> f64;

/// Integer arithmetic when both operands are integers, float arithmetic otherwise.
fn arithmetic(
    name: &'static str,
    int_op: IntOp,
    float_op: FloatOp,
    divides: bool,
) -> impl Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static {
    move |args: &[Atom]| {
        let (a, b) = pair(name, args)?;
        if divides && b.as_f64() == 0.0 {
            return Err(AtomcladError::grounded(ErrorCause::DivisionByZero, format!("{name} by zero")));
        }
        match (a, b) {
            (Number::Int(x), Number::Int(y)) => int_op(x, y)
                .map(|r| Some(Atom::int(r)))
                .ok_or_else(|| AtomcladError::grounded(ErrorCause::GroundedFailed, format!("{name} overflows"))),
            (x, y) => Atom::float(float_op(x.as_f64(), y.as_f64())).map(Some),
        }
    }
}

fn comparison(
    name: &'static str,
    op: fn(f64, f64) -> bool,
) -> impl Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static {
    move |args: &[Atom]| {
        let (a, b) = pair(name, args)?;
        Ok(Some(Atom::truth(op(a.as_f64(), b.as_f64()))))
    }
}

fn truth_atom(truth: Truth) -> Result<Atom> {
    Ok(Atom::expr(vec![Atom::known(TRUTH), Atom::float(truth.strength())?, Atom::float(truth.count())?]))
}

/// Registers the standard host functions. Functions that touch the store capture `memory`.
pub fn install(registry: &Registry, memory: Arc<Memory>) -> Result<()> {
    registry.register("+", arithmetic("+", i64::checked_add, |a, b| a + b, false))?;
    registry.register("-", arithmetic("-", i64::checked_sub, |a, b| a - b, false))?;
    registry.register("*", arithmetic("*", i64::checked_mul, |a, b| a * b, false))?;
    registry.register("/", arithmetic("/", i64::checked_div, |a, b| a / b, true))?;
    registry.register("%", arithmetic("%", i64::checked_rem, |a, b| a % b, true))?;

    registry.register("<", comparison("<", |a, b| a < b))?;
    registry.register(">", comparison(">", |a, b| a > b))?;
    registry.register("<=", comparison("<=", |a, b| a <= b))?;
    registry.register(">=", comparison(">=", |a, b| a >= b))?;
    // structural identity, so 1 and 1.0 differ
    registry.register("==", |args: &[Atom]| {
        let args = arity("==", args, 2)?;
        Ok(Some(Atom::truth(args[0] == args[1])))
    })?;

    registry.register("concat", |args: &[Atom]| {
        let mut joined = String::new();
        for arg in args {
            joined.push_str(text(arg)?);
        }
        Ok(Some(Atom::string(joined)))
    })?;
    registry.register("str-len", |args: &[Atom]| {
        let args = arity("str-len", args, 1)?;
        Ok(Some(Atom::int(text(&args[0])?.chars().count() as i64)))
    })?;

    let store = Arc::clone(&memory);
    registry.register_lazy("add-atom", move |args: &[Atom]| {
        let args = arity("add-atom", args, 1)?;
        store.add(&args[0]);
        Ok(Some(Atom::unit()))
    })?;

    let store = Arc::clone(&memory);
    registry.register_lazy("match", move |args: &[Atom]| {
        let args = arity("match", args, 2)?;
        let (pattern, template) = (&args[0], &args[1]);
        let mut results = vec![Atom::known(RESULTS)];
        results.extend(store.query(pattern).iter().map(|answer| substitute(template, &answer.binding)));
        Ok(Some(Atom::expr(results)))
    })?;

    let store = Arc::clone(&memory);
    registry.register("get-type", move |args: &[Atom]| {
        let args = arity("get-type", args, 1)?;
        let mut types = vec![Atom::known(TYPES)];
        types.extend(store.type_of(&args[0]));
        Ok(Some(Atom::expr(types)))
    })?;

    let store = Arc::clone(&memory);
    registry.register("truth-of", move |args: &[Atom]| {
        let args = arity("truth-of", args, 1)?;
        match store.value_of(&args[0]) {
            Some(value) => truth_atom(value.truth).map(Some),
            None => Ok(None),
        }
    })?;

    let store = Arc::clone(&memory);
    registry.register("set-truth", move |args: &[Atom]| {
        let args = arity("set-truth", args, 3)?;
        let evidence = Truth::new(number(&args[1])?.as_f64(), number(&args[2])?.as_f64());
        truth_atom(store.update_truth(&args[0], evidence).truth).map(Some)
    })?;

    let store = Arc::clone(&memory);
    registry.register("boost-atom", move |args: &[Atom]| {
        let args = arity("boost-atom", args, 2)?;
        let Some(importance) = store.boost(&args[0], number(&args[1])?.as_f64()) else {
            return Ok(None);
        };
        Ok(Some(Atom::expr(vec![
            Atom::known(IMPORTANCE),
            Atom::float(importance.sti())?,
            Atom::float(importance.lti())?,
        ])))
    })?;
    Ok(())
}
