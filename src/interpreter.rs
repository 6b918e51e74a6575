//! Rule rewriting and grounded dispatch.
//!
//! An expression is reduced by the first of these strategies that produces anything:
//!
//! 1. rules stored with exactly this expression as their pattern,
//! 2. rules whose pattern unifies with the expression, renamed apart first,
//! 3. a host function, when the head is a grounded function or a registered name,
//! 4. evaluating every child and, if any of them changed, evaluating the rebuilt expression.
//!
//! Evaluation always terminates with data. Running out of depth, an ambiguous argument
//! or a failing host function each become an `(Error <culprit> <Cause>)` atom in place
//! of a result.

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::atom::{Atom, AtomKind, EQUALS, ErrorCause};
use crate::index::rule_parts;
use crate::memory::{Memory, OtherHasher};
use crate::registry::{Evaluation, Registry};
use crate::unify::{rename_apart, substitute, unify};

/// Expressions entered on the current call path, innermost first.
struct Path<'a> {
    atom: &'a Atom,
    parent: Option<&'a Path<'a>>,
}

impl Path<'_> {
    fn contains(&self, atom: &Atom) -> bool {
        let mut current = Some(self);
        while let Some(step) = current {
            if step.atom == atom {
                return true;
            }
            current = step.parent;
        }
        false
    }
}

/// State shared by one call to [`Interpreter::eval`].
#[derive(Default)]
struct Context {
    cache: HashMap<Atom, Vec<Atom>, OtherHasher>,
}

pub struct Interpreter {
    memory: Arc<Memory>,
    registry: Arc<Registry>,
    max_depth: usize,
    max_results: usize,
    fresh: AtomicU64,
}

impl Interpreter {
    pub fn new(memory: Arc<Memory>, registry: Arc<Registry>) -> Self {
        let (max_depth, max_results) = (memory.config().max_depth, memory.config().max_results);
        Self { memory, registry, max_depth, max_results, fresh: AtomicU64::new(0) }
    }
    pub fn with_limits(mut self, max_depth: usize, max_results: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self.max_results = max_results.max(1);
        self
    }
    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// All distinct results of `atom`, at most the configured number of them.
    pub fn eval(&self, atom: &Atom) -> Vec<Atom> {
        let mut context = Context::default();
        let mut results = self.eval_atom(atom, 0, None, &mut context);
        results.truncate(self.max_results);
        results
    }

    fn eval_atom(&self, atom: &Atom, depth: usize, path: Option<&Path<'_>>, context: &mut Context) -> Vec<Atom> {
        if depth > self.max_depth {
            debug!(%atom, depth, "evaluation depth exceeded");
            return vec![Atom::error(atom, ErrorCause::MaxDepthExceeded)];
        }
        let AtomKind::Expression(children) = atom.kind() else {
            return vec![atom.clone()];
        };
        if children.is_empty() || atom.is_error() {
            return vec![atom.clone()];
        }
        // re-entering an expression on the same path leaves it as it is
        if path.is_some_and(|p| p.contains(atom)) {
            trace!(%atom, "cycle");
            return vec![atom.clone()];
        }
        if let Some(cached) = context.cache.get(atom) {
            return cached.clone();
        }
        let here = Path { atom, parent: path };
        let results = self.reduce(atom, children, depth, &here, context);
        if !results.iter().any(Atom::is_error) {
            context.cache.insert(atom.clone(), results.clone());
        }
        results
    }

    fn reduce(&self, atom: &Atom, children: &[Atom], depth: usize, path: &Path<'_>, context: &mut Context) -> Vec<Atom> {
        let exact = self.exact_rules(atom, depth, path, context);
        if !exact.is_empty() {
            return exact;
        }
        let general = self.general_rules(atom, depth, path, context);
        if !general.is_empty() {
            return general;
        }
        if let Some(applied) = self.apply_grounded(atom, children, depth, path, context) {
            return applied;
        }
        self.congruence(atom, children, depth, path, context)
    }

    fn fresh_suffix(&self) -> u64 {
        self.fresh.fetch_add(1, Ordering::Relaxed)
    }

    // strategy 1: rules stored under this very expression
    fn exact_rules(&self, atom: &Atom, depth: usize, path: &Path<'_>, context: &mut Context) -> Vec<Atom> {
        let result = Atom::fresh_variable(&format!("result'{}", self.fresh_suffix()));
        let pattern = Atom::expr(vec![Atom::known(EQUALS), atom.clone(), result]);
        let mut results = Collector::new(self.max_results);
        for answer in self.memory.query(&pattern) {
            let Some((lhs, template)) = rule_parts(&answer.atom) else {
                continue;
            };
            if lhs != atom {
                continue;
            }
            self.memory.get(&answer.atom);
            results.extend(self.eval_atom(template, depth + 1, Some(path), context));
            if results.is_full() {
                break;
            }
        }
        results.into_vec()
    }

    // strategy 2: rules whose pattern unifies with the expression
    fn general_rules(&self, atom: &Atom, depth: usize, path: &Path<'_>, context: &mut Context) -> Vec<Atom> {
        let mut results = Collector::new(self.max_results);
        for rule in self.memory.rules_for(atom) {
            let Some((lhs, _)) = rule_parts(&rule) else {
                debug!(%rule, "malformed rule skipped");
                continue;
            };
            if lhs == atom {
                continue;
            }
            let renamed = rename_apart(&rule, self.fresh_suffix());
            let Some((pattern, template)) = rule_parts(&renamed) else {
                continue;
            };
            let Some(binding) = unify(pattern, atom) else {
                continue;
            };
            trace!(%atom, %rule, "rule applies");
            self.memory.get(&rule);
            let rewritten = substitute(template, &binding);
            results.extend(self.eval_atom(&rewritten, depth + 1, Some(path), context));
            if results.is_full() {
                break;
            }
        }
        results.into_vec()
    }

    // strategy 3: host functions
    fn apply_grounded(
        &self,
        atom: &Atom,
        children: &[Atom],
        depth: usize,
        path: &Path<'_>,
        context: &mut Context,
    ) -> Option<Vec<Atom>> {
        let (head, args) = children.split_first()?;
        let (func, evaluation) = self.registry.resolve(head)?;
        let args = match evaluation {
            Evaluation::Lazy => args.to_vec(),
            Evaluation::Applicative => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    let mut results = self.eval_atom(arg, depth + 1, Some(path), context);
                    if results.len() != 1 {
                        debug!(%atom, %arg, results = results.len(), "ambiguous argument");
                        return Some(vec![Atom::error(atom, ErrorCause::AmbiguousArgument)]);
                    }
                    let result = results.remove(0);
                    if result.is_error() {
                        return Some(vec![result]);
                    }
                    evaluated.push(result);
                }
                evaluated
            }
        };
        let mut applied = vec![head.clone()];
        applied.extend(args.iter().cloned());
        let applied = Atom::expr(applied);
        match catch_unwind(AssertUnwindSafe(|| func.call(&args))) {
            Ok(Ok(Some(result))) if result == *atom || result == applied => Some(vec![result]),
            Ok(Ok(Some(result))) => Some(self.eval_atom(&result, depth + 1, Some(path), context)),
            Ok(Ok(None)) => Some(vec![Atom::error(&applied, ErrorCause::NoResult)]),
            Ok(Err(e)) => {
                debug!(function = func.name(), error = %e, "grounded function failed");
                Some(vec![Atom::error(&applied, e.cause())])
            }
            Err(_) => {
                warn!(function = func.name(), "grounded function panicked");
                Some(vec![Atom::error(&applied, ErrorCause::GroundedPanicked)])
            }
        }
    }

    // strategy 4: evaluate the children, rebuild if anything changed
    fn congruence(&self, atom: &Atom, children: &[Atom], depth: usize, path: &Path<'_>, context: &mut Context) -> Vec<Atom> {
        let mut combinations: Vec<Vec<Atom>> = vec![Vec::with_capacity(children.len())];
        for child in children {
            let results = self.eval_atom(child, depth + 1, Some(path), context);
            let mut extended = Vec::with_capacity(combinations.len() * results.len());
            'outer: for prefix in &combinations {
                for result in &results {
                    if extended.len() >= self.max_results {
                        break 'outer;
                    }
                    let mut next = prefix.clone();
                    next.push(result.clone());
                    extended.push(next);
                }
            }
            combinations = extended;
        }
        let mut results = Collector::new(self.max_results);
        for combination in combinations {
            if combination.iter().zip(children).all(|(c, original)| c == original) {
                results.push(atom.clone());
                continue;
            }
            let rebuilt = Atom::expr(combination);
            if let Some(error) = rebuilt.children().and_then(|c| c.iter().find(|c| c.is_error())) {
                results.push(error.clone());
                continue;
            }
            results.extend(self.eval_atom(&rebuilt, depth + 1, Some(path), context));
        }
        results.into_vec()
    }
}

/// Distinct results in first-seen order, up to a limit.
struct Collector {
    seen: HashSet<Atom, OtherHasher>,
    results: Vec<Atom>,
    limit: usize,
}

impl Collector {
    fn new(limit: usize) -> Self {
        Self { seen: HashSet::default(), results: Vec::new(), limit }
    }
    fn push(&mut self, atom: Atom) {
        if !self.is_full() && self.seen.insert(atom.clone()) {
            self.results.push(atom);
        }
    }
    fn extend(&mut self, atoms: impl IntoIterator<Item = Atom>) {
        for atom in atoms {
            self.push(atom);
        }
    }
    fn is_full(&self) -> bool {
        self.results.len() >= self.limit
    }
    fn into_vec(self) -> Vec<Atom> {
        self.results
    }
}
