//! Secondary indexes over the stored atoms.
//!
//! The [`HeadIndex`] maps the identity of an expression's first child to the handles of
//! every stored expression with that head, so a query whose head is concrete only looks
//! at one bucket. Expressions whose head contains a variable can unify with any head, so
//! they are kept in an open bucket that every lookup includes. Rule facts `(= P T)` are
//! additionally bucketed by the head of their pattern `P` in the same way.
//!
//! The index is derived data. It is always safe to throw it away and [`HeadIndex::build`]
//! a fresh one from storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// used for the buckets of atom handles
use roaring::RoaringTreemap;
use tracing::debug;

use crate::atom::{Atom, EQUALS};
use crate::memory::{Handle, OtherHasher};

/// Splits a well formed rule fact `(= pattern template)` into its two sides.
pub fn rule_parts(atom: &Atom) -> Option<(&Atom, &Atom)> {
    match atom.children() {
        Some([head, pattern, template]) if head.as_symbol() == Some(EQUALS) => Some((pattern, template)),
        _ => None,
    }
}

/// Where a rule pattern is filed.
enum RuleKey {
    Head(Arc<str>),
    Wildcard,
    Malformed,
}

fn rule_key(pattern: &Atom) -> RuleKey {
    match pattern.head() {
        Some(head) if head.has_variables() => RuleKey::Wildcard,
        Some(head) => RuleKey::Head(Arc::from(head.id())),
        None if pattern.is_variable() => RuleKey::Wildcard,
        None => RuleKey::Malformed,
    }
}

// ------------- HeadIndex -------------
#[derive(Debug, Default)]
pub struct HeadIndex {
    heads: HashMap<Arc<str>, RoaringTreemap, OtherHasher>,
    open_heads: RoaringTreemap,
    rules: HashMap<Arc<str>, RoaringTreemap, OtherHasher>,
    wildcard_rules: RoaringTreemap,
}

impl HeadIndex {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn build<'a>(entries: impl Iterator<Item = (Handle, &'a Atom)>) -> Self {
        let mut index = Self::new();
        for (handle, atom) in entries {
            index.insert(handle, atom);
        }
        index
    }
    pub fn insert(&mut self, handle: Handle, atom: &Atom) {
        let Some(head) = atom.head() else {
            return;
        };
        if head.has_variables() {
            self.open_heads.insert(handle);
        } else {
            self.heads
                .entry(Arc::from(head.id()))
                .or_insert_with(RoaringTreemap::new)
                .insert(handle);
        }
        if head.as_symbol() != Some(EQUALS) {
            return;
        }
        match rule_parts(atom).map(|(pattern, _)| rule_key(pattern)) {
            Some(RuleKey::Head(key)) => {
                self.rules.entry(key).or_insert_with(RoaringTreemap::new).insert(handle);
            }
            Some(RuleKey::Wildcard) => {
                self.wildcard_rules.insert(handle);
            }
            Some(RuleKey::Malformed) => {
                debug!(rule = %atom, "rule pattern is not an expression, not indexed as a rule");
            }
            None => {
                debug!(rule = %atom, "equality fact without exactly two sides, not indexed as a rule");
            }
        }
    }
    /// Handles of the stored expressions that may unify with an expression headed by the
    /// ground atom `head`.
    pub fn with_head(&self, head: &Atom) -> RoaringTreemap {
        let mut candidates = self.open_heads.clone();
        if let Some(bucket) = self.heads.get(head.id()) {
            candidates |= bucket;
        }
        candidates
    }
    /// Handles of the rules that can possibly rewrite `expression`.
    pub fn rules_for(&self, expression: &Atom) -> RoaringTreemap {
        let mut candidates = self.wildcard_rules.clone();
        match expression.head() {
            Some(head) if !head.has_variables() => {
                if let Some(bucket) = self.rules.get(head.id()) {
                    candidates |= bucket;
                }
            }
            // an open head may match the pattern of any rule
            Some(_) => {
                for bucket in self.rules.values() {
                    candidates |= bucket;
                }
            }
            None => (),
        }
        candidates
    }
    /// Handles of the stored expressions that may unify with `(equals lhs ..)`: the rules
    /// for `lhs` plus every open-headed expression. A pattern without a head is not filed
    /// as a rule, so the whole `equals` bucket is searched instead.
    pub fn equalities_for(&self, lhs: &Atom, equals: &Atom) -> RoaringTreemap {
        if lhs.head().is_none() {
            return self.with_head(equals);
        }
        let mut candidates = self.rules_for(lhs);
        candidates |= &self.open_heads;
        candidates
    }
    pub fn heads(&self) -> usize {
        self.heads.len()
    }
    pub fn rule_count(&self) -> u64 {
        self.rules.values().map(|b| b.len()).sum::<u64>() + self.wildcard_rules.len()
    }
}

// ------------- Candidates -------------
/// Which stored atoms a query has to look at.
#[derive(Debug)]
pub enum Candidates {
    /// A bucket of the head index.
    Bucket(RoaringTreemap),
    /// A single atom, looked up by identity.
    Direct(Option<Handle>),
    /// Everything in storage.
    Scan,
}

// ------------- LatencyTracker -------------
/// Exponentially weighted moving average of query latency, updated without locks.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    // f64 microseconds stored as bits
    average: AtomicU64,
}

impl LatencyTracker {
    const WEIGHT: f64 = 0.1;

    pub fn new() -> Self {
        Self::default()
    }
    pub fn record(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1e6;
        let _ = self.average.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let current = f64::from_bits(bits);
            let next = if current == 0.0 {
                sample
            } else {
                current + Self::WEIGHT * (sample - current)
            };
            Some(next.to_bits())
        });
    }
    pub fn average(&self) -> Duration {
        Duration::from_secs_f64(f64::from_bits(self.average.load(Ordering::Acquire)) / 1e6)
    }
    pub fn reset(&self) {
        self.average.store(0f64.to_bits(), Ordering::Release);
    }
}
