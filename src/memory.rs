//! The canonicalizing atom store.
//!
//! Every atom that enters [`Memory`] is interned: its children are interned first, then the
//! canonical identity string is claimed through an insert-if-absent on a sharded map, so
//! the first writer wins and every contender receives the winner's instance. Each stored
//! atom is kept together with its [`Value`] (truth, importance, last access time) behind
//! its own lock, and every metadata change is a pure function of the previous value.
//!
//! Queries and interning hold the read side of a coarse gate. Forgetting and index
//! rebuilds hold the write side, so a removal is never half visible: a query sees an atom
//! with its index entries or sees neither.

use core::hash::BuildHasherDefault;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

// used to keep the canonical atoms, concurrent and sharded
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use seahash::SeaHasher;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::atom::{Atom, AtomKind, TYPE_OF};
use crate::config::RuntimeConfig;
use crate::index::{Candidates, HeadIndex, LatencyTracker, rule_parts};
use crate::unify::{Binding, rename_apart, substitute, unify};
use crate::value::{Importance, Retention, Truth, Value};

// ------------- Handle -------------
pub type Handle = u64;

pub type HandleHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}
fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}

// ------------- Kept -------------
#[derive(Debug)]
struct Kept {
    handle: Handle,
    atom: Atom,
    value: Mutex<Value>,
}

impl Kept {
    fn value(&self) -> Value {
        *lock(&self.value)
    }
    fn update(&self, f: impl FnOnce(Value) -> Value) -> Value {
        let mut value = lock(&self.value);
        *value = f(*value);
        *value
    }
}

// ------------- Answer -------------
/// A stored atom that matched a query pattern, with the binding that made it match.
#[derive(Clone, Debug)]
pub struct Answer {
    pub atom: Atom,
    pub binding: Binding,
}

impl Answer {
    /// The pattern variable `name` (without `$`) fully resolved through the binding.
    pub fn get(&self, name: &str) -> Option<Atom> {
        self.binding.get_by_name(name).map(|value| substitute(value, &self.binding))
    }
}

// ------------- ForgetReport -------------
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForgetReport {
    pub examined: usize,
    pub evicted: usize,
    pub remaining: usize,
    pub rebuilt_index: bool,
}

// ------------- Memory -------------
#[derive(Debug)]
pub struct Memory {
    config: RuntimeConfig,
    kept: DashMap<Box<str>, Arc<Kept>, OtherHasher>,
    lookup: DashMap<Handle, Arc<Kept>, HandleHasher>,
    next_handle: AtomicU64,
    index: RwLock<HeadIndex>,
    gate: RwLock<()>,
    clock: AtomicU64,
    protected: DashSet<Box<str>, OtherHasher>,
    latency: LatencyTracker,
    // distinguishes the variables of stored atoms from those of query patterns
    renames: AtomicU64,
    pressure: Notify,
}

impl Memory {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            kept: DashMap::default(),
            lookup: DashMap::default(),
            next_handle: AtomicU64::new(1),
            index: RwLock::new(HeadIndex::new()),
            gate: RwLock::new(()),
            clock: AtomicU64::new(0),
            protected: DashSet::default(),
            latency: LatencyTracker::new(),
            renames: AtomicU64::new(0),
            pressure: Notify::new(),
        }
    }
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    // ------------- logical clock -------------
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }
    /// Advances the logical clock and returns the new time.
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn default_value(&self) -> Value {
        Value::new(
            Truth::new(self.config.default_truth_strength, self.config.default_truth_count),
            Importance::new(self.config.default_sti, self.config.default_lti),
            self.now(),
        )
    }
    fn retention(&self) -> Retention {
        Retention {
            sensitivity: self.config.confidence_sensitivity,
            half_life: self.config.recency_half_life,
        }
    }

    /// Returns the canonical instance of `atom`, storing it and its children if new.
    /// Adding an atom that is already stored only refreshes and boosts it.
    pub fn add(&self, atom: &Atom) -> Atom {
        let _gate = read(&self.gate);
        let (kept, created) = self.intern(atom);
        if !created {
            let (now, boost) = (self.now(), self.config.access_boost);
            kept.update(|v| Value { importance: v.importance.boost(boost), time: now, ..v });
        }
        kept.atom.clone()
    }

    // callers hold the gate
    fn intern(&self, atom: &Atom) -> (Arc<Kept>, bool) {
        if let Some(existing) = self.kept.get(atom.id()).map(|k| Arc::clone(k.value())) {
            return (existing, false);
        }
        // children are interned before the parent claims its identity
        let canonical = match atom.kind() {
            AtomKind::Expression(children) => {
                let interned: Vec<Atom> = children.iter().map(|c| self.intern(c).0.atom.clone()).collect();
                if interned.iter().zip(children).all(|(i, c)| i.ptr_eq(c)) {
                    atom.clone()
                } else {
                    Atom::expr(interned)
                }
            }
            _ => atom.clone(),
        };
        let (kept, created) = match self.kept.entry(canonical.id().into()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
                let kept = Arc::new(Kept { handle, atom: canonical, value: Mutex::new(self.default_value()) });
                self.lookup.insert(handle, Arc::clone(&kept));
                vacant.insert(Arc::clone(&kept));
                (kept, true)
            }
        };
        if created {
            write(&self.index).insert(kept.handle, &kept.atom);
            trace!(atom = %kept.atom, handle = kept.handle, "interned");
            if self.kept.len() > self.config.high_water {
                self.pressure.notify_one();
            }
        }
        (kept, created)
    }

    /// Lookup without insertion. A hit counts as a use: importance is boosted and the
    /// access time refreshed.
    pub fn get(&self, atom: &Atom) -> Option<Atom> {
        self.get_by_id(atom.id())
    }
    pub fn get_by_id(&self, id: &str) -> Option<Atom> {
        let _gate = read(&self.gate);
        let kept = self.kept.get(id).map(|k| Arc::clone(k.value()))?;
        let (now, boost) = (self.now(), self.config.get_boost);
        kept.update(|v| Value { importance: v.importance.boost(boost), time: now, ..v });
        Some(kept.atom.clone())
    }
    pub fn contains(&self, atom: &Atom) -> bool {
        self.kept.contains_key(atom.id())
    }
    /// Current metadata of a stored atom, without counting as a use.
    pub fn value_of(&self, atom: &Atom) -> Option<Value> {
        self.kept.get(atom.id()).map(|k| k.value().value())
    }

    /// Revises the truth of `atom` (storing it first if needed) with new evidence. A
    /// revision that moves confidence by more than the configured threshold boosts the
    /// atom in proportion to the change.
    pub fn update_truth(&self, atom: &Atom, evidence: Truth) -> Value {
        let _gate = read(&self.gate);
        let (kept, _) = self.intern(atom);
        let (sensitivity, now) = (self.config.confidence_sensitivity, self.now());
        let (threshold, scale) = (self.config.revision_threshold, self.config.revision_boost);
        kept.update(|v| {
            let truth = v.truth.merge(&evidence);
            let gained = (truth.confidence(sensitivity) - v.truth.confidence(sensitivity)).abs();
            let importance = if gained > threshold { v.importance.boost(scale * gained) } else { v.importance };
            Value { truth, importance, time: now }
        })
    }

    pub fn boost(&self, atom: &Atom, amount: f64) -> Option<Importance> {
        let _gate = read(&self.gate);
        let kept = self.kept.get(atom.id()).map(|k| Arc::clone(k.value()))?;
        Some(kept.update(|v| Value { importance: v.importance.boost(amount), ..v }).importance)
    }

    /// Marks `atom` as never to be forgotten, storing it if needed.
    pub fn protect(&self, atom: &Atom) -> Atom {
        let canonical = self.add(atom);
        self.protected.insert(canonical.id().into());
        canonical
    }
    pub fn is_protected(&self, atom: &Atom) -> bool {
        self.protected.contains(atom.id())
    }

    fn candidates(&self, pattern: &Atom) -> Candidates {
        match pattern.kind() {
            AtomKind::Variable(_) => Candidates::Scan,
            AtomKind::Symbol(_) | AtomKind::Grounded(_) => {
                Candidates::Direct(self.kept.get(pattern.id()).map(|k| k.value().handle))
            }
            AtomKind::Expression(_) => match pattern.head() {
                None => Candidates::Direct(self.kept.get(pattern.id()).map(|k| k.value().handle)),
                Some(head) if head.has_variables() => Candidates::Scan,
                Some(head) => {
                    let index = read(&self.index);
                    match rule_parts(pattern) {
                        Some((lhs, _)) if lhs.is_expression() => Candidates::Bucket(index.equalities_for(lhs, head)),
                        _ => Candidates::Bucket(index.with_head(head)),
                    }
                }
            },
        }
    }

    /// All stored atoms that unify with `pattern`, each with its binding. Atoms whose
    /// confidence is below the match floor are skipped before unification is tried.
    pub fn query(&self, pattern: &Atom) -> Vec<Answer> {
        let _gate = read(&self.gate);
        let started = Instant::now();
        let sensitivity = self.config.confidence_sensitivity;
        let floor = self.config.min_match_confidence;
        let limit = self.config.max_query_results;
        let mut answers = Vec::new();
        let mut examine = |kept: &Kept| -> bool {
            // stored variables are parts of rules, not facts, and would match anything
            if kept.atom.is_variable() || kept.value().truth.confidence(sensitivity) < floor {
                return true;
            }
            let stored = if pattern.has_variables() && kept.atom.has_variables() {
                rename_apart(&kept.atom, self.renames.fetch_add(1, Ordering::Relaxed))
            } else {
                kept.atom.clone()
            };
            if let Some(binding) = unify(pattern, &stored) {
                answers.push(Answer { atom: kept.atom.clone(), binding });
            }
            answers.len() < limit
        };
        match self.candidates(pattern) {
            Candidates::Direct(handle) => {
                if let Some(kept) = handle.and_then(|h| self.lookup.get(&h).map(|k| Arc::clone(k.value()))) {
                    examine(&kept);
                }
            }
            Candidates::Bucket(bucket) => {
                for handle in bucket.iter().take(self.config.max_candidates) {
                    let Some(kept) = self.lookup.get(&handle).map(|k| Arc::clone(k.value())) else {
                        continue;
                    };
                    if !examine(&kept) {
                        break;
                    }
                }
            }
            Candidates::Scan => {
                let snapshot: Vec<Arc<Kept>> = self
                    .lookup
                    .iter()
                    .take(self.config.max_candidates)
                    .map(|k| Arc::clone(k.value()))
                    .collect();
                for kept in snapshot {
                    if !examine(&kept) {
                        break;
                    }
                }
            }
        }
        self.latency.record(started.elapsed());
        answers
    }

    /// Rule facts `(= P T)` whose pattern could rewrite `expression`, in storage order.
    pub fn rules_for(&self, expression: &Atom) -> Vec<Atom> {
        let _gate = read(&self.gate);
        let bucket = read(&self.index).rules_for(expression);
        bucket
            .iter()
            .take(self.config.max_candidates)
            .filter_map(|handle| self.lookup.get(&handle).map(|k| k.value().atom.clone()))
            .collect()
    }

    /// Types asserted for `atom` through `(: atom type)` facts.
    pub fn type_of(&self, atom: &Atom) -> Vec<Atom> {
        let variable = Atom::fresh_variable("type");
        let pattern = Atom::expr(vec![Atom::known(TYPE_OF), atom.clone(), variable.clone()]);
        self.query(&pattern)
            .into_iter()
            .filter_map(|answer| answer.binding.resolved(&variable))
            .collect()
    }

    /// One maintenance pass: decays the importance of every atom, then forgets atoms whose
    /// retention has fallen below the threshold. Over the high-water mark the lowest of them
    /// go first until the target size is reached; otherwise they all go once there are
    /// enough of them. Runs under the write side of the gate.
    pub fn decay_and_forget(&self) -> ForgetReport {
        let _gate = write(&self.gate);
        let now = self.now();
        let retention = self.retention();
        let (sti_rate, lti_rate, absorption) =
            (self.config.sti_decay, self.config.lti_decay, self.config.lti_absorption);

        let mut scored: Vec<(f64, Arc<Kept>)> = Vec::with_capacity(self.lookup.len());
        for entry in self.lookup.iter() {
            let kept = entry.value();
            let value = kept.update(|v| Value { importance: v.importance.decay(sti_rate, lti_rate, absorption), ..v });
            if kept.atom.is_variable() || self.protected.contains(kept.atom.id()) {
                continue;
            }
            scored.push((value.retention(now, retention), Arc::clone(kept)));
        }
        let examined = self.lookup.len();

        // only atoms below the retention threshold are ever candidates, even under pressure
        let mut eligible: Vec<(f64, Arc<Kept>)> =
            scored.into_iter().filter(|(score, _)| *score < self.config.min_retention).collect();
        let mut doomed: Vec<Arc<Kept>> = if examined > self.config.high_water {
            let target = (self.config.high_water as f64 * self.config.target_fraction).floor() as usize;
            eligible.sort_by(|a, b| a.0.total_cmp(&b.0));
            let excess = examined.saturating_sub(target);
            eligible.into_iter().take(excess).map(|(_, kept)| kept).collect()
        } else if eligible.len() as f64 > self.config.opportunistic_fraction * examined as f64 {
            eligible.into_iter().map(|(_, kept)| kept).collect()
        } else {
            Vec::new()
        };

        if !doomed.is_empty() {
            // parts of surviving expressions stay, so interned children remain canonical
            let doomed_handles: HashSet<Handle, HandleHasher> = doomed.iter().map(|k| k.handle).collect();
            let mut referenced: HashSet<Box<str>, OtherHasher> = HashSet::default();
            let mut stack: Vec<Atom> = Vec::new();
            for entry in self.lookup.iter() {
                if !doomed_handles.contains(entry.key()) {
                    if let Some(children) = entry.value().atom.children() {
                        stack.extend(children.iter().cloned());
                    }
                }
            }
            while let Some(atom) = stack.pop() {
                if referenced.insert(atom.id().into()) {
                    if let Some(children) = atom.children() {
                        stack.extend(children.iter().cloned());
                    }
                }
            }
            doomed.retain(|kept| !referenced.contains(kept.atom.id()));
        }

        for kept in &doomed {
            self.kept.remove(kept.atom.id());
            self.lookup.remove(&kept.handle);
        }
        let rebuilt_index = !doomed.is_empty();
        if rebuilt_index {
            self.rebuild_locked();
        }
        let report = ForgetReport { examined, evicted: doomed.len(), remaining: self.kept.len(), rebuilt_index };
        debug!(?report, "decay and forget");
        report
    }

    /// Reconstructs the head index from storage and swaps it in.
    pub fn rebuild_index(&self) {
        let _gate = write(&self.gate);
        self.rebuild_locked();
    }

    // callers hold the write side of the gate
    fn rebuild_locked(&self) {
        let snapshot: Vec<Arc<Kept>> = self.lookup.iter().map(|k| Arc::clone(k.value())).collect();
        let fresh = HeadIndex::build(snapshot.iter().map(|k| (k.handle, &k.atom)));
        *write(&self.index) = fresh;
        self.latency.reset();
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }
    pub fn indexed_heads(&self) -> usize {
        read(&self.index).heads()
    }
    pub fn indexed_rules(&self) -> u64 {
        read(&self.index).rule_count()
    }

    /// Snapshot of every stored atom.
    pub fn atoms(&self) -> Vec<Atom> {
        self.lookup.iter().map(|k| k.value().atom.clone()).collect()
    }
    /// Snapshot of every stored atom with its metadata, in insertion order.
    pub fn entries(&self) -> Vec<(Atom, Value)> {
        let mut entries: Vec<(Handle, Atom, Value)> =
            self.lookup.iter().map(|k| (k.value().handle, k.value().atom.clone(), k.value().value())).collect();
        entries.sort_by_key(|(handle, _, _)| *handle);
        entries.into_iter().map(|(_, atom, value)| (atom, value)).collect()
    }

    /// Stores `atom` if needed and overwrites its metadata. Used when restoring snapshots.
    pub(crate) fn restore_value(&self, atom: &Atom, value: Value) -> Atom {
        let _gate = read(&self.gate);
        let (kept, _) = self.intern(atom);
        kept.update(|_| value);
        kept.atom.clone()
    }

    /// Signalled whenever the store grows past its high-water mark.
    pub(crate) fn pressure(&self) -> &Notify {
        &self.pressure
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
