//! Atomclad – a symbolic reasoning runtime over a shared store of interned atoms.
//!
//! Everything the runtime knows and does is an *atom*, one of four variants:
//! * A symbol names something: `Pizza`, `=`, `True`.
//! * A variable is a placeholder in a pattern: `$p`.
//! * An expression is an ordered sequence of atoms: `(Likes Sam Pizza)`.
//! * A grounded atom wraps a host value (`42`, `2.5`, `"text"`) or a host function.
//!
//! Atoms are immutable and identified by a canonical string derived from their
//! structure. The [`memory::Memory`] store interns them, so structurally equal atoms
//! share one instance, and attaches to each a [`value::Value`]: a truth value built
//! from accumulated evidence, a pair of short and long term importance weights and a
//! logical access time.
//!
//! ## Modules
//! * [`atom`] – The atom variants and their identity rule.
//! * [`value`] – Truth revision, confidence, importance boost and decay.
//! * [`unify`] – Bindings, unification with occurs check, substitution.
//! * [`index`] – The head index used for candidate selection.
//! * [`memory`] – The concurrent canonical store, queries and forgetting.
//! * [`registry`] and [`stdlib`] – Host functions reachable from expressions.
//! * [`interpreter`] – Rule rewriting with depth and cycle control.
//! * [`parser`] – The parenthesized surface syntax (grammar in `atom.pest`).
//! * [`scheduler`] – Periodic decay, forgetting and index rebuilds.
//! * [`agent`] – An agent loop whose decisions are themselves rules.
//! * [`persist`] – SQLite snapshots of a store.
//! * [`runtime`] – Everything above wired together.
//!
//! ## Rules are data
//! Behavior is added by storing equality facts `(= pattern template)`. Evaluating an
//! expression rewrites it with every rule whose pattern unifies with it, calls host
//! functions for registered heads and otherwise evaluates its parts. Failures during
//! evaluation never escape as errors, they come back as `(Error <culprit> <Cause>)` atoms.
//!
//! ## Attention and forgetting
//! Every use of an atom raises its short-term importance, informative truth revisions
//! raise it more, and each maintenance pass decays it. When the store grows past its
//! high-water mark, or enough of it has become unimportant, the least important atoms
//! are forgotten. Protected vocabulary and atoms still referenced by surviving
//! expressions are never removed.
//!
//! ## Quick Start
//! ```
//! use atomclad::runtime::Runtime;
//! let runtime = Runtime::with_defaults().unwrap();
//! let results = runtime
//!     .run(
//!         "
//!         (= (add Z $n) $n)
//!         (= (add (S $m) $n) (S (add $m $n)))
//!         !(add (S (S Z)) (S Z))
//!         ",
//!     )
//!     .unwrap();
//! assert_eq!(results[0][0].to_string(), "(S (S (S Z)))");
//! ```

pub mod agent;
pub mod atom;
pub mod config;
pub mod error;
pub mod index;
pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod persist;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod stdlib;
pub mod unify;
pub mod value;

pub use atom::{Atom, AtomKind, ErrorCause};
pub use config::RuntimeConfig;
pub use error::{AtomcladError, Result};
pub use memory::{Answer, Memory};
pub use runtime::Runtime;
pub use unify::Binding;
pub use value::{Importance, Truth, Value};
