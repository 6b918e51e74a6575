//! The assembled runtime.
//!
//! [`Runtime`] owns a [`Memory`], the host function [`Registry`] with the standard library
//! registered and protected, and an [`Interpreter`] over both. Scripts are parsed and run
//! statement by statement: plain atoms are stored, `!` statements are evaluated.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::agent::{AGENT_FUNCTIONS, AgentDriver, Environment};
use crate::atom::{Atom, EQUALS, ERROR, ErrorCause, FALSE, TRUE, TYPE_OF};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::memory::{Answer, Memory};
use crate::parser::{Statement, parse, parse_all, parse_script};
use crate::registry::Registry;
use crate::scheduler::{self, MaintenanceHandle};
use crate::stdlib::{self, IMPORTANCE, PRELUDE, RESULTS, TRUTH, TYPES};

/// A store, its host functions and an interpreter over both, with the standard library
/// and the rule prelude installed.
pub struct Runtime {
    config: RuntimeConfig,
    memory: Arc<Memory>,
    registry: Arc<Registry>,
    interpreter: Arc<Interpreter>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let memory = Arc::new(Memory::new(config.clone()));
        let registry = Arc::new(Registry::new());
        stdlib::install(&registry, Arc::clone(&memory))?;
        let interpreter = Arc::new(Interpreter::new(Arc::clone(&memory), Arc::clone(&registry)));
        let runtime = Self { config, memory, registry, interpreter };

        let vocabulary = [EQUALS, TYPE_OF, ERROR, TRUE, FALSE, RESULTS, TRUTH, IMPORTANCE, TYPES];
        for name in vocabulary.into_iter().chain(ErrorCause::all().into_iter().map(|c| c.name())) {
            runtime.memory.protect(&Atom::symbol(name)?);
        }
        for name in runtime.registry.names() {
            runtime.protect_function(&name)?;
        }
        for rule in parse_all(PRELUDE)? {
            runtime.memory.protect(&rule);
        }
        debug!(atoms = runtime.memory.len(), functions = runtime.registry.names().len(), "runtime ready");
        Ok(runtime)
    }
    pub fn with_defaults() -> Result<Self> {
        Self::new(RuntimeConfig::default())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
    pub fn memory(&self) -> Arc<Memory> {
        Arc::clone(&self.memory)
    }
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
    pub fn interpreter(&self) -> Arc<Interpreter> {
        Arc::clone(&self.interpreter)
    }

    fn protect_function(&self, name: &str) -> Result<()> {
        self.memory.protect(&Atom::symbol(name)?);
        if let Some(function) = self.registry.get(name) {
            self.memory.protect(&function);
        }
        Ok(())
    }

    /// Registers a host function and protects its name from forgetting.
    pub fn register<F>(&self, name: &str, func: F) -> Result<Atom>
    where
        F: Fn(&[Atom]) -> Result<Option<Atom>> + Send + Sync + 'static,
    {
        let function = self.registry.register(name, func)?;
        self.protect_function(name)?;
        Ok(function)
    }

    pub fn add(&self, atom: &Atom) -> Atom {
        self.memory.add(atom)
    }
    pub fn add_text(&self, text: &str) -> Result<Atom> {
        Ok(self.memory.add(&parse(text)?))
    }
    pub fn eval(&self, atom: &Atom) -> Vec<Atom> {
        self.interpreter.eval(atom)
    }
    pub fn eval_text(&self, text: &str) -> Result<Vec<Atom>> {
        Ok(self.interpreter.eval(&parse(text)?))
    }
    pub fn query(&self, pattern: &Atom) -> Vec<Answer> {
        self.memory.query(pattern)
    }
    pub fn query_text(&self, text: &str) -> Result<Vec<Answer>> {
        Ok(self.memory.query(&parse(text)?))
    }

    /// Runs a script: facts are stored, `!` statements are evaluated. Returns the results
    /// of each evaluation in script order.
    pub fn run(&self, script: &str) -> Result<Vec<Vec<Atom>>> {
        let mut results = Vec::new();
        for statement in parse_script(script)? {
            match statement {
                Statement::Fact(atom) => {
                    self.memory.add(&atom);
                }
                Statement::Eval(atom) => results.push(self.interpreter.eval(&atom)),
            }
        }
        Ok(results)
    }

    /// Starts background maintenance at the configured interval. Needs a tokio runtime.
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        scheduler::spawn(Arc::clone(&self.memory), Duration::from_millis(self.config.maintenance_interval_ms))
    }

    /// An agent driver acting in `environment`.
    pub fn agent(&self, environment: Arc<dyn Environment>) -> Result<AgentDriver> {
        let driver = AgentDriver::new(Arc::clone(&self.interpreter), environment)?;
        for name in AGENT_FUNCTIONS {
            self.protect_function(name)?;
        }
        Ok(driver)
    }
}
