//! The agent loop.
//!
//! The loop itself holds no decision logic. One step is the evaluation of
//! `(AgentStep Self)`, and the prelude installs a single rule for it that perceives,
//! lists the available actions, selects the one with the highest learned utility,
//! executes it and learns from the reward. Perception, selection, execution and learning
//! are host functions over the [`Environment`], reachable only through rules, so an agent
//! is reprogrammed by storing different rules.
//!
//! Learned utilities are ordinary truth values on `(Utility <action>)` atoms. An action
//! that was never tried counts as maximally useful, so every action gets explored.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::atom::{Atom, ErrorCause};
use crate::error::{AtomcladError, Result};
use crate::interpreter::Interpreter;
use crate::memory::Memory;
use crate::parser::parse_all;
use crate::registry::Registry;
use crate::value::Truth;

pub const AGENT_STEP: &str = "AgentStep";
pub const SELF: &str = "Self";
pub const GOAL_REACHED: &str = "GoalReached";
pub const UTILITY: &str = "Utility";
pub const PERCEPTS: &str = "Percepts";
pub const ACTIONS: &str = "Actions";
pub const OUTCOME: &str = "Outcome";
pub const LEARNED: &str = "Learned";

/// Host functions the agent rules call.
pub const AGENT_FUNCTIONS: [&str; 6] = ["perceive", "actions", "select-action", "execute", "learn", "total-reward"];

/// Rules that make up the default agent.
pub const AGENT_PRELUDE: &str = r#"
(= (AgentStep Self) (learn (execute (select-action (actions (perceive))))))
"#;

/// Symbols the agent rules are built from.
pub fn vocabulary() -> Vec<Atom> {
    [AGENT_STEP, SELF, GOAL_REACHED, UTILITY, PERCEPTS, ACTIONS, OUTCOME, LEARNED]
        .into_iter()
        .map(Atom::known)
        .collect()
}

/// The world an agent acts in.
pub trait Environment: Send + Sync {
    /// Current observations.
    fn perceive(&self) -> Vec<Atom>;
    /// Actions available in `state`, which is the `(Percepts ...)` expression of this step.
    fn actions(&self, state: &Atom) -> Vec<Atom>;
    /// Performs `action`, returning new observations and a reward.
    fn execute(&self, action: &Atom) -> (Vec<Atom>, f64);
    fn is_running(&self) -> bool;
}

fn tagged(tag: &str, items: impl IntoIterator<Item = Atom>) -> Atom {
    let mut children = vec![Atom::known(tag)];
    children.extend(items);
    Atom::expr(children)
}

fn single<'a>(name: &str, args: &'a [Atom]) -> Result<&'a Atom> {
    match args {
        [arg] => Ok(arg),
        _ => Err(AtomcladError::grounded(
            ErrorCause::ArityMismatch,
            format!("{name} takes one argument, got {}", args.len()),
        )),
    }
}

/// Items of a `(Tag item ...)` expression, if it carries `tag`.
fn items<'a>(tag: &str, atom: &'a Atom) -> Option<&'a [Atom]> {
    match atom.children() {
        Some([head, rest @ ..]) if head.as_symbol() == Some(tag) => Some(rest),
        _ => None,
    }
}

fn utility_of(action: &Atom) -> Atom {
    Atom::expr(vec![Atom::known(UTILITY), action.clone()])
}

/// Learned utility of `action`, optimistic when unknown.
pub fn utility(memory: &Memory, action: &Atom) -> f64 {
    memory.value_of(&utility_of(action)).map_or(1.0, |v| v.truth.strength())
}

/// Registers the agent host functions for `environment`, replacing earlier ones.
pub fn install(
    registry: &Registry,
    memory: Arc<Memory>,
    environment: Arc<dyn Environment>,
    reward: Arc<Mutex<f64>>,
) -> Result<()> {
    let (store, env) = (Arc::clone(&memory), Arc::clone(&environment));
    registry.register("perceive", move |_args: &[Atom]| {
        let percepts: Vec<Atom> = env.perceive().iter().map(|p| store.add(p)).collect();
        Ok(Some(tagged(PERCEPTS, percepts)))
    })?;

    let env = Arc::clone(&environment);
    registry.register("actions", move |args: &[Atom]| {
        let state = single("actions", args)?;
        Ok(Some(tagged(ACTIONS, env.actions(state))))
    })?;

    let store = Arc::clone(&memory);
    registry.register("select-action", move |args: &[Atom]| {
        let offered = single("select-action", args)?;
        let candidates = items(ACTIONS, offered).unwrap_or(std::slice::from_ref(offered));
        let mut best: Option<(&Atom, f64)> = None;
        for action in candidates {
            let score = utility(&store, action);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((action, score));
            }
        }
        Ok(best.map(|(action, score)| {
            debug!(%action, score, "action selected");
            action.clone()
        }))
    })?;

    let (store, env, total) = (Arc::clone(&memory), Arc::clone(&environment), Arc::clone(&reward));
    registry.register("execute", move |args: &[Atom]| {
        let action = single("execute", args)?;
        let (percepts, gained) = env.execute(action);
        for percept in &percepts {
            store.add(percept);
        }
        *total.lock().unwrap_or_else(PoisonError::into_inner) += gained;
        Ok(Some(Atom::expr(vec![Atom::known(OUTCOME), action.clone(), Atom::float(gained)?])))
    })?;

    let store = Arc::clone(&memory);
    registry.register("learn", move |args: &[Atom]| {
        let outcome = single("learn", args)?;
        let Some([action, gained]) = items(OUTCOME, outcome) else {
            return Err(AtomcladError::grounded(
                ErrorCause::TypeMismatch,
                format!("{outcome} is not an outcome"),
            ));
        };
        let gained = gained.as_number().unwrap_or(0.0);
        let learned = store.update_truth(&utility_of(action), Truth::new(gained.clamp(0.0, 1.0), 1.0));
        Ok(Some(Atom::expr(vec![Atom::known(LEARNED), action.clone(), Atom::float(learned.truth.strength())?])))
    })?;

    let total = Arc::clone(&reward);
    registry.register("total-reward", move |_args: &[Atom]| {
        Atom::float(*total.lock().unwrap_or_else(PoisonError::into_inner)).map(Some)
    })?;
    Ok(())
}

/// Outcome of [`AgentDriver::run`].
#[derive(Clone, Debug, Default)]
pub struct AgentReport {
    pub cycles: usize,
    pub goal_reached: bool,
    /// The environment reported that it stopped before the goal was reached.
    pub stopped: bool,
    pub total_reward: f64,
    /// Error atoms produced by agent steps.
    pub errors: Vec<Atom>,
}

/// Drives an agent: advances the clock, evaluates the step, checks the goal, repeats.
pub struct AgentDriver {
    interpreter: Arc<Interpreter>,
    environment: Arc<dyn Environment>,
    reward: Arc<Mutex<f64>>,
    step: Atom,
    goal: Atom,
    max_cycles: usize,
}

impl AgentDriver {
    /// Installs the agent functions and the agent prelude, then wraps them in a driver.
    pub fn new(interpreter: Arc<Interpreter>, environment: Arc<dyn Environment>) -> Result<Self> {
        let memory = Arc::clone(interpreter.memory());
        let reward = Arc::new(Mutex::new(0.0));
        install(interpreter.registry(), Arc::clone(&memory), Arc::clone(&environment), Arc::clone(&reward))?;
        for symbol in vocabulary() {
            memory.protect(&symbol);
        }
        for rule in parse_all(AGENT_PRELUDE)? {
            memory.protect(&rule);
        }
        let this = Atom::known(SELF);
        let step = memory.add(&Atom::expr(vec![Atom::known(AGENT_STEP), this.clone()]));
        let goal = memory.add(&Atom::expr(vec![Atom::known(GOAL_REACHED), this]));
        let max_cycles = memory.config().max_cycles;
        Ok(Self { interpreter, environment, reward, step, goal, max_cycles })
    }
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }
    pub fn total_reward(&self) -> f64 {
        *self.reward.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One agent step: the results of evaluating `(AgentStep Self)`.
    pub fn step(&self) -> Vec<Atom> {
        self.interpreter.memory().tick();
        self.interpreter.eval(&self.step)
    }

    /// Whether `(GoalReached Self)` evaluates to `True`.
    pub fn goal_reached(&self) -> bool {
        self.interpreter.eval(&self.goal).iter().any(|a| a.as_bool() == Some(true))
    }

    pub fn run(&self) -> AgentReport {
        let mut report = AgentReport::default();
        while report.cycles < self.max_cycles {
            if !self.environment.is_running() {
                report.stopped = true;
                break;
            }
            let results = self.step();
            report.cycles += 1;
            for error in results.into_iter().filter(Atom::is_error) {
                warn!(cycle = report.cycles, %error, "agent step failed");
                report.errors.push(error);
            }
            if self.goal_reached() {
                report.goal_reached = true;
                break;
            }
        }
        report.total_reward = self.total_reward();
        info!(
            cycles = report.cycles,
            goal_reached = report.goal_reached,
            stopped = report.stopped,
            total_reward = report.total_reward,
            errors = report.errors.len(),
            "agent run finished"
        );
        report
    }
}
