use std::sync::{Arc, Mutex};

use atomclad::agent::{Environment, utility};
use atomclad::parser::parse;
use atomclad::{Atom, Runtime};

fn atom(text: &str) -> Atom {
    parse(text).expect("parse")
}

/// Two arms: `left` pays nothing, `right` pays one. Stops after `budget` pulls.
struct Bandit {
    pulls: Mutex<Vec<Atom>>,
    budget: usize,
}

impl Bandit {
    fn new(budget: usize) -> Arc<Self> {
        Arc::new(Self { pulls: Mutex::new(Vec::new()), budget })
    }
    fn pulls(&self) -> Vec<String> {
        self.pulls.lock().expect("pulls").iter().map(|a| a.to_string()).collect()
    }
}

impl Environment for Bandit {
    fn perceive(&self) -> Vec<Atom> {
        vec![atom(&format!("(Pulled {})", self.pulls.lock().expect("pulls").len()))]
    }
    fn actions(&self, _state: &Atom) -> Vec<Atom> {
        vec![atom("left"), atom("right")]
    }
    fn execute(&self, action: &Atom) -> (Vec<Atom>, f64) {
        self.pulls.lock().expect("pulls").push(action.clone());
        let reward = if action.as_symbol() == Some("right") { 1.0 } else { 0.0 };
        (vec![atom(&format!("(Paid {action})"))], reward)
    }
    fn is_running(&self) -> bool {
        self.pulls.lock().expect("pulls").len() < self.budget
    }
}

/// Offers nothing to do.
struct Idle;

impl Environment for Idle {
    fn perceive(&self) -> Vec<Atom> {
        Vec::new()
    }
    fn actions(&self, _state: &Atom) -> Vec<Atom> {
        Vec::new()
    }
    fn execute(&self, _action: &Atom) -> (Vec<Atom>, f64) {
        (Vec::new(), 0.0)
    }
    fn is_running(&self) -> bool {
        true
    }
}

#[test]
fn the_agent_learns_which_arm_pays() {
    let runtime = Runtime::with_defaults().expect("runtime");
    let bandit = Bandit::new(100);
    let driver = runtime.agent(bandit.clone()).expect("agent").with_max_cycles(10);
    let report = driver.run();

    assert_eq!(report.cycles, 10);
    assert!(!report.goal_reached);
    assert!(!report.stopped);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    // untried arms look best, ties go to the first offered
    let pulls = bandit.pulls();
    assert_eq!(pulls[0], "left");
    assert!(pulls[1..].iter().all(|p| p == "right"));
    assert_eq!(report.total_reward, 9.0);

    let memory = runtime.memory();
    assert_eq!(utility(&memory, &atom("left")), 0.5);
    assert_eq!(utility(&memory, &atom("right")), 1.0);
    assert_eq!(utility(&memory, &atom("up")), 1.0);
    // observations were stored
    assert!(memory.contains(&atom("(Paid right)")));
    assert!(memory.contains(&atom("(Pulled 3)")));
}

#[test]
fn a_goal_rule_ends_the_run() {
    let runtime = Runtime::with_defaults().expect("runtime");
    runtime.add_text("(= (GoalReached Self) (>= (total-reward) 3.0))").expect("parse");
    let driver = runtime.agent(Bandit::new(100)).expect("agent").with_max_cycles(50);
    let report = driver.run();
    assert!(report.goal_reached);
    assert_eq!(report.cycles, 4);
    assert_eq!(report.total_reward, 3.0);
}

#[test]
fn the_run_stops_with_the_environment() {
    let runtime = Runtime::with_defaults().expect("runtime");
    let driver = runtime.agent(Bandit::new(3)).expect("agent").with_max_cycles(10);
    let report = driver.run();
    assert!(report.stopped);
    assert_eq!(report.cycles, 3);
}

#[test]
fn storing_a_rule_reprograms_the_agent() {
    let runtime = Runtime::with_defaults().expect("runtime");
    runtime.add_text("(= (select-action $offered) left)").expect("parse");
    let bandit = Bandit::new(100);
    let report = runtime.agent(bandit.clone()).expect("agent").with_max_cycles(5).run();
    assert_eq!(report.cycles, 5);
    assert!(bandit.pulls().iter().all(|p| p == "left"));
    assert_eq!(report.total_reward, 0.0);
}

#[test]
fn failing_steps_are_reported_not_raised() {
    let runtime = Runtime::with_defaults().expect("runtime");
    let report = runtime.agent(Arc::new(Idle)).expect("agent").with_max_cycles(2).run();
    assert_eq!(report.cycles, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.error_cause() == Some("NoResult")));
}

#[test]
fn agent_vocabulary_is_protected() {
    let runtime = Runtime::with_defaults().expect("runtime");
    let _driver = runtime.agent(Arc::new(Idle)).expect("agent");
    let memory = runtime.memory();
    for name in ["AgentStep", "Self", "Utility", "select-action"] {
        assert!(memory.is_protected(&atom(name)), "{name}");
    }
    assert!(memory.is_protected(&atom("(= (AgentStep Self) (learn (execute (select-action (actions (perceive))))))")));
}
