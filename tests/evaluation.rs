use std::collections::HashSet;

use atomclad::interpreter::Interpreter;
use atomclad::parser::parse;
use atomclad::{Atom, AtomcladError, ErrorCause, Runtime, RuntimeConfig};

fn atom(text: &str) -> Atom {
    parse(text).expect("parse")
}

fn runtime() -> Runtime {
    Runtime::with_defaults().expect("runtime")
}

fn single(results: &[Atom]) -> &Atom {
    assert_eq!(results.len(), 1, "expected one result, got {results:?}");
    &results[0]
}

#[test]
fn peano_addition() {
    let runtime = runtime();
    let results = runtime
        .run(
            "
            (= (add Z $n) $n)
            (= (add (S $m) $n) (S (add $m $n)))
            !(add (S (S Z)) (S Z))
            !(add Z Z)
            ",
        )
        .expect("run");
    assert_eq!(single(&results[0]).to_string(), "(S (S (S Z)))");
    assert_eq!(single(&results[1]).to_string(), "Z");
}

#[test]
fn arithmetic_through_a_rule_and_a_host_function() {
    let runtime = runtime();
    runtime
        .register("Grounded+", |args: &[Atom]| match args {
            [a, b] => Ok(a.as_int().zip(b.as_int()).map(|(a, b)| Atom::int(a + b))),
            _ => Ok(None),
        })
        .expect("register");
    let results = runtime
        .run(
            "
            (= (+ $a $b) (Grounded+ $a $b))
            !(* (+ 2 3) 4)
            ",
        )
        .expect("run");
    assert_eq!(single(&results[0]), &Atom::int(20));
}

#[test]
fn builtin_arithmetic_and_comparison() {
    let runtime = runtime();
    let cases = [
        ("(+ 1 2)", "3"),
        ("(- 10 4)", "6"),
        ("(* 2.5 2)", "5.0"),
        ("(/ 7 2)", "3"),
        ("(/ 7.0 2)", "3.5"),
        ("(% 7 3)", "1"),
        ("(< 1 2)", "True"),
        ("(>= 1 2)", "False"),
        ("(== a a)", "True"),
        ("(== 1 1.0)", "False"),
        ("(concat \"ab\" \"cd\")", "\"abcd\""),
        ("(str-len \"hello\")", "5"),
    ];
    for (expression, expected) in cases {
        let results = runtime.eval_text(expression).expect("parse");
        assert_eq!(single(&results), &atom(expected), "{expression}");
    }
}

#[test]
fn conditionals_are_rules() {
    let runtime = runtime();
    assert_eq!(single(&runtime.eval_text("(if (< 1 2) yes no)").expect("parse")), &atom("yes"));
    assert_eq!(single(&runtime.eval_text("(if (> 1 2) yes no)").expect("parse")), &atom("no"));
    let results = runtime
        .run(
            "
            (= (sign $n) (if (< $n 0) negative (if (== $n 0) zero positive)))
            !(sign -3)
            !(sign 0)
            !(sign 7)
            ",
        )
        .expect("run");
    let signs: Vec<String> = results.iter().map(|r| single(r).to_string()).collect();
    assert_eq!(signs, ["negative", "zero", "positive"]);
}

#[test]
fn both_branches_of_a_conditional_are_evaluated() {
    // recursion has to dispatch on patterns, a guard alone does not stop it
    let runtime = runtime();
    runtime.run("(= (down $n) (if (== $n 0) done (down (- $n 1))))").expect("run");
    let results = runtime.eval_text("(down 2)").expect("parse");
    assert_eq!(single(&results).error_cause(), Some("MaxDepthExceeded"));
}

#[test]
fn programs_can_add_rules() {
    let runtime = runtime();
    let results = runtime
        .run(
            "
            !(add-atom (= (NewPred X) Result))
            !(NewPred X)
            ",
        )
        .expect("run");
    assert_eq!(single(&results[0]), &Atom::unit());
    assert_eq!(single(&results[1]), &atom("Result"));
    assert!(runtime.memory().contains(&atom("(= (NewPred X) Result)")));
}

#[test]
fn nondeterministic_rules_yield_every_result() {
    let runtime = runtime();
    runtime.run("(= (color) red) (= (color) green) (= (color) red)").expect("run");
    let colors: HashSet<String> = runtime.eval_text("(color)").expect("parse").iter().map(|c| c.to_string()).collect();
    assert_eq!(colors, HashSet::from(["red".to_string(), "green".to_string()]));

    let capped = Runtime::new(RuntimeConfig { max_results: 1, ..RuntimeConfig::default() }).expect("runtime");
    capped.run("(= (color) red) (= (color) green)").expect("run");
    assert_eq!(capped.eval_text("(color)").expect("parse").len(), 1);
}

#[test]
fn results_of_children_combine() {
    let runtime = runtime();
    runtime.run("(= (coin) heads) (= (coin) tails)").expect("run");
    let pairs: HashSet<String> =
        runtime.eval_text("(pair (coin) (coin))").expect("parse").iter().map(|p| p.to_string()).collect();
    assert_eq!(pairs.len(), 4);
    assert!(pairs.contains("(pair heads tails)"));
}

#[test]
fn recursion_terminates() {
    let runtime = runtime();
    runtime
        .run(
            "
            (= (loop) (loop))
            (= (ping $x) (pong $x))
            (= (pong $x) (ping $x))
            (= (grow $x) (grow (S $x)))
            ",
        )
        .expect("run");

    assert_eq!(single(&runtime.eval_text("(loop)").expect("parse")), &atom("(loop)"));

    let mutual = runtime.eval_text("(ping a)").expect("parse");
    assert!(!mutual.is_empty());
    assert!(mutual.iter().all(|r| !r.is_error()));

    let grown = runtime.eval_text("(grow Z)").expect("parse");
    assert_eq!(single(&grown).error_cause(), Some(ErrorCause::MaxDepthExceeded.name()));
}

#[test]
fn depth_limit_follows_the_configuration() {
    let runtime = Runtime::new(RuntimeConfig { max_depth: 3, ..RuntimeConfig::default() }).expect("runtime");
    runtime.run("(= (count Z) done) (= (count (S $n)) (count $n))").expect("run");
    assert_eq!(single(&runtime.eval_text("(count (S Z))").expect("parse")), &atom("done"));
    let deep = runtime.eval_text("(count (S (S (S (S (S Z))))))").expect("parse");
    assert_eq!(single(&deep).error_cause(), Some("MaxDepthExceeded"));
}

#[test]
fn an_interpreter_can_carry_its_own_limits() {
    let runtime = runtime();
    runtime
        .run("(= (count Z) done) (= (count (S $n)) (count $n)) (= (pick) a) (= (pick) b) (= (pick) c)")
        .expect("run");
    let strict = Interpreter::new(runtime.memory(), runtime.registry()).with_limits(3, 1);
    assert_eq!(single(&strict.eval(&atom("(count (S Z))"))), &atom("done"));
    let deep = strict.eval(&atom("(count (S (S (S (S (S Z))))))"));
    assert_eq!(single(&deep).error_cause(), Some("MaxDepthExceeded"));
    assert_eq!(strict.eval(&atom("(pick)")).len(), 1);
    assert_eq!(runtime.eval_text("(pick)").expect("parse").len(), 3);
}

#[test]
fn host_failures_become_error_atoms() {
    let runtime = runtime();
    let cases = [
        ("(/ 1 0)", ErrorCause::DivisionByZero),
        ("(% 1 0)", ErrorCause::DivisionByZero),
        ("(+ 1 \"a\")", ErrorCause::TypeMismatch),
        ("(+ 1)", ErrorCause::ArityMismatch),
        ("(+ 9223372036854775807 1)", ErrorCause::GroundedFailed),
    ];
    for (expression, cause) in cases {
        let results = runtime.eval_text(expression).expect("parse");
        assert_eq!(single(&results).error_cause(), Some(cause.name()), "{expression}");
    }
    assert_eq!(
        single(&runtime.eval_text("(/ 1 0)").expect("parse")).to_string(),
        "(Error (/ 1 0) DivisionByZero)"
    );
}

#[test]
fn panics_and_missing_results_are_contained() {
    let runtime = runtime();
    runtime.register("boom", |_args: &[Atom]| -> atomclad::Result<Option<Atom>> { panic!("boom") }).expect("register");
    runtime.register("nothing", |_args: &[Atom]| Ok(None)).expect("register");
    runtime
        .register("refuse", |_args: &[Atom]| Err(AtomcladError::Invariant("refused".into())))
        .expect("register");

    let boom = runtime.eval_text("(boom)").expect("parse");
    assert_eq!(single(&boom).error_cause(), Some("GroundedPanicked"));
    let nothing = runtime.eval_text("(nothing 1)").expect("parse");
    assert_eq!(single(&nothing).to_string(), "(Error (nothing 1) NoResult)");
    let refused = runtime.eval_text("(refuse)").expect("parse");
    assert_eq!(single(&refused).error_cause(), Some("GroundedFailed"));

    // the runtime keeps working afterwards
    assert_eq!(single(&runtime.eval_text("(+ 1 1)").expect("parse")), &Atom::int(2));
}

#[test]
fn ambiguous_arguments_are_reported() {
    let runtime = runtime();
    runtime.run("(= (color) red) (= (color) green)").expect("run");
    let results = runtime.eval_text("(+ (color) 1)").expect("parse");
    assert_eq!(single(&results).error_cause(), Some("AmbiguousArgument"));
}

#[test]
fn errors_propagate_through_enclosing_expressions() {
    let runtime = runtime();
    let nested = runtime.eval_text("(* (/ 1 0) 2)").expect("parse");
    assert_eq!(single(&nested).to_string(), "(Error (/ 1 0) DivisionByZero)");
    let data = runtime.eval_text("(wrap (/ 1 0))").expect("parse");
    assert_eq!(single(&data).to_string(), "(Error (/ 1 0) DivisionByZero)");
}

#[test]
fn malformed_rules_are_ignored() {
    let runtime = runtime();
    runtime.run("(= (bad)) (= lonely) (= (good) fine)").expect("run");
    assert_eq!(single(&runtime.eval_text("(good)").expect("parse")), &atom("fine"));
    assert_eq!(single(&runtime.eval_text("(bad)").expect("parse")), &atom("(bad)"));
}

#[test]
fn unevaluable_atoms_are_their_own_result() {
    let runtime = runtime();
    for text in ["Sam", "42", "\"s\"", "$x", "()", "(Likes Sam Pizza)"] {
        assert_eq!(single(&runtime.eval_text(text).expect("parse")), &atom(text), "{text}");
    }
}

#[test]
fn rules_do_not_capture_caller_variables() {
    let runtime = runtime();
    runtime.run("(= (same $x) (pair $x $y))").expect("run");
    let results = runtime.eval_text("(same $y)").expect("parse");
    let result = single(&results);
    let parts = result.children().expect("expression");
    assert_eq!(parts[1], atom("$y"));
    assert_ne!(parts[2], atom("$y"));
}

#[test]
fn stored_knowledge_is_reachable_from_programs() {
    let runtime = runtime();
    let results = runtime
        .run(
            r#"
            (Likes Sam Pizza)
            (Likes Dean Pizza)
            (: Sam Person)
            (Fact a)
            !(match (Likes $p Pizza) $p)
            !(get-type Sam)
            !(set-truth (Fact a) 0.0 1.0)
            !(truth-of (Fact a))
            !(truth-of (Fact b))
            "#,
        )
        .expect("run");
    assert_eq!(single(&results[0]).to_string(), "(Results Sam Dean)");
    assert_eq!(single(&results[1]).to_string(), "(Types Person)");
    assert_eq!(single(&results[2]).to_string(), "(Truth 0.5 2.0)");
    assert_eq!(single(&results[3]).to_string(), "(Truth 0.5 2.0)");
    assert_eq!(single(&results[4]).error_cause(), Some("NoResult"));
}

#[test]
fn applied_rules_gain_importance() {
    let runtime = runtime();
    let rule = runtime.add_text("(= (greet) hello)").expect("parse");
    let before = runtime.memory().value_of(&rule).expect("stored").importance.sti();
    runtime.eval_text("(greet)").expect("parse");
    let after = runtime.memory().value_of(&rule).expect("stored").importance.sti();
    assert!(after > before);
}

#[test]
fn intermediate_results_are_not_stored() {
    let runtime = runtime();
    runtime.run("(= (add Z $n) $n) (= (add (S $m) $n) (S (add $m $n)))").expect("run");
    let before = runtime.memory().len();
    runtime.eval_text("(add (S (S Z)) Z)").expect("parse");
    assert_eq!(runtime.memory().len(), before);
}
