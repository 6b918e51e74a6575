use atomclad::parser::{Statement, parse, parse_all, parse_script};
use atomclad::{Atom, AtomKind, AtomcladError};

#[test]
fn tokens_become_the_matching_variant() {
    assert_eq!(parse("Pizza").expect("parse").as_symbol(), Some("Pizza"));
    assert_eq!(parse("$who").expect("parse").as_variable(), Some("who"));
    assert_eq!(parse("42").expect("parse").as_int(), Some(42));
    assert_eq!(parse("-7").expect("parse").as_int(), Some(-7));
    assert_eq!(parse("2.5").expect("parse").as_number(), Some(2.5));
    assert_eq!(parse("1e3").expect("parse").as_number(), Some(1000.0));
    assert_eq!(parse("\"hi there\"").expect("parse").as_str(), Some("hi there"));
    assert_eq!(parse("()").expect("parse"), Atom::unit());
    // tokens that only start like numbers are symbols
    assert_eq!(parse("12abc").expect("parse").as_symbol(), Some("12abc"));
    assert_eq!(parse("-").expect("parse").as_symbol(), Some("-"));
    assert_eq!(parse("<=").expect("parse").as_symbol(), Some("<="));
}

#[test]
fn nested_expressions_round_trip_through_display() {
    let text = r#"(a (b $c) "s\n\"q\"" 1 -2.5 (()))"#;
    let parsed = parse(text).expect("parse");
    assert_eq!(parsed.to_string(), text);
    assert_eq!(parse(&parsed.to_string()).expect("parse"), parsed);
    let AtomKind::Expression(children) = parsed.kind() else {
        panic!("expected an expression");
    };
    assert_eq!(children.len(), 6);
    assert_eq!(children[2].as_str(), Some("s\n\"q\""));
    assert_eq!(parse("300.0").expect("parse").to_string(), "300.0");
}

#[test]
fn comments_and_whitespace_are_ignored() {
    let atom = parse(
        "
        ; a fact about Sam
        (Likes   Sam ; who
           Pizza)  ; what
        ",
    )
    .expect("parse");
    assert_eq!(atom.to_string(), "(Likes Sam Pizza)");
}

#[test]
fn scripts_mark_evaluations_with_a_bang() {
    let statements = parse_script(
        "
        ; rules first
        (= (double $x) (* $x 2))
        !(double 21)
        (Likes Sam Pizza)
        ",
    )
    .expect("parse");
    assert_eq!(statements.len(), 3);
    assert!(matches!(&statements[0], Statement::Fact(_)));
    assert!(matches!(&statements[1], Statement::Eval(a) if a.to_string() == "(double 21)"));
    assert!(matches!(&statements[2], Statement::Fact(_)));
    assert_eq!(parse_all("a (b) !(c)").expect("parse").len(), 3);
    assert!(parse_script("  ; nothing here\n").expect("parse").is_empty());
}

#[test]
fn syntax_errors_report_their_position() {
    match parse("(a b") {
        Err(AtomcladError::Parse { line, col, .. }) => {
            assert_eq!(line, Some(1));
            assert!(col.is_some());
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    match parse_script("(ok)\n(also ok)\n(broken") {
        Err(AtomcladError::Parse { line, .. }) => assert_eq!(line, Some(3)),
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert!(parse(")").is_err());
    assert!(parse("a b").is_err());
    assert!(parse("").is_err());
    assert!(parse("\"unterminated").is_err());
}

#[test]
fn invalid_names_are_parse_errors() {
    for text in ["$", "#foo", "(f #bar)", "99999999999999999999"] {
        assert!(
            matches!(parse(text), Err(AtomcladError::Parse { .. })),
            "{text:?} should not parse"
        );
    }
}
