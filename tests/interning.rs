use atomclad::parser::parse;
use atomclad::{Atom, AtomcladError, Memory};

fn sym(name: &str) -> Atom {
    Atom::symbol(name).expect("symbol")
}

#[test]
fn adding_the_same_structure_twice_yields_one_instance() {
    let memory = Memory::default();
    let first = memory.add(&parse("(Likes Sam Pizza)").expect("parse"));
    let second = memory.add(&parse("(Likes Sam Pizza)").expect("parse"));
    assert!(first.ptr_eq(&second));
    // Likes, Sam, Pizza and the expression itself
    assert_eq!(memory.len(), 4);
}

#[test]
fn independently_built_expressions_share_their_children() {
    let memory = Memory::default();
    let likes = memory.add(&Atom::expr(vec![sym("Likes"), sym("Sam"), sym("Pizza")]));
    let knows = memory.add(&Atom::expr(vec![sym("Knows"), sym("Sam")]));
    let likes_sam = &likes.children().expect("expression")[1];
    let knows_sam = &knows.children().expect("expression")[1];
    assert!(likes_sam.ptr_eq(knows_sam));
    let stored = memory.get(&sym("Sam")).expect("Sam is stored");
    assert!(stored.ptr_eq(likes_sam));
}

#[test]
fn identity_strings_distinguish_the_variants() {
    assert_eq!(sym("x").id(), "x");
    assert_eq!(Atom::variable("x").expect("variable").id(), "$x");
    assert_eq!(Atom::int(42).id(), "#42");
    assert_eq!(Atom::float(2.5).expect("float").id(), "#2.5");
    assert_eq!(Atom::string("hi").id(), "#\"hi\"");
    assert_eq!(parse("(f $x 1)").expect("parse").id(), "(f $x #1)");
    assert_eq!(Atom::unit().id(), "()");
    // a symbol spelled like a number never collides with the number
    assert_ne!(parse("\"42\"").expect("parse"), Atom::int(42));
    assert_ne!(Atom::int(1), Atom::float(1.0).expect("float"));
}

#[test]
fn malformed_atoms_are_rejected() {
    for name in ["", "a b", "$x", "#x", "42", "-1.5", "(x", "x;y"] {
        assert!(
            matches!(Atom::symbol(name), Err(AtomcladError::Structure { .. })),
            "symbol {name:?} should be rejected"
        );
    }
    assert!(Atom::variable("").is_err());
    assert!(Atom::float(f64::NAN).is_err());
    assert!(Atom::float(f64::INFINITY).is_err());
    assert!(Atom::function("has space", |_args: &[Atom]| Ok(None)).is_err());
}

#[test]
fn adding_again_boosts_and_lookups_count_as_use() {
    let memory = Memory::default();
    let atom = memory.add(&parse("(Seen once)").expect("parse"));
    let fresh = memory.value_of(&atom).expect("stored").importance.sti();
    memory.add(&atom);
    let re_added = memory.value_of(&atom).expect("stored").importance.sti();
    assert!(re_added > fresh);
    memory.get(&atom).expect("stored");
    let looked_up = memory.value_of(&atom).expect("stored").importance.sti();
    assert!(looked_up > re_added);
    assert!(memory.get(&parse("(Never seen)").expect("parse")).is_none());
}

#[test]
fn variables_are_stored_like_any_atom() {
    let memory = Memory::default();
    let pattern = memory.add(&parse("(Likes $who Pizza)").expect("parse"));
    assert!(pattern.has_variables());
    assert!(memory.contains(&Atom::variable("who").expect("variable")));
    assert!(pattern.ptr_eq(&memory.add(&parse("(Likes $who Pizza)").expect("parse"))));
}
