//! Text to atoms.
//!
//! A token starting with `$` is a variable, a double quoted token is a string, a token
//! that reads as a number is an integer or a float, and any other bare token is a symbol.
//! Parentheses nest expressions and `;` starts a comment that runs to the end of the line.
//!
//! Scripts are sequences of top-level atoms. An atom prefixed with `!` is a request to
//! evaluate it, every other atom is a fact to store:
//!
//! ```text
//! (= (double $x) (* $x 2))
//! !(double 21)
//! ```

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::atom::Atom;
use crate::error::{AtomcladError, Result};

#[derive(Parser)]
#[grammar = "atom.pest"]
struct AtomParser;

/// One top-level entry of a script.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Fact(Atom),
    Eval(Atom),
}

impl Statement {
    pub fn atom(&self) -> &Atom {
        match self {
            Statement::Fact(atom) | Statement::Eval(atom) => atom,
        }
    }
}

fn syntax_error(e: pest::error::Error<Rule>) -> AtomcladError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((line, col)) => (line, col),
        LineColLocation::Span((line, col), _) => (line, col),
    };
    AtomcladError::Parse { message: e.variant.message().to_string(), line: Some(line), col: Some(col) }
}

/// Parses exactly one atom.
pub fn parse(text: &str) -> Result<Atom> {
    let single = AtomParser::parse(Rule::single, text)
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| AtomcladError::Parse { message: "no atom found".into(), line: None, col: None })?;
    let atom = single
        .into_inner()
        .find(|pair| pair.as_rule() != Rule::EOI)
        .ok_or_else(|| AtomcladError::Parse { message: "no atom found".into(), line: None, col: None })?;
    build(atom)
}

/// Parses a script into its statements.
pub fn parse_script(text: &str) -> Result<Vec<Statement>> {
    let program = AtomParser::parse(Rule::program, text)
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| AtomcladError::Parse { message: "empty program".into(), line: None, col: None })?;
    let mut statements = Vec::new();
    for statement in program.into_inner().filter(|pair| pair.as_rule() == Rule::statement) {
        let mut evaluate = false;
        let mut parsed = None;
        for part in statement.into_inner() {
            match part.as_rule() {
                Rule::bang => evaluate = true,
                _ => parsed = Some(build(part)?),
            }
        }
        if let Some(atom) = parsed {
            statements.push(if evaluate { Statement::Eval(atom) } else { Statement::Fact(atom) });
        }
    }
    Ok(statements)
}

/// Parses every top-level atom of `text`, ignoring evaluation marks.
pub fn parse_all(text: &str) -> Result<Vec<Atom>> {
    Ok(parse_script(text)?.into_iter().map(|s| s.atom().clone()).collect())
}

fn build(pair: Pair<Rule>) -> Result<Atom> {
    let (line, col) = pair.as_span().start_pos().line_col();
    let located = |e: AtomcladError| AtomcladError::Parse { message: e.to_string(), line: Some(line), col: Some(col) };
    match pair.as_rule() {
        Rule::expression => {
            let children = pair.into_inner().map(build).collect::<Result<Vec<_>>>()?;
            Ok(Atom::expr(children))
        }
        Rule::string => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Ok(Atom::string(unescape(inner)))
        }
        Rule::variable => {
            let name = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Atom::variable(name).map_err(located)
        }
        Rule::number => {
            let text = pair.as_str();
            if text.contains(['.', 'e', 'E']) {
                let value: f64 = text
                    .parse()
                    .map_err(|_| located(AtomcladError::structure(format!("{text} is not a float"))))?;
                Atom::float(value).map_err(located)
            } else {
                let value: i64 = text
                    .parse()
                    .map_err(|_| located(AtomcladError::structure(format!("{text} does not fit an integer"))))?;
                Ok(Atom::int(value))
            }
        }
        Rule::symbol => Atom::symbol(pair.as_str()).map_err(located),
        rule => Err(AtomcladError::Parse { message: format!("unexpected {rule:?}"), line: Some(line), col: Some(col) }),
    }
}

fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some('r') => unescaped.push('\r'),
            Some(other) => unescaped.push(other),
            None => (),
        }
    }
    unescaped
}
