//! Turns constraint expression text into projection state and clauses on a
//! [`Dds`]. Grammar details live in `constraint.pest`.
//!
//! Projection items are applied while parsing: plain names are marked, bracket
//! groups become index constraints and projection functions run immediately.
//! Selection clauses are appended to the clause list for later evaluation.

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use tracing::{debug, warn};

use crate::clause::{Clause, RValue, VarRef, build_args};
use crate::datatype::Value;
use crate::dds::Dds;
use crate::error::{DapError, Result};
use crate::functions::Function;
use crate::operators::RelOp;
use crate::projection::{IndexGroup, process_indices};
use crate::variable::Variable;

#[derive(Parser)]
#[grammar = "constraint.pest"]
struct ConstraintGrammar;

/// Parses `constraint` into `dds`. The caller clears previous state first.
pub fn parse(constraint: &str, dds: &mut Dds) -> Result<()> {
    let text = www2id(constraint);
    let mut pairs = ConstraintGrammar::parse(Rule::constraint, &text).map_err(grammar_error)?;
    let root = pairs
        .next()
        .ok_or_else(|| DapError::invariant("the constraint parser produced nothing"))?;

    let mut projected = false;
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::projection => {
                projected = true;
                for item in pair.into_inner() {
                    project(item, dds)?;
                }
            }
            Rule::selection => {
                for clause in pair.into_inner() {
                    select(clause, dds)?;
                }
            }
            Rule::EOI => (),
            other => return Err(DapError::invariant(format!("unexpected {other:?} in constraint"))),
        }
    }
    if !projected {
        dds.mark_all(true);
    }
    if dds.clauses().len() > 1 && dds.clauses().iter().any(Clause::value_clause) {
        return Err(DapError::malformed(
            "A function that returns a value cannot be combined with other clauses.",
        ));
    }
    debug!(constraint = %text, projected, "constraint accepted");
    Ok(())
}

fn grammar_error(e: pest::error::Error<Rule>) -> DapError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    DapError::Parse { message: e.variant.message().to_string(), line: Some(line), col: Some(col) }
}

fn project(pair: Pair<Rule>, dds: &mut Dds) -> Result<()> {
    match pair.as_rule() {
        Rule::indexed => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .ok_or_else(|| DapError::invariant("projection item without a name"))?
                .as_str()
                .to_string();
            let groups = inner.map(index_group).collect::<Result<Vec<_>>>()?;
            if !dds.mark(&name, true) {
                return Err(DapError::malformed(format!("No such identifier in dataset: {name}")));
            }
            if !groups.is_empty() {
                let variable = dds
                    .var_mut(&name)
                    .ok_or_else(|| DapError::invariant(format!("`{name}' vanished after marking")))?;
                process_indices(variable, &groups)?;
            }
            Ok(())
        }
        Rule::call => {
            let (name, args) = call_parts(pair, dds)?;
            match dds.functions().get(&name) {
                Some(Function::Value(func)) => {
                    dds.append_clause(Clause::value_function(&name, func, args));
                    Ok(())
                }
                Some(Function::Projection(func)) => {
                    let dataset = dds.filename().to_string();
                    let argv = build_args(&args, &dataset, dds)?;
                    debug!(function = %name, "running projection function");
                    func(&argv, dds, &dataset)
                }
                Some(Function::Boolean(_)) => Err(DapError::malformed(format!(
                    "The function `{name}' returns a boolean and cannot be used in a projection."
                ))),
                None => Err(DapError::malformed(format!("The function `{name}' is not defined on this server."))),
            }
        }
        other => Err(DapError::invariant(format!("unexpected {other:?} in projection"))),
    }
}

fn select(pair: Pair<Rule>, dds: &mut Dds) -> Result<()> {
    match pair.as_rule() {
        Rule::relation => {
            let mut inner = pair.into_inner();
            let missing = || DapError::invariant("incomplete relation");
            let left = rvalue(inner.next().ok_or_else(missing)?, dds)?;
            let op: RelOp = inner.next().ok_or_else(missing)?.as_str().parse()?;
            let right = inner
                .next()
                .ok_or_else(missing)?
                .into_inner()
                .map(|p| rvalue(p, dds))
                .collect::<Result<Vec<_>>>()?;
            dds.append_clause(Clause::relation(op, left, right));
            Ok(())
        }
        Rule::call => {
            let (name, args) = call_parts(pair, dds)?;
            match dds.functions().get(&name) {
                Some(Function::Boolean(func)) => {
                    dds.append_clause(Clause::bool_function(&name, func, args));
                    Ok(())
                }
                Some(_) => Err(DapError::malformed(format!(
                    "The function `{name}' does not return a boolean and cannot be used in a selection."
                ))),
                None => Err(DapError::malformed(format!("The function `{name}' is not defined on this server."))),
            }
        }
        other => Err(DapError::invariant(format!("unexpected {other:?} in selection"))),
    }
}

fn call_parts(pair: Pair<Rule>, dds: &mut Dds) -> Result<(String, Vec<RValue>)> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or_else(|| DapError::invariant("call without a name"))?
        .as_str()
        .to_string();
    let args = inner.map(|p| rvalue(p, dds)).collect::<Result<Vec<_>>>()?;
    Ok((name, args))
}

fn rvalue(pair: Pair<Rule>, dds: &mut Dds) -> Result<RValue> {
    match pair.as_rule() {
        Rule::call => {
            let (name, args) = call_parts(pair, dds)?;
            match dds.functions().find_value_function(&name) {
                Some(func) => Ok(RValue::function(&name, func, args)),
                None => Err(DapError::malformed(format!(
                    "The function `{name}' is not defined or does not return a value."
                ))),
            }
        }
        Rule::number => {
            let text = pair.as_str();
            let constant = Variable::with_value(text, Value::from_literal(text));
            Ok(RValue::Variable(dds.add_constant(constant)))
        }
        Rule::string => {
            let text = unescape(pair.into_inner().next().map_or("", |p| p.as_str()));
            let constant = Variable::with_value(&text, Value::Str(text.clone()));
            Ok(RValue::Variable(dds.add_constant(constant)))
        }
        Rule::word => {
            let name = pair.as_str();
            match dds.var_path(name, None) {
                Some(path) => Ok(RValue::Variable(VarRef::Dataset(path))),
                None => {
                    warn!(word = name, "not a variable, using it as a string constant");
                    let constant = Variable::with_value(name, Value::Str(name.to_string()));
                    Ok(RValue::Variable(dds.add_constant(constant)))
                }
            }
        }
        other => Err(DapError::invariant(format!("unexpected {other:?} as an operand"))),
    }
}

fn index_group(pair: Pair<Rule>) -> Result<IndexGroup> {
    pair.into_inner()
        .map(|p| {
            p.as_str()
                .parse::<i64>()
                .map_err(|_| DapError::malformed(format!("`{}' is not a valid index.", p.as_str())))
        })
        .collect()
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Decodes `%xx` escapes left in by URL transport.
pub fn www2id(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
