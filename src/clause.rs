//! Operands and clauses of a parsed constraint program.

use tracing::{debug, error};

use crate::dds::Dds;
use crate::error::{DapError, Result};
use crate::functions::{BoolFunction, ValueFunction};
use crate::operators::RelOp;
use crate::variable::VarPath;

/// Where a variable lives: in the dataset tree or in the constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarRef {
    Dataset(VarPath),
    Constant(usize),
}

/// An operand: a variable, or a value function still to be called.
#[derive(Debug, Clone)]
pub enum RValue {
    Variable(VarRef),
    Function { name: String, func: ValueFunction, args: Vec<RValue> },
}

impl RValue {
    pub fn function(name: &str, func: ValueFunction, args: Vec<RValue>) -> Self {
        RValue::Function { name: name.to_string(), func, args }
    }

    /// Name of the referenced variable. Function operands have none.
    pub fn value_name(&self, dds: &Dds) -> Result<String> {
        match self {
            RValue::Variable(r) => dds
                .variable(r)
                .map(|v| v.name().to_string())
                .ok_or_else(|| DapError::invariant(format!("dangling variable reference {r:?}"))),
            RValue::Function { name, .. } => Err(DapError::invariant(format!(
                "value_name() called on a call to `{name}'"
            ))),
        }
    }

    /// Resolves the operand to a variable holding data.
    ///
    /// A variable is read on first use. A function has its arguments resolved
    /// left to right, each completely before the next, and is then called.
    pub fn bvalue(&self, dataset: &str, dds: &mut Dds) -> Result<VarRef> {
        match self {
            RValue::Variable(r) => {
                dds.read_variable(r, dataset)?;
                Ok(r.clone())
            }
            RValue::Function { name, func, args } => {
                let argv = build_args(args, dataset, dds)?;
                debug!(function = %name, argc = argv.len(), "calling value function");
                func(&argv, dds, dataset)?.ok_or_else(|| {
                    DapError::invariant(format!("function `{name}' produced no value for use as an operand"))
                })
            }
        }
    }

    fn collect_references(&self, out: &mut Vec<VarRef>) {
        match self {
            RValue::Variable(r) => out.push(r.clone()),
            RValue::Function { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}

/// Resolves an argument list in order.
pub fn build_args(args: &[RValue], dataset: &str, dds: &mut Dds) -> Result<Vec<VarRef>> {
    let mut argv = Vec::with_capacity(args.len());
    for arg in args {
        argv.push(arg.bvalue(dataset, dds)?);
    }
    Ok(argv)
}

/// One unit of a constraint program.
#[derive(Debug, Clone)]
pub enum Clause {
    /// `left op r1, r2, ...`, true when any right operand satisfies the relation.
    Relation { op: RelOp, left: RValue, right: Vec<RValue> },
    BoolFunction { name: String, func: BoolFunction, args: Vec<RValue> },
    ValueFunction { name: String, func: ValueFunction, args: Vec<RValue> },
}

impl Clause {
    pub fn relation(op: RelOp, left: RValue, right: Vec<RValue>) -> Self {
        Clause::Relation { op, left, right }
    }
    pub fn bool_function(name: &str, func: BoolFunction, args: Vec<RValue>) -> Self {
        Clause::BoolFunction { name: name.to_string(), func, args }
    }
    pub fn value_function(name: &str, func: ValueFunction, args: Vec<RValue>) -> Self {
        Clause::ValueFunction { name: name.to_string(), func, args }
    }

    /// True when the clause yields a truth value.
    pub fn boolean_clause(&self) -> bool {
        matches!(self, Clause::Relation { .. } | Clause::BoolFunction { .. })
    }
    /// True when the clause yields a variable.
    pub fn value_clause(&self) -> bool {
        matches!(self, Clause::ValueFunction { .. })
    }

    /// Every variable the clause mentions, function arguments included.
    pub fn references(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        match self {
            Clause::Relation { left, right, .. } => {
                left.collect_references(&mut out);
                for r in right {
                    r.collect_references(&mut out);
                }
            }
            Clause::BoolFunction { args, .. } | Clause::ValueFunction { args, .. } => {
                for a in args {
                    a.collect_references(&mut out);
                }
            }
        }
        out
    }

    /// Truth value of a relational or boolean-function clause.
    pub fn value(&self, dataset: &str, dds: &mut Dds) -> Result<bool> {
        match self {
            Clause::Relation { op, left, right } => {
                let lhs = left.bvalue(dataset, dds)?;
                for operand in right {
                    let rhs = operand.bvalue(dataset, dds)?;
                    if dds.compare(&lhs, &rhs, *op, dataset)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Clause::BoolFunction { name, func, args } => {
                let argv = build_args(args, dataset, dds)?;
                debug!(function = %name, argc = argv.len(), "calling boolean function");
                func(&argv, dds, dataset)
            }
            Clause::ValueFunction { name, .. } => {
                error!(function = %name, "truth value requested from a value function clause");
                Ok(false)
            }
        }
    }

    /// Result of a value-function clause. The produced variable is marked
    /// read and added to the projection.
    pub fn value_of(&self, dataset: &str, dds: &mut Dds) -> Result<Option<VarRef>> {
        let Clause::ValueFunction { name, func, args } = self else {
            return Err(DapError::invariant("value_of() called on a clause that yields a truth value"));
        };
        let argv = build_args(args, dataset, dds)?;
        debug!(function = %name, argc = argv.len(), "calling value function");
        let Some(result) = func(&argv, dds, dataset)? else {
            return Ok(None);
        };
        let variable = dds
            .variable_mut(&result)
            .ok_or_else(|| DapError::invariant(format!("function `{name}' returned a dangling reference")))?;
        variable.set_read_p(true);
        variable.set_send_p(true);
        Ok(Some(result))
    }
}
