//! Functions callable from constraint expressions.
//!
//! Three shapes are registered by name:
//! * boolean functions, usable as selection clauses,
//! * value functions, usable as operands or as a whole (functional) expression,
//! * projection functions, run while the constraint is parsed.
//!
//! Arguments arrive as resolved references, already read, in the order written.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::clause::VarRef;
use crate::datatype::Value;
use crate::dds::Dds;
use crate::error::{DapError, Result};
use crate::operators::{RelOp, compare_values};
use crate::projection::IndexTriple;
use crate::reader::NameHasher;
use crate::variable::{Array, VarKind, Variable};

pub type BoolFunction = fn(&[VarRef], &mut Dds, &str) -> Result<bool>;
pub type ValueFunction = fn(&[VarRef], &mut Dds, &str) -> Result<Option<VarRef>>;
pub type ProjectionFunction = fn(&[VarRef], &mut Dds, &str) -> Result<()>;

#[derive(Debug, Clone, Copy)]
pub enum Function {
    Boolean(BoolFunction),
    Value(ValueFunction),
    Projection(ProjectionFunction),
}

#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Function, NameHasher>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.add_function("version", Function::Value(func_version));
        table.add_function("length", Function::Value(func_length));
        table.add_function("grid", Function::Projection(func_grid));
        table
    }
    /// Registers `function` under `name`, replacing any earlier entry.
    pub fn add_function(&mut self, name: &str, function: Function) {
        self.functions.insert(name.to_string(), function);
    }
    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }
    pub fn find_bool_function(&self, name: &str) -> Option<BoolFunction> {
        match self.get(name)? {
            Function::Boolean(f) => Some(f),
            _ => None,
        }
    }
    pub fn find_value_function(&self, name: &str) -> Option<ValueFunction> {
        match self.get(name)? {
            Function::Value(f) => Some(f),
            _ => None,
        }
    }
    pub fn find_projection_function(&self, name: &str) -> Option<ProjectionFunction> {
        match self.get(name)? {
            Function::Projection(f) => Some(f),
            _ => None,
        }
    }
    pub fn len(&self) -> usize {
        self.functions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// `version()`: the evaluator's name and version as a string.
pub fn func_version(_args: &[VarRef], dds: &mut Dds, _dataset: &str) -> Result<Option<VarRef>> {
    let text = format!("dapce/{}", env!("CARGO_PKG_VERSION"));
    Ok(Some(dds.add_constant(Variable::with_value("version", Value::Str(text)))))
}

/// `length(var)`: elements selected from an array or grid, rows in range of
/// a sequence, fields of a structure, 1 for a scalar.
pub fn func_length(args: &[VarRef], dds: &mut Dds, dataset: &str) -> Result<Option<VarRef>> {
    let [arg] = args else {
        return Err(DapError::malformed(format!(
            "Wrong number of arguments to length() (expected 1, got {}).",
            args.len()
        )));
    };
    dds.read_variable(arg, dataset)?;
    let variable = dds
        .variable(arg)
        .ok_or_else(|| DapError::invariant("length() was given a dangling reference"))?;
    let count = match variable.kind() {
        VarKind::Atomic { .. } => 1,
        VarKind::Array(a) => a.constrained_len(),
        VarKind::Structure(fields) => fields.len(),
        VarKind::Sequence(s) => s.rows_in_range().len(),
        VarKind::Grid(g) => g.array_var().as_array().map_or(0, Array::constrained_len),
    };
    let count = u32::try_from(count)
        .map_err(|_| DapError::malformed(format!("length() of `{}' does not fit a UInt32.", variable.name())))?;
    Ok(Some(dds.add_constant(Variable::with_value("length", Value::UInt32(count)))))
}

lazy_static! {
    static ref GRID_EXPRESSION: Regex = Regex::new(
        r"^\s*([^<>=!\s]+)\s*(<=|>=|!=|=|<|>)\s*([^<>=!\s]+)\s*(?:(<=|>=|!=|=|<|>)\s*([^<>=!\s]+)\s*)?$"
    )
    .expect("grid expression pattern is valid");
}

/// One `map OP value` term of a grid() expression.
#[derive(Debug, Clone, PartialEq)]
struct MapTerm {
    map: String,
    op: RelOp,
    value: f64,
}

fn parse_grid_expression(text: &str) -> Result<Vec<MapTerm>> {
    let bad = || DapError::malformed(format!("Could not parse the grid() expression `{text}'."));
    let caps = GRID_EXPRESSION.captures(text).ok_or_else(bad)?;
    let token = |i: usize| caps.get(i).map(|m| m.as_str());
    let (Some(first), Some(op1), Some(second)) = (token(1), token(2), token(3)) else {
        return Err(bad());
    };
    let op1: RelOp = op1.parse()?;
    match (token(4), token(5)) {
        // low OP map OP high
        (Some(op2), Some(third)) => {
            let op2: RelOp = op2.parse()?;
            let low = first.parse::<f64>().map_err(|_| bad())?;
            let high = third.parse::<f64>().map_err(|_| bad())?;
            Ok(vec![
                MapTerm { map: second.to_string(), op: op1.flip(), value: low },
                MapTerm { map: second.to_string(), op: op2, value: high },
            ])
        }
        _ => match (first.parse::<f64>(), second.parse::<f64>()) {
            (Err(_), Ok(value)) => Ok(vec![MapTerm { map: first.to_string(), op: op1, value }]),
            (Ok(value), Err(_)) => Ok(vec![MapTerm { map: second.to_string(), op: op1.flip(), value }]),
            _ => Err(bad()),
        },
    }
}

/// `grid(g, "expr", ...)`: narrows a grid to the map values that satisfy
/// every expression, like `"10 < lat <= 40"` or `"lon>=100"`.
pub fn func_grid(args: &[VarRef], dds: &mut Dds, dataset: &str) -> Result<()> {
    let Some((first, expressions)) = args.split_first() else {
        return Err(DapError::malformed("grid() needs a Grid and zero or more selection expressions."));
    };
    let path = match first {
        VarRef::Dataset(path) if dds.get(path).and_then(Variable::as_grid).is_some() => path.clone(),
        _ => return Err(DapError::malformed("The first argument to grid() must be a Grid variable.")),
    };
    let grid_name = dds
        .qualified_name(&path)
        .ok_or_else(|| DapError::invariant("grid() lost its grid"))?;

    let mut terms = Vec::new();
    for e in expressions {
        match dds.variable(e).and_then(Variable::value) {
            Some(Value::Str(text)) => terms.extend(parse_grid_expression(text)?),
            _ => {
                return Err(DapError::malformed(format!(
                    "The selection expressions given to grid({grid_name}, ...) must be quoted strings."
                )));
            }
        }
    }

    dds.mark(&grid_name, true);
    dds.read_variable(first, dataset)?;
    let grid = dds
        .get(&path)
        .and_then(Variable::as_grid)
        .ok_or_else(|| DapError::invariant("grid() lost its grid"))?;

    if let Some(unknown) = terms.iter().find(|t| grid.map_position(&t.map).is_none()) {
        return Err(DapError::malformed(format!(
            "The grid `{grid_name}' has no map named `{}'.",
            unknown.map
        )));
    }
    let mut ranges = Vec::new();
    for (position, map) in grid.maps().iter().enumerate() {
        let map_terms: Vec<&MapTerm> = terms.iter().filter(|t| t.map == map.name()).collect();
        if map_terms.is_empty() {
            continue;
        }
        let array = map
            .as_array()
            .ok_or_else(|| DapError::invariant(format!("map `{}' is not an Array", map.name())))?;
        if !array.element().is_numeric() {
            return Err(DapError::malformed(format!(
                "The map `{}' of `{grid_name}' is not numeric and cannot be used in grid().",
                map.name()
            )));
        }
        let mut first_hit = None;
        let mut last_hit = None;
        for (i, value) in array.values().iter().enumerate() {
            let mut keep = true;
            for term in &map_terms {
                if !compare_values(term.op, value, &Value::Float64(term.value))? {
                    keep = false;
                    break;
                }
            }
            if keep {
                first_hit.get_or_insert(i);
                last_hit = Some(i);
            }
        }
        let (Some(start), Some(stop)) = (first_hit, last_hit) else {
            return Err(DapError::malformed(format!(
                "The expressions passed to grid() do not result in an inclusive subset of `{}'.",
                map.name()
            )));
        };
        ranges.push((position, IndexTriple::new(start, 1, stop)));
    }

    let grid = dds
        .get_mut(&path)
        .and_then(Variable::as_grid_mut)
        .ok_or_else(|| DapError::invariant("grid() lost its grid"))?;
    for (position, triple) in ranges {
        if let Some(map) = grid.maps_mut()[position].as_array_mut() {
            map.add_constraint(0, triple)?;
        }
        if let Some(array) = grid.array_var_mut().as_array_mut() {
            array.add_constraint(position, triple)?;
        }
        debug!(grid = %grid_name, dimension = position, range = %triple, "grid() narrowed a dimension");
    }
    Ok(())
}
