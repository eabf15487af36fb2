//! The dataset descriptor structure (DDS) and the constraint evaluator built
//! around it.
//!
//! A [`Dds`] owns the variable tree of one dataset, the constants created
//! while parsing a constraint, the parsed clause list and the function table.
//! Each request is expected to work on its own clone so constraint state
//! never leaks between requests.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use roaring::RoaringTreemap;
use tracing::{debug, info};

use crate::clause::{Clause, VarRef};
use crate::error::{DapError, Result};
use crate::functions::{Function, FunctionTable};
use crate::operators::{RelOp, compare_values};
use crate::parser;
use crate::print;
use crate::reader::DataReader;
use crate::variable::{Sequence, VarPath, Variable};

#[derive(Clone)]
pub struct Dds {
    name: String,
    filename: String,
    vars: Vec<Variable>,
    constants: Vec<Variable>,
    clauses: Vec<Clause>,
    functions: FunctionTable,
    reader: Arc<dyn DataReader>,
}

impl fmt::Debug for Dds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dds")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("vars", &self.vars)
            .field("constants", &self.constants.len())
            .field("clauses", &self.clauses.len())
            .finish()
    }
}

impl Dds {
    pub fn new(name: &str, reader: Arc<dyn DataReader>) -> Self {
        Self {
            name: name.to_string(),
            filename: String::new(),
            vars: Vec::new(),
            constants: Vec::new(),
            clauses: Vec::new(),
            functions: FunctionTable::with_builtins(),
            reader,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
    /// Identifies the dataset to the reader; used as the `dataset` argument
    /// by callers that have nothing better.
    pub fn filename(&self) -> &str {
        &self.filename
    }
    pub fn set_filename(&mut self, filename: &str) {
        self.filename = filename.to_string();
    }
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }
    pub fn add_function(&mut self, name: &str, function: Function) {
        self.functions.add_function(name, function);
    }

    // ---------------------------------------------------------------- variables

    /// Appends a copy of `var` at the top level.
    pub fn add_var(&mut self, var: &Variable) {
        self.vars.push(var.clone());
    }
    /// Appends `var` itself at the top level.
    pub fn add_var_nocopy(&mut self, var: Variable) {
        self.vars.push(var);
    }
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }
    pub fn num_var(&self) -> usize {
        self.vars.len()
    }
    /// Removes the first top-level variable named `name`. Names inside
    /// constructors are not searched.
    pub fn del_var(&mut self, name: &str) -> bool {
        match self.vars.iter().position(|v| v.name() == name) {
            Some(i) => {
                self.vars.remove(i);
                true
            }
            None => false,
        }
    }
    pub fn del_var_at(&mut self, index: usize) -> Option<Variable> {
        (index < self.vars.len()).then(|| self.vars.remove(index))
    }
    pub fn del_var_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.vars.len());
        let start = range.start.min(end);
        self.vars.drain(start..end);
    }
    pub fn var(&self, name: &str) -> Option<&Variable> {
        let path = self.var_path(name, None)?;
        self.get(&path)
    }
    pub fn var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let path = self.var_path(name, None)?;
        self.get_mut(&path)
    }

    /// Resolves `name` to a path.
    ///
    /// An exact match (a top-level name or a dotted path) wins over a leaf
    /// match, which takes the first variable of that name found depth first.
    /// When `stack` is given, the paths of the enclosing constructors are
    /// pushed onto it, outermost first.
    pub fn var_path(&self, name: &str, stack: Option<&mut Vec<VarPath>>) -> Option<VarPath> {
        let path = self.exact_match(name).or_else(|| self.leaf_match(name))?;
        if let Some(stack) = stack {
            for depth in 1..path.len() {
                stack.push(path[..depth].to_vec());
            }
        }
        Some(path)
    }

    fn exact_match(&self, name: &str) -> Option<VarPath> {
        if let Some(i) = self.vars.iter().position(|v| v.name() == name) {
            return Some(vec![i]);
        }
        let (aggregate, field) = name.split_once('.')?;
        let mut path = self.var_path(aggregate, None)?;
        let rest = self.get(&path)?.locate(field, true)?;
        path.extend(rest);
        Some(path)
    }

    fn leaf_match(&self, name: &str) -> Option<VarPath> {
        for (i, var) in self.vars.iter().enumerate() {
            if var.name() == name {
                return Some(vec![i]);
            }
            if var.is_constructor() {
                if let Some(rest) = var.locate(name, false) {
                    let mut path = vec![i];
                    path.extend(rest);
                    return Some(path);
                }
            }
        }
        None
    }

    pub fn get(&self, path: &[usize]) -> Option<&Variable> {
        let (first, rest) = path.split_first()?;
        self.vars.get(*first)?.descendant(rest)
    }
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut Variable> {
        let (first, rest) = path.split_first()?;
        self.vars.get_mut(*first)?.descendant_mut(rest)
    }
    /// Dotted name of the variable at `path`.
    pub fn qualified_name(&self, path: &[usize]) -> Option<String> {
        let mut names = Vec::with_capacity(path.len());
        for depth in 1..=path.len() {
            names.push(self.get(&path[..depth])?.name());
        }
        (!names.is_empty()).then(|| names.join("."))
    }

    /// Checks that names are unique within every container.
    pub fn check_semantics(&self) -> Result<()> {
        fn unique(scope: &str, vars: &[Variable]) -> Result<()> {
            for (i, v) in vars.iter().enumerate() {
                if vars[..i].iter().any(|o| o.name() == v.name()) {
                    return Err(DapError::Dataset(format!("Duplicate variable name `{}' in {scope}", v.name())));
                }
                unique(v.name(), v.children())?;
            }
            Ok(())
        }
        unique(&self.name, &self.vars)
    }

    // ---------------------------------------------------------------- constants

    /// Stores a constant created while parsing and returns its handle. The
    /// pool lives until the next [`Dds::clear_constraint`].
    pub fn add_constant(&mut self, constant: Variable) -> VarRef {
        self.constants.push(constant);
        VarRef::Constant(self.constants.len() - 1)
    }
    pub fn constants(&self) -> &[Variable] {
        &self.constants
    }
    pub fn variable(&self, r: &VarRef) -> Option<&Variable> {
        match r {
            VarRef::Dataset(path) => self.get(path),
            VarRef::Constant(i) => self.constants.get(*i),
        }
    }
    pub fn variable_mut(&mut self, r: &VarRef) -> Option<&mut Variable> {
        match r {
            VarRef::Dataset(path) => self.get_mut(path),
            VarRef::Constant(i) => self.constants.get_mut(*i),
        }
    }

    /// Reads a dataset variable unless it has been read already.
    pub fn read_variable(&mut self, r: &VarRef, dataset: &str) -> Result<()> {
        let VarRef::Dataset(path) = r else {
            return Ok(());
        };
        let qualified = self
            .qualified_name(path)
            .ok_or_else(|| DapError::invariant(format!("no variable at {path:?}")))?;
        if let Some(sequence) = self.enclosing_sequence(path) {
            // a sequence field only holds data while one of its rows is loaded
            return match self.get(path).and_then(Variable::value) {
                Some(_) => Ok(()),
                None => Err(DapError::malformed(format!(
                    "`{qualified}' is a field of the Sequence `{sequence}' and can only be evaluated row by row."
                ))),
            };
        }
        let reader = Arc::clone(&self.reader);
        let variable = self
            .get_mut(path)
            .ok_or_else(|| DapError::invariant(format!("no variable at {path:?}")))?;
        if variable.read_p() {
            return Ok(());
        }
        debug!(dataset, variable = %qualified, "reading variable");
        reader.read(dataset, &qualified, variable).map_err(|e| match e {
            DapError::Read { .. } => e,
            other => DapError::Read { variable: qualified.clone(), message: other.to_string() },
        })?;
        variable.set_read_p(true);
        Ok(())
    }

    /// Qualified name of the innermost Sequence strictly above `path`.
    fn enclosing_sequence(&self, path: &[usize]) -> Option<String> {
        let depth = (1..path.len())
            .rev()
            .find(|n| self.get(&path[..*n]).is_some_and(|v| v.as_sequence().is_some()))?;
        self.qualified_name(&path[..depth])
    }

    /// Reads both operands and compares them with `op`.
    ///
    /// The left operand must be a scalar. A right operand that is not a
    /// scalar never satisfies the relation.
    pub fn compare(&mut self, left: &VarRef, right: &VarRef, op: RelOp, dataset: &str) -> Result<bool> {
        self.read_variable(left, dataset)?;
        self.read_variable(right, dataset)?;
        let dangling = || DapError::invariant("comparison operand is a dangling reference");
        let lhs = self.variable(left).ok_or_else(dangling)?;
        let rhs = self.variable(right).ok_or_else(dangling)?;
        if !lhs.type_tag().is_scalar() {
            return Err(DapError::malformed(format!(
                "Relational operators can only be applied to scalar types; `{}' is a {}.",
                lhs.name(),
                lhs.type_tag()
            )));
        }
        if !rhs.type_tag().is_scalar() {
            return Ok(false);
        }
        let no_value = |v: &Variable| DapError::invariant(format!("`{}' holds no value after being read", v.name()));
        let a = lhs.value().ok_or_else(|| no_value(lhs))?;
        let b = rhs.value().ok_or_else(|| no_value(rhs))?;
        compare_values(op, a, b)
    }

    // ---------------------------------------------------------------- clauses

    /// Appends a clause. Variables named by a truth-valued clause are flagged
    /// as taking part in the selection.
    pub fn append_clause(&mut self, clause: Clause) {
        if clause.boolean_clause() {
            for r in clause.references() {
                if let VarRef::Dataset(path) = r {
                    if let Some(v) = self.get_mut(&path) {
                        v.set_in_selection(true);
                    }
                }
            }
        }
        self.clauses.push(clause);
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    /// Drops the clause list and the constant pool.
    pub fn clear_constraint(&mut self) {
        self.clauses.clear();
        self.constants.clear();
    }
    /// Clears projection flags, selection flags and index constraints.
    pub fn reset_projection(&mut self) {
        for v in &mut self.vars {
            v.set_send_p(false);
            v.set_in_selection(false);
            v.reset_constraints();
        }
    }

    /// Parses `constraint` into the projection and the clause list,
    /// discarding whatever constraint was there before.
    pub fn parse_constraint(&mut self, constraint: &str) -> Result<()> {
        self.clear_constraint();
        self.reset_projection();
        if let Err(e) = parser::parse(constraint, self) {
            self.clear_constraint();
            return Err(e);
        }
        info!(dataset = %self.name, clauses = self.clauses.len(), "constraint parsed");
        Ok(())
    }

    /// True when the constraint is a single call to a value function.
    pub fn functional_expression(&self) -> bool {
        matches!(self.clauses.as_slice(), [only] if only.value_clause())
    }
    /// True when there is at least one clause and all of them yield truth values.
    pub fn boolean_expression(&self) -> bool {
        !self.clauses.is_empty() && self.clauses.iter().all(Clause::boolean_clause)
    }

    /// Conjunction of all clauses, stopping at the first false one. An empty
    /// selection is true.
    pub fn eval_selection(&mut self, dataset: &str) -> Result<bool> {
        if self.clauses.is_empty() {
            return Ok(true);
        }
        let clauses = std::mem::take(&mut self.clauses);
        let pool = self.constants.len();
        let result = self.eval_clauses(&clauses, dataset);
        // values made by function operands only live for one pass
        self.constants.truncate(pool);
        self.clauses = clauses;
        result
    }

    fn eval_clauses(&mut self, clauses: &[Clause], dataset: &str) -> Result<bool> {
        for (i, clause) in clauses.iter().enumerate() {
            if !clause.boolean_clause() {
                return Err(DapError::invariant(
                    "A selection expression must contain only boolean clauses.",
                ));
            }
            if !clause.value(dataset, self)? {
                debug!(clause = i, "selection is false");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Runs a functional expression. The returned handle stays valid until
    /// the constraint is cleared.
    pub fn eval_function(&mut self, dataset: &str) -> Result<Option<VarRef>> {
        if self.clauses.len() != 1 {
            return Err(DapError::invariant("The length of the list of CE clauses is not 1."));
        }
        let clauses = std::mem::take(&mut self.clauses);
        let result = clauses[0].value_of(dataset, self);
        self.clauses = clauses;
        result
    }

    // ---------------------------------------------------------------- projection

    /// Sets the projection state of `name`.
    ///
    /// The variable and everything below it take `state`. When `state` is
    /// true the enclosing constructors are switched on as well, without
    /// touching their other members; when it is false they are left alone.
    pub fn mark(&mut self, name: &str, state: bool) -> bool {
        let mut ancestors = Vec::new();
        let Some(path) = self.var_path(name, Some(&mut ancestors)) else {
            debug!(variable = name, "mark: no such variable");
            return false;
        };
        let Some(variable) = self.get_mut(&path) else {
            return false;
        };
        variable.set_send_p(state);
        if state {
            for outer in &ancestors {
                if let Some(v) = self.get_mut(outer) {
                    v.set_send_p_local(true);
                }
            }
        }
        debug!(variable = name, state, "marked");
        true
    }
    pub fn mark_all(&mut self, state: bool) {
        for v in &mut self.vars {
            v.set_send_p(state);
        }
    }

    // ---------------------------------------------------------------- output

    /// Evaluates the selection against every row of the sequence `name` that
    /// lies in its row range and collects the numbers of the rows that pass.
    pub fn select_rows(&mut self, name: &str, dataset: &str) -> Result<RoaringTreemap> {
        let path = self
            .var_path(name, None)
            .ok_or_else(|| DapError::malformed(format!("No such identifier in dataset: {name}")))?;
        self.select_rows_at(&path, dataset)
    }

    fn select_rows_at(&mut self, path: &[usize], dataset: &str) -> Result<RoaringTreemap> {
        self.read_variable(&VarRef::Dataset(path.to_vec()), dataset)?;
        let not_sequence = || DapError::malformed("Row selection applies to Sequences only.");
        let rows = self
            .get(path)
            .and_then(Variable::as_sequence)
            .map(Sequence::rows_in_range)
            .ok_or_else(not_sequence)?;
        let mut selected = RoaringTreemap::new();
        let outcome = self.select_loaded_rows(path, &rows, dataset, &mut selected);
        if let Some(sequence) = self.get_mut(path).and_then(Variable::as_sequence_mut) {
            sequence.unload_row();
        }
        outcome?;
        debug!(dataset, rows = selected.len(), "rows selected");
        Ok(selected)
    }

    fn select_loaded_rows(
        &mut self,
        path: &[usize],
        rows: &[usize],
        dataset: &str,
        selected: &mut RoaringTreemap,
    ) -> Result<()> {
        for &row in rows {
            self.get_mut(path)
                .and_then(Variable::as_sequence_mut)
                .ok_or_else(|| DapError::malformed("Row selection applies to Sequences only."))?
                .load_row(row)?;
            if self.eval_selection(dataset)? {
                selected.insert(row as u64);
            }
        }
        Ok(())
    }

    /// First top-level sequence with a field named by the selection.
    fn selected_sequence(&self) -> Option<usize> {
        self.vars.iter().position(|v| {
            v.as_sequence()
                .is_some_and(|s| s.fields().iter().any(Variable::in_selection))
        })
    }

    /// The declaration text, either of everything or of the projection only.
    pub fn print_declarations(&self, constrained: bool) -> String {
        print::declarations(&self.name, &self.vars, constrained)
    }

    /// The values of all projected variables.
    ///
    /// A projected sequence is filtered row by row and the selection does
    /// not gate anything else. Without one, nothing is printed unless the
    /// selection holds; a selection on the fields of a sequence that is not
    /// projected holds when any of its rows passes.
    pub fn print_values(&mut self, dataset: &str) -> Result<String> {
        let mut out = String::new();
        let row_filtered = self.vars.iter().any(|v| v.send_p() && v.as_sequence().is_some());
        let passes = if row_filtered {
            true
        } else if let Some(i) = self.selected_sequence() {
            !self.select_rows_at(&[i], dataset)?.is_empty()
        } else {
            self.eval_selection(dataset)?
        };
        for i in 0..self.vars.len() {
            if !self.vars[i].send_p() {
                continue;
            }
            let path = vec![i];
            if self.vars[i].as_sequence().is_some() {
                let rows = self.select_rows_at(&path, dataset)?;
                print::write_value(&mut out, &self.vars[i], Some(&rows));
            } else if passes {
                self.read_variable(&VarRef::Dataset(path), dataset)?;
                print::write_value(&mut out, &self.vars[i], None);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::TypeTag;
    use crate::reader::NullReader;

    fn dds() -> Dds {
        let mut dds = Dds::new("t", Arc::new(NullReader));
        dds.add_var_nocopy(Variable::atomic("x", TypeTag::Int32).unwrap());
        dds.add_var_nocopy(Variable::structure(
            "s",
            vec![
                Variable::atomic("x", TypeTag::Int32).unwrap(),
                Variable::structure("inner", vec![Variable::atomic("y", TypeTag::Byte).unwrap()]),
            ],
        ));
        dds
    }

    #[test]
    fn exact_match_wins_over_leaf_match() {
        let dds = dds();
        assert_eq!(dds.var_path("x", None), Some(vec![0]));
        assert_eq!(dds.var_path("s.x", None), Some(vec![1, 0]));
        assert_eq!(dds.var_path("y", None), Some(vec![1, 1, 0]));
        assert_eq!(dds.var_path("inner.y", None), Some(vec![1, 1, 0]));
        assert_eq!(dds.qualified_name(&[1, 1, 0]).as_deref(), Some("s.inner.y"));
    }

    #[test]
    fn lookup_fills_the_constructor_stack() {
        let dds = dds();
        let mut stack = Vec::new();
        dds.var_path("s.inner.y", Some(&mut stack));
        assert_eq!(stack, vec![vec![1], vec![1, 1]]);
    }

    #[test]
    fn duplicate_names_fail_semantic_check() {
        let mut dds = dds();
        assert!(dds.check_semantics().is_ok());
        dds.add_var_nocopy(Variable::atomic("x", TypeTag::Byte).unwrap());
        assert!(dds.check_semantics().is_err());
    }
}
