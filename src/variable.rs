//! Variables: the typed nodes of a dataset description.
//!
//! A [`Variable`] carries a name, a [`VarKind`] and three flags:
//! * `read_p`, whether its data has been materialized,
//! * `send_p`, whether it is part of the current projection,
//! * `in_selection`, whether a selection clause refers to it.
//!
//! Structures, Sequences and Grids own their children. Arrays hold scalar
//! elements and a constraint per dimension. Nothing here reads data; that is
//! the job of a [`crate::reader::DataReader`].

use crate::datatype::{TypeTag, Value};
use crate::error::{DapError, Result};
use crate::projection::IndexTriple;

/// Child-index path from the top level of a DDS down to a variable.
pub type VarPath = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    name: Option<String>,
    size: usize,
    constraint: IndexTriple,
}

impl Dimension {
    pub fn new(name: Option<&str>, size: usize) -> Self {
        Self {
            name: name.map(str::to_string),
            size,
            constraint: IndexTriple::whole(size),
        }
    }
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn constraint(&self) -> IndexTriple {
        self.constraint
    }
    pub fn constrained_size(&self) -> usize {
        if self.size == 0 { 0 } else { self.constraint.count() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element: TypeTag,
    dims: Vec<Dimension>,
    values: Vec<Value>,
}

impl Array {
    pub fn new(element: TypeTag, dims: Vec<Dimension>) -> Result<Self> {
        if !element.is_scalar() {
            return Err(DapError::Dataset(format!("Arrays of {element} are not supported")));
        }
        if dims.is_empty() {
            return Err(DapError::Dataset("An Array needs at least one dimension".into()));
        }
        Ok(Self { element, dims, values: Vec::new() })
    }
    pub fn element(&self) -> TypeTag {
        self.element
    }
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    /// Total number of elements, ignoring constraints.
    pub fn len(&self) -> usize {
        self.dims.iter().map(Dimension::size).product()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn constrained_len(&self) -> usize {
        self.dims.iter().map(Dimension::constrained_size).product()
    }
    /// Stores the row-major element values (`val2buf`).
    pub fn set_values(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.len() {
            return Err(DapError::Dataset(format!(
                "Expected {} values but got {}",
                self.len(),
                values.len()
            )));
        }
        if let Some(v) = values.iter().find(|v| v.type_tag() != self.element) {
            return Err(DapError::Dataset(format!("{} value in an Array of {}", v.type_tag(), self.element)));
        }
        self.values = values;
        Ok(())
    }
    /// Replaces the constraint on one dimension.
    pub fn add_constraint(&mut self, dim: usize, triple: IndexTriple) -> Result<()> {
        let d = self
            .dims
            .get_mut(dim)
            .ok_or_else(|| DapError::invariant(format!("no dimension {dim}")))?;
        if triple.stop >= d.size || triple.stride < 1 || triple.start > triple.stop {
            return Err(DapError::malformed(format!(
                "Invalid constraint parameters {triple} for a dimension of size {}.",
                d.size
            )));
        }
        d.constraint = triple;
        Ok(())
    }
    pub fn reset_constraint(&mut self) {
        for d in &mut self.dims {
            d.constraint = IndexTriple::whole(d.size);
        }
    }
    /// Row-major offsets of the elements selected by the current constraints.
    pub fn constrained_offsets(&self) -> Vec<usize> {
        let mut offsets = vec![0usize];
        for d in &self.dims {
            let mut next = Vec::with_capacity(offsets.len() * d.constrained_size());
            for base in &offsets {
                for i in d.constraint.indices() {
                    next.push(base * d.size + i);
                }
            }
            offsets = next;
        }
        offsets
    }
    pub fn constrained_values(&self) -> Vec<&Value> {
        self.constrained_offsets()
            .into_iter()
            .filter_map(|o| self.values.get(o))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    fields: Vec<Variable>,
    rows: Vec<Vec<Value>>,
    row_range: Option<IndexTriple>,
}

impl Sequence {
    /// Sequence fields are scalars; each row holds one value per field.
    pub fn new(fields: Vec<Variable>) -> Result<Self> {
        if let Some(f) = fields.iter().find(|f| !f.type_tag().is_scalar()) {
            return Err(DapError::Dataset(format!(
                "Sequence field `{}' must be a scalar, not {}",
                f.name(),
                f.type_tag()
            )));
        }
        Ok(Self { fields, rows: Vec::new(), row_range: None })
    }
    pub fn fields(&self) -> &[Variable] {
        &self.fields
    }
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
    pub fn set_rows(&mut self, rows: Vec<Vec<Value>>) -> Result<()> {
        for (r, row) in rows.iter().enumerate() {
            if row.len() != self.fields.len() {
                return Err(DapError::Dataset(format!(
                    "Row {r} has {} values for {} fields",
                    row.len(),
                    self.fields.len()
                )));
            }
            for (value, field) in row.iter().zip(&self.fields) {
                if value.type_tag() != field.type_tag() {
                    return Err(DapError::Dataset(format!(
                        "Row {r}: {} value for {} field `{}'",
                        value.type_tag(),
                        field.type_tag(),
                        field.name()
                    )));
                }
            }
        }
        self.rows = rows;
        Ok(())
    }
    pub fn row_range(&self) -> Option<IndexTriple> {
        self.row_range
    }
    pub fn set_row_number_constraint(&mut self, range: IndexTriple) {
        self.row_range = Some(range);
    }
    pub fn reset_row_constraint(&mut self) {
        self.row_range = None;
    }
    /// Row numbers inside the row-range constraint that actually exist.
    pub fn rows_in_range(&self) -> Vec<usize> {
        let count = self.rows.len();
        match self.row_range {
            Some(range) => range.indices().take_while(|r| *r < count).collect(),
            None => (0..count).collect(),
        }
    }
    /// Copies row `row` into the field variables and marks them read.
    pub fn load_row(&mut self, row: usize) -> Result<()> {
        let values = self
            .rows
            .get(row)
            .ok_or_else(|| DapError::invariant(format!("row {row} does not exist")))?;
        for (field, value) in self.fields.iter_mut().zip(values) {
            field.set_value(value.clone())?;
            field.set_read_p(true);
        }
        Ok(())
    }
    /// Forgets the row copied in by [`Sequence::load_row`].
    pub fn unload_row(&mut self) {
        for field in &mut self.fields {
            if let VarKind::Atomic { value, .. } = &mut field.kind {
                *value = None;
            }
        }
    }
}

/// A data array plus one 1-D map vector per array dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    // index 0 is the data array, the rest are the maps in dimension order
    parts: Vec<Variable>,
}

impl Grid {
    pub fn new(array: Variable, maps: Vec<Variable>) -> Result<Self> {
        let Some(data) = array.as_array() else {
            return Err(DapError::Dataset(format!("Grid array `{}' is not an Array", array.name())));
        };
        if data.dims().len() != maps.len() {
            return Err(DapError::Dataset(format!(
                "Grid array `{}' has {} dimensions but {} maps",
                array.name(),
                data.dims().len(),
                maps.len()
            )));
        }
        for (dim, map) in data.dims().iter().zip(&maps) {
            match map.as_array() {
                Some(m) if m.dims().len() == 1 && m.dims()[0].size() == dim.size() => (),
                _ => {
                    return Err(DapError::Dataset(format!(
                        "Map `{}' must be a 1-D Array of size {}",
                        map.name(),
                        dim.size()
                    )));
                }
            }
        }
        let mut parts = Vec::with_capacity(maps.len() + 1);
        parts.push(array);
        parts.extend(maps);
        Ok(Self { parts })
    }
    pub fn array_var(&self) -> &Variable {
        &self.parts[0]
    }
    pub fn array_var_mut(&mut self) -> &mut Variable {
        &mut self.parts[0]
    }
    pub fn maps(&self) -> &[Variable] {
        &self.parts[1..]
    }
    pub fn maps_mut(&mut self) -> &mut [Variable] {
        &mut self.parts[1..]
    }
    pub fn map_position(&self, name: &str) -> Option<usize> {
        self.maps().iter().position(|m| m.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarKind {
    Atomic { tag: TypeTag, value: Option<Value> },
    Array(Array),
    Structure(Vec<Variable>),
    Sequence(Sequence),
    Grid(Grid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    kind: VarKind,
    read_p: bool,
    send_p: bool,
    in_selection: bool,
}

impl Variable {
    fn new(name: &str, kind: VarKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            read_p: false,
            send_p: false,
            in_selection: false,
        }
    }
    pub fn atomic(name: &str, tag: TypeTag) -> Result<Self> {
        if !tag.is_scalar() {
            return Err(DapError::Dataset(format!("{tag} is not a scalar type")));
        }
        Ok(Self::new(name, VarKind::Atomic { tag, value: None }))
    }
    /// A scalar that already holds its value, such as a constant.
    pub fn with_value(name: &str, value: Value) -> Self {
        let mut v = Self::new(name, VarKind::Atomic { tag: value.type_tag(), value: Some(value) });
        v.read_p = true;
        v
    }
    pub fn array(name: &str, array: Array) -> Self {
        Self::new(name, VarKind::Array(array))
    }
    pub fn structure(name: &str, fields: Vec<Variable>) -> Self {
        Self::new(name, VarKind::Structure(fields))
    }
    pub fn sequence(name: &str, sequence: Sequence) -> Self {
        Self::new(name, VarKind::Sequence(sequence))
    }
    pub fn grid(name: &str, grid: Grid) -> Self {
        Self::new(name, VarKind::Grid(grid))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
    pub fn kind(&self) -> &VarKind {
        &self.kind
    }
    pub fn type_tag(&self) -> TypeTag {
        match &self.kind {
            VarKind::Atomic { tag, .. } => *tag,
            VarKind::Array(_) => TypeTag::Array,
            VarKind::Structure(_) => TypeTag::Structure,
            VarKind::Sequence(_) => TypeTag::Sequence,
            VarKind::Grid(_) => TypeTag::Grid,
        }
    }
    pub fn is_constructor(&self) -> bool {
        self.type_tag().is_constructor()
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            VarKind::Atomic { value, .. } => value.as_ref(),
            _ => None,
        }
    }
    pub fn set_value(&mut self, new: Value) -> Result<()> {
        match &mut self.kind {
            VarKind::Atomic { tag, value } if *tag == new.type_tag() => {
                *value = Some(new);
                Ok(())
            }
            _ => Err(DapError::Dataset(format!(
                "Cannot store a {} value in {} `{}'",
                new.type_tag(),
                self.type_tag(),
                self.name
            ))),
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match &self.kind {
            VarKind::Array(a) => Some(a),
            _ => None,
        }
    }
    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match &mut self.kind {
            VarKind::Array(a) => Some(a),
            _ => None,
        }
    }
    pub fn as_sequence(&self) -> Option<&Sequence> {
        match &self.kind {
            VarKind::Sequence(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_sequence_mut(&mut self) -> Option<&mut Sequence> {
        match &mut self.kind {
            VarKind::Sequence(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_grid(&self) -> Option<&Grid> {
        match &self.kind {
            VarKind::Grid(g) => Some(g),
            _ => None,
        }
    }
    pub fn as_grid_mut(&mut self) -> Option<&mut Grid> {
        match &mut self.kind {
            VarKind::Grid(g) => Some(g),
            _ => None,
        }
    }

    /// Named children of a constructor; empty for anything else.
    pub fn children(&self) -> &[Variable] {
        match &self.kind {
            VarKind::Structure(fields) => fields.as_slice(),
            VarKind::Sequence(s) => s.fields.as_slice(),
            VarKind::Grid(g) => g.parts.as_slice(),
            _ => &[],
        }
    }
    pub fn children_mut(&mut self) -> &mut [Variable] {
        match &mut self.kind {
            VarKind::Structure(fields) => fields.as_mut_slice(),
            VarKind::Sequence(s) => s.fields.as_mut_slice(),
            VarKind::Grid(g) => g.parts.as_mut_slice(),
            _ => &mut [],
        }
    }
    pub fn descendant(&self, path: &[usize]) -> Option<&Variable> {
        match path.split_first() {
            None => Some(self),
            Some((i, rest)) => self.children().get(*i)?.descendant(rest),
        }
    }
    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Variable> {
        match path.split_first() {
            None => Some(self),
            Some((i, rest)) => self.children_mut().get_mut(*i)?.descendant_mut(rest),
        }
    }

    pub fn read_p(&self) -> bool {
        self.read_p
    }
    pub fn set_read_p(&mut self, state: bool) {
        self.read_p = state;
        for child in self.children_mut() {
            child.set_read_p(state);
        }
    }
    pub fn send_p(&self) -> bool {
        self.send_p
    }
    /// Sets the flag on this variable and everything below it.
    pub fn set_send_p(&mut self, state: bool) {
        self.send_p = state;
        for child in self.children_mut() {
            child.set_send_p(state);
        }
    }
    /// Sets the flag on this variable only.
    pub fn set_send_p_local(&mut self, state: bool) {
        self.send_p = state;
    }
    pub fn in_selection(&self) -> bool {
        self.in_selection
    }
    pub fn set_in_selection(&mut self, state: bool) {
        self.in_selection = state;
        for child in self.children_mut() {
            child.set_in_selection(state);
        }
    }

    /// Drops array constraints and sequence row ranges below this variable.
    pub fn reset_constraints(&mut self) {
        match &mut self.kind {
            VarKind::Array(a) => a.reset_constraint(),
            VarKind::Sequence(s) => s.reset_row_constraint(),
            _ => (),
        }
        for child in self.children_mut() {
            child.reset_constraints();
        }
    }

    /// Finds `name` among the descendants of this variable and returns the
    /// child-index path to it.
    ///
    /// With `exact` the name must be a direct child or a dotted path of exact
    /// names. Without it the first child of that name found depth first, in
    /// declaration order, wins.
    pub fn locate(&self, name: &str, exact: bool) -> Option<VarPath> {
        if exact { self.exact_match(name) } else { self.leaf_match(name) }
    }

    fn exact_match(&self, name: &str) -> Option<VarPath> {
        if let Some(i) = self.children().iter().position(|c| c.name() == name) {
            return Some(vec![i]);
        }
        let (aggregate, field) = name.split_once('.')?;
        let mut path = self.exact_match(aggregate)?;
        let rest = self.descendant(&path)?.exact_match(field)?;
        path.extend(rest);
        Some(path)
    }

    fn leaf_match(&self, name: &str) -> Option<VarPath> {
        for (i, child) in self.children().iter().enumerate() {
            if child.name() == name {
                return Some(vec![i]);
            }
            if child.is_constructor() {
                if let Some(rest) = child.leaf_match(name) {
                    let mut path = vec![i];
                    path.extend(rest);
                    return Some(path);
                }
            }
        }
        None
    }
}
