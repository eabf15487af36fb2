//! Bracket projections: `[i]`, `[i:j]` and `[i:s:j]` applied to arrays, grids
//! and sequence row ranges.

use std::fmt;

use tracing::debug;

use crate::error::{DapError, Result};
use crate::variable::{Variable, VarKind};

/// One `[...]` group exactly as written, one to three integers.
pub type IndexGroup = Vec<i64>;

/// Start, stride and stop of a constraint on one dimension (inclusive stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexTriple {
    pub start: usize,
    pub stride: usize,
    pub stop: usize,
}

impl IndexTriple {
    pub fn new(start: usize, stride: usize, stop: usize) -> Self {
        Self { start, stride, stop }
    }
    /// The unconstrained triple for a dimension of `size` elements.
    pub fn whole(size: usize) -> Self {
        Self { start: 0, stride: 1, stop: size.saturating_sub(1) }
    }
    /// Reads `[i]`, `[i:j]` or `[i:s:j]`, checking only what does not depend
    /// on the size of the target dimension.
    pub fn from_group(group: &[i64], name: &str) -> Result<Self> {
        let (start, stride, stop) = match *group {
            [i] => (i, 1, i),
            [i, j] => (i, 1, j),
            [i, s, j] => (i, s, j),
            _ => {
                return Err(DapError::malformed(format!(
                    "Wrong number of values in an index for `{name}' (expected one to three, got {})",
                    group.len()
                )));
            }
        };
        if start < 0 || stop < 0 {
            return Err(DapError::malformed(format!("Negative index in constraint for `{name}'.")));
        }
        if stride < 1 {
            return Err(DapError::malformed(format!("The stride for `{name}' must be at least one.")));
        }
        if start > stop {
            return Err(DapError::malformed(format!(
                "Starting index {start} must not exceed the ending index {stop} for `{name}'."
            )));
        }
        Ok(Self::new(start as usize, stride as usize, stop as usize))
    }
    pub fn check_size(&self, size: usize, name: &str) -> Result<()> {
        if self.stop >= size {
            return Err(DapError::malformed(format!(
                "Invalid constraint parameters for `{name}': index {} is out of range for a dimension of size {size}.",
                self.stop
            )));
        }
        Ok(())
    }
    /// Number of indices the triple selects.
    pub fn count(&self) -> usize {
        (self.stop - self.start) / self.stride + 1
    }
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        (self.start..=self.stop).step_by(self.stride)
    }
}

impl fmt::Display for IndexTriple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.start, self.stride, self.stop)
    }
}

/// Applies one index group per dimension to an Array.
pub fn process_array_indices(variable: &mut Variable, indices: &[IndexGroup]) -> Result<()> {
    let name = variable.name().to_string();
    let Some(array) = variable.as_array_mut() else {
        return Err(DapError::malformed(format!("`{name}' is not an Array.")));
    };
    let rank = array.dims().len();
    if indices.len() > rank {
        return Err(DapError::malformed(format!("Too many indices in constraint for {name}.")));
    }
    if indices.len() < rank {
        return Err(DapError::malformed(format!("Too few indices in constraint for {name}.")));
    }
    // validate everything before touching the array, so a bad group leaves it as it was
    let mut triples = Vec::with_capacity(rank);
    for (group, dim) in indices.iter().zip(array.dims()) {
        let triple = IndexTriple::from_group(group, &name)?;
        triple.check_size(dim.size(), &name)?;
        triples.push(triple);
    }
    for (position, triple) in triples.into_iter().enumerate() {
        array.add_constraint(position, triple)?;
    }
    debug!(variable = %name, "array constraint applied");
    Ok(())
}

/// Applies index groups to a Grid: the data array first, then the maps.
///
/// Every map is dropped from the projection and each map that receives an
/// index group is put back with that group as its constraint.
pub fn process_grid_indices(variable: &mut Variable, indices: &[IndexGroup]) -> Result<()> {
    let name = variable.name().to_string();
    let Some(grid) = variable.as_grid_mut() else {
        return Err(DapError::malformed(format!("`{name}' is not a Grid.")));
    };
    process_array_indices(grid.array_var_mut(), indices)?;
    for map in grid.maps_mut() {
        map.set_send_p(false);
    }
    let mut maps = grid.maps_mut().iter_mut();
    for group in indices {
        let Some(map) = maps.next() else {
            return Err(DapError::malformed(format!("Too many indices in constraint for {name}.")));
        };
        let triple = IndexTriple::from_group(group, map.name())?;
        map.set_send_p(true);
        let map_name = map.name().to_string();
        let array = map
            .as_array_mut()
            .ok_or_else(|| DapError::invariant(format!("map `{map_name}' of `{name}' is not an Array")))?;
        array.reset_constraint();
        array.add_constraint(0, triple)?;
    }
    debug!(variable = %name, "grid constraint applied");
    Ok(())
}

/// A Sequence takes a single index group, read as a row range.
pub fn process_sequence_indices(variable: &mut Variable, indices: &[IndexGroup]) -> Result<()> {
    let name = variable.name().to_string();
    let Some(sequence) = variable.as_sequence_mut() else {
        return Err(DapError::malformed(format!("`{name}' is not a Sequence.")));
    };
    match indices {
        [] => Ok(()),
        [group] => {
            let triple = IndexTriple::from_group(group, &name)?;
            sequence.set_row_number_constraint(triple);
            debug!(variable = %name, rows = %triple, "row range applied");
            Ok(())
        }
        _ => Err(DapError::malformed(format!("Too many indices in constraint for {name}."))),
    }
}

/// Dispatches a bracket projection on the type of its target.
pub fn process_indices(variable: &mut Variable, indices: &[IndexGroup]) -> Result<()> {
    match variable.kind() {
        VarKind::Array(_) => process_array_indices(variable, indices),
        VarKind::Grid(_) => process_grid_indices(variable, indices),
        VarKind::Sequence(_) => process_sequence_indices(variable, indices),
        _ => Err(DapError::malformed(format!(
            "The indices given for `{}' are not valid for its type ({}).",
            variable.name(),
            variable.type_tag()
        ))),
    }
}
