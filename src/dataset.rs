//! Dataset descriptions in JSON.
//!
//! ```json
//! { "name": "ocean", "filename": "ocean.nc", "variables": [
//!     { "name": "depth", "type": "Float64", "value": 4.5 },
//!     { "name": "sst", "type": "Array", "element": "Float32",
//!       "dims": [ { "name": "lat", "size": 2 }, 3 ], "values": [ ... ] },
//!     { "name": "station", "type": "Structure", "fields": [ ... ] },
//!     { "name": "cast", "type": "Sequence",
//!       "fields": [ { "name": "t", "type": "Int32" } ], "rows": [ [1], [2] ] },
//!     { "name": "g", "type": "Grid", "array": { ... }, "maps": [ ... ] }
//! ] }
//! ```
//!
//! Declarations become variables without data. The data goes into a
//! [`MemoryReader`] so it is materialized on demand like any other read.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::datatype::{TypeTag, Value};
use crate::dds::Dds;
use crate::error::{DapError, Result};
use crate::reader::{MemoryReader, Payload};
use crate::variable::{Array, Dimension, Grid, Sequence, Variable};

#[derive(Debug, Deserialize)]
pub struct DatasetDecl {
    pub name: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub variables: Vec<Declaration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DimDecl {
    Size(usize),
    Named {
        #[serde(default)]
        name: Option<String>,
        size: usize,
    },
}

#[derive(Debug, Deserialize)]
pub struct Declaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub dims: Vec<DimDecl>,
    #[serde(default)]
    pub values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub fields: Vec<Declaration>,
    #[serde(default)]
    pub rows: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    pub array: Option<Box<Declaration>>,
    #[serde(default)]
    pub maps: Vec<Declaration>,
}

pub fn load(json: &str) -> Result<Dds> {
    let decl: DatasetDecl = serde_json::from_str(json)?;
    build(decl)
}

pub fn load_file(path: &Path) -> Result<Dds> {
    let text = std::fs::read_to_string(path)?;
    let dds = load(&text)?;
    info!(path = %path.display(), variables = dds.num_var(), "dataset loaded");
    Ok(dds)
}

pub fn build(decl: DatasetDecl) -> Result<Dds> {
    let mut reader = MemoryReader::new();
    let mut vars = Vec::with_capacity(decl.variables.len());
    for v in &decl.variables {
        vars.push(variable(v, &v.name, &mut reader)?);
    }
    let mut dds = Dds::new(&decl.name, Arc::new(reader));
    dds.set_filename(decl.filename.as_deref().unwrap_or(&decl.name));
    for v in vars {
        dds.add_var_nocopy(v);
    }
    dds.check_semantics()?;
    Ok(dds)
}

/// Builds the variable for `decl`, registering its data under `path`.
fn variable(decl: &Declaration, path: &str, reader: &mut MemoryReader) -> Result<Variable> {
    let tag: TypeTag = decl.type_name.parse()?;
    match tag {
        TypeTag::Array => {
            let array = array(decl, path, reader)?;
            Ok(Variable::array(&decl.name, array))
        }
        TypeTag::Structure => {
            let mut fields = Vec::with_capacity(decl.fields.len());
            for f in &decl.fields {
                fields.push(variable(f, &format!("{path}.{}", f.name), reader)?);
            }
            Ok(Variable::structure(&decl.name, fields))
        }
        TypeTag::Sequence => {
            let mut fields = Vec::with_capacity(decl.fields.len());
            let mut tags = Vec::with_capacity(decl.fields.len());
            for f in &decl.fields {
                let field_tag: TypeTag = f.type_name.parse()?;
                fields.push(Variable::atomic(&f.name, field_tag)?);
                tags.push(field_tag);
            }
            let sequence = Sequence::new(fields)?;
            if let Some(rows) = &decl.rows {
                let mut typed = Vec::with_capacity(rows.len());
                for (r, row) in rows.iter().enumerate() {
                    if row.len() != tags.len() {
                        return Err(DapError::Dataset(format!(
                            "Row {r} of `{path}' has {} values for {} fields",
                            row.len(),
                            tags.len()
                        )));
                    }
                    typed.push(
                        row.iter()
                            .zip(&tags)
                            .map(|(json, tag)| Value::from_json(*tag, json))
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                reader.insert(path, Payload::Rows(typed));
            }
            Ok(Variable::sequence(&decl.name, sequence))
        }
        TypeTag::Grid => {
            let array_decl = decl
                .array
                .as_deref()
                .ok_or_else(|| DapError::Dataset(format!("Grid `{path}' has no array")))?;
            let data = variable(array_decl, &format!("{path}.{}", array_decl.name), reader)?;
            let mut maps = Vec::with_capacity(decl.maps.len());
            for m in &decl.maps {
                maps.push(variable(m, &format!("{path}.{}", m.name), reader)?);
            }
            Ok(Variable::grid(&decl.name, Grid::new(data, maps)?))
        }
        scalar => {
            if let Some(json) = &decl.value {
                reader.insert(path, Payload::Scalar(Value::from_json(scalar, json)?));
            }
            Variable::atomic(&decl.name, scalar)
        }
    }
}

fn array(decl: &Declaration, path: &str, reader: &mut MemoryReader) -> Result<Array> {
    let element: TypeTag = decl
        .element
        .as_deref()
        .ok_or_else(|| DapError::Dataset(format!("Array `{path}' has no element type")))?
        .parse()?;
    let dims = decl
        .dims
        .iter()
        .map(|d| match d {
            DimDecl::Size(size) => Dimension::new(None, *size),
            DimDecl::Named { name, size } => Dimension::new(name.as_deref(), *size),
        })
        .collect();
    let array = Array::new(element, dims)?;
    if let Some(values) = &decl.values {
        let typed = values
            .iter()
            .map(|json| Value::from_json(element, json))
            .collect::<Result<Vec<_>>>()?;
        if typed.len() != array.len() {
            return Err(DapError::Dataset(format!(
                "Array `{path}' declares {} elements but lists {}",
                array.len(),
                typed.len()
            )));
        }
        reader.insert(path, Payload::Values(typed));
    }
    Ok(array)
}
