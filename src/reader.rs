//! The lazy `read` hook behind every variable.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Mutex;

use seahash::SeaHasher;
use tracing::trace;

use crate::datatype::{TypeTag, Value};
use crate::error::{DapError, Result};
use crate::variable::Variable;

pub type NameHasher = BuildHasherDefault<SeaHasher>;

/// Materializes variable data from a backing store.
///
/// `path` is the fully qualified (dotted) name of `variable`. Implementations
/// fill in the values, leaving members whose read flag is already set alone;
/// the caller sets the read flag afterwards and never calls `read` again for
/// a variable whose flag is already set.
pub trait DataReader: Send + Sync {
    fn read(&self, dataset: &str, path: &str, variable: &mut Variable) -> Result<()>;
}

/// A reader with nothing behind it; every read fails.
#[derive(Debug, Default)]
pub struct NullReader;

impl DataReader for NullReader {
    fn read(&self, dataset: &str, path: &str, _variable: &mut Variable) -> Result<()> {
        Err(DapError::Read {
            variable: path.to_string(),
            message: format!("dataset `{dataset}' has no data source"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(Value),
    Values(Vec<Value>),
    Rows(Vec<Vec<Value>>),
}

/// Serves data held in memory, keyed by qualified variable name, and counts
/// how often each name was read.
#[derive(Debug, Default)]
pub struct MemoryReader {
    data: HashMap<String, Payload, NameHasher>,
    reads: Mutex<HashMap<String, usize, NameHasher>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, path: &str, payload: Payload) {
        self.data.insert(path.to_string(), payload);
    }
    pub fn with_scalar(mut self, path: &str, value: Value) -> Self {
        self.insert(path, Payload::Scalar(value));
        self
    }
    pub fn with_values(mut self, path: &str, values: Vec<Value>) -> Self {
        self.insert(path, Payload::Values(values));
        self
    }
    pub fn with_rows(mut self, path: &str, rows: Vec<Vec<Value>>) -> Self {
        self.insert(path, Payload::Rows(rows));
        self
    }
    /// Number of `read` calls made for `path` (containers count once, their
    /// members are filled in as part of the same call).
    pub fn reads_of(&self, path: &str) -> usize {
        self.reads
            .lock()
            .map(|reads| reads.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
    pub fn total_reads(&self) -> usize {
        self.reads.lock().map(|reads| reads.values().sum()).unwrap_or(0)
    }

    fn fill(&self, path: &str, variable: &mut Variable) -> Result<()> {
        let missing = || DapError::Read {
            variable: path.to_string(),
            message: "no data available".into(),
        };
        match variable.type_tag() {
            tag if tag.is_scalar() => match self.data.get(path) {
                Some(Payload::Scalar(value)) => variable.set_value(value.clone()),
                _ => Err(missing()),
            },
            TypeTag::Array => match self.data.get(path) {
                Some(Payload::Values(values)) => variable
                    .as_array_mut()
                    .ok_or_else(missing)?
                    .set_values(values.clone()),
                _ => Err(missing()),
            },
            TypeTag::Sequence => match self.data.get(path) {
                Some(Payload::Rows(rows)) => variable
                    .as_sequence_mut()
                    .ok_or_else(missing)?
                    .set_rows(rows.clone()),
                _ => Err(missing()),
            },
            _ => {
                for child in variable.children_mut() {
                    if child.read_p() {
                        continue;
                    }
                    let child_path = format!("{path}.{}", child.name());
                    self.fill(&child_path, child)?;
                }
                Ok(())
            }
        }
    }
}

impl DataReader for MemoryReader {
    fn read(&self, dataset: &str, path: &str, variable: &mut Variable) -> Result<()> {
        trace!(dataset, path, "memory read");
        if let Ok(mut reads) = self.reads.lock() {
            *reads.entry(path.to_string()).or_insert(0) += 1;
        }
        self.fill(path, variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structures_fill_their_members() {
        let reader = MemoryReader::new()
            .with_scalar("s.a", Value::Int16(3))
            .with_scalar("s.b", Value::Str("x".into()));
        let mut s = Variable::structure(
            "s",
            vec![
                Variable::atomic("a", TypeTag::Int16).unwrap(),
                Variable::atomic("b", TypeTag::Str).unwrap(),
            ],
        );
        reader.read("test", "s", &mut s).unwrap();
        assert_eq!(s.children()[0].value(), Some(&Value::Int16(3)));
        assert_eq!(reader.reads_of("s"), 1);
        assert_eq!(reader.reads_of("s.a"), 0);
    }

    #[test]
    fn members_already_read_are_kept() {
        let reader = MemoryReader::new().with_scalar("s.b", Value::Str("x".into()));
        let mut s = Variable::structure(
            "s",
            vec![
                Variable::atomic("a", TypeTag::Int16).unwrap(),
                Variable::atomic("b", TypeTag::Str).unwrap(),
            ],
        );
        let a = &mut s.children_mut()[0];
        a.set_value(Value::Int16(5)).unwrap();
        a.set_read_p(true);
        // s.a has no stored data, so refilling it would fail
        reader.read("test", "s", &mut s).unwrap();
        assert_eq!(s.children()[0].value(), Some(&Value::Int16(5)));
        assert_eq!(s.children()[1].value(), Some(&Value::Str("x".into())));
    }

    #[test]
    fn missing_data_is_a_read_error() {
        let reader = MemoryReader::new();
        let mut v = Variable::atomic("v", TypeTag::Byte).unwrap();
        let err = reader.read("test", "v", &mut v).unwrap_err();
        assert!(matches!(err, DapError::Read { .. }));
    }
}
