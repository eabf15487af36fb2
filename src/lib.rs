//! Dapce – a constraint-expression evaluator for DAP2 datasets.
//!
//! A dataset is described by a tree of typed variables (its DDS). A client
//! asks for a subset of it with a *constraint expression* such as
//! `sst[0:2][10:20],cast&cast.t>20&cast.site=~"A.*"`, which has two parts:
//! * a projection: the variables to return, optionally narrowed by index
//!   ranges or by projection functions such as `grid()`,
//! * a selection: `&`-separated clauses that must all hold for data to be
//!   returned, evaluated lazily against values read on demand.
//!
//! ## Modules
//! * [`datatype`] – The thirteen type tags and the scalar [`datatype::Value`].
//! * [`variable`] – [`variable::Variable`] and its Array, Structure, Sequence and Grid forms.
//! * [`operators`] – Relational operators and the comparison policies for mixed types.
//! * [`projection`] – Index triples and bracket projection on arrays, grids and sequences.
//! * [`clause`] – Operands ([`clause::RValue`]) and clauses of a parsed constraint.
//! * [`functions`] – Boolean, value and projection functions, plus built-ins.
//! * [`dds`] – The [`dds::Dds`]: lookup, marking, selection and function evaluation.
//! * [`parser`] – The constraint front end. Grammar details live in `constraint.pest`.
//! * [`reader`] – The [`reader::DataReader`] hook that materializes data.
//! * [`dataset`] – JSON dataset descriptions.
//! * [`print`] – Declaration and value text.
//! * [`settings`] – Layered runtime settings.
//!
//! ## Quick Start
//! ```
//! use dapce::dataset;
//! let json = r#"{ "name": "demo", "variables": [
//!     { "name": "x", "type": "Int32", "value": 7 },
//!     { "name": "y", "type": "Float64", "value": 2.5 } ] }"#;
//! let mut dds = dataset::load(json).unwrap();
//! dds.parse_constraint("y&x>5").unwrap();
//! assert!(dds.eval_selection("demo").unwrap());
//! assert!(dds.var("y").unwrap().send_p());
//! assert!(!dds.var("x").unwrap().send_p());
//! ```
//!
//! ## Lifecycle
//! A [`dds::Dds`] is built once per dataset and cloned per request. Parsing a
//! constraint clears the previous one. Variables are read at most once per
//! clone, and only when an operand or a function actually needs them.

pub mod clause;
pub mod dataset;
pub mod datatype;
pub mod dds;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod print;
pub mod projection;
pub mod reader;
pub mod settings;
pub mod variable;

pub use clause::{Clause, RValue, VarRef};
pub use datatype::{TypeTag, Value};
pub use dds::Dds;
pub use error::{DapError, ErrorKind, Result};
pub use operators::RelOp;
pub use variable::Variable;
