//! Runtime settings, layered from defaults, an optional settings file and
//! `DAPCE_*` environment variables (later sources win).

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Tracing filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Print the constrained DDS before the values.
    pub print_dds: bool,
    /// Dataset description to load when none is given on the command line.
    #[serde(default)]
    pub dataset: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { log_filter: "warn".into(), print_dds: false, dataset: None }
    }
}

impl Settings {
    /// With `path` that file must exist; without it `dapce.{toml,json,yaml,...}`
    /// in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("log_filter", defaults.log_filter)?
            .set_default("print_dds", defaults.print_dds)?;
        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("dapce").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("DAPCE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
