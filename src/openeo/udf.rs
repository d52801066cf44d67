use serde_json::Value;
use std::fs;
use std::path::Path;

use super::error::{OpenEoError, Result};
use super::graph::Argument;

/// User-defined function shipped inline with a process graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Udf {
    pub code: String,
    pub runtime: String,
    pub version: Option<String>,
    pub context: Option<Value>,
}

impl Udf {
    pub fn python(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            runtime: "Python".to_string(),
            version: None,
            context: None,
        }
    }

    /// Reads `dir/name` as a Python UDF.
    pub fn from_file(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(name);
        let code = fs::read_to_string(&path).map_err(|source| OpenEoError::Udf {
            path: path.clone(),
            source,
        })?;
        Ok(Self::python(code))
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// `run_udf` arguments applying this UDF to `data`.
    pub(crate) fn arguments(&self, data: Argument) -> Vec<(&'static str, Argument)> {
        let mut arguments = vec![
            ("data", data),
            ("udf", Argument::from(self.code.as_str())),
            ("runtime", Argument::from(self.runtime.as_str())),
        ];
        if let Some(version) = &self.version {
            arguments.push(("version", Argument::from(version.as_str())));
        }
        if let Some(context) = &self.context {
            arguments.push(("context", Argument::Value(context.clone())));
        }
        arguments
    }
}
