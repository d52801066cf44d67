//! Fluent builders for raster and vector cubes.
//!
//! Every operation returns a new cube whose node takes the current one as
//! input; nothing is sent until the graph is downloaded or submitted.

use serde_json::{Value, json};
use std::rc::Rc;

use super::graph::{Argument, FlatGraph, PgNode, flatten};
use super::udf::Udf;
use crate::config::DateRange;

fn reducer(process_id: &str) -> Argument {
    Argument::Callback(PgNode::new(
        process_id,
        [("data", Argument::Parameter("data".to_string()))],
    ))
}

#[derive(Debug, Clone)]
pub struct DataCube {
    node: Rc<PgNode>,
}

impl From<&DataCube> for Argument {
    fn from(cube: &DataCube) -> Self {
        Argument::Node(cube.node.clone())
    }
}

impl DataCube {
    pub fn from_node(node: Rc<PgNode>) -> Self {
        Self { node }
    }

    pub fn load_collection(collection_id: &str, bands: Option<&[&str]>) -> Self {
        let mut arguments = vec![
            ("id", Argument::from(collection_id)),
            ("spatial_extent", Argument::Value(Value::Null)),
            ("temporal_extent", Argument::Value(Value::Null)),
        ];
        if let Some(bands) = bands {
            arguments.push(("bands", Argument::Value(json!(bands))));
        }
        Self::from_node(PgNode::new("load_collection", arguments))
    }

    /// Cube produced by a predefined or user-defined process.
    pub fn from_process<'a, I>(process_id: &str, namespace: Option<&str>, arguments: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Argument)>,
    {
        let node = match namespace {
            Some(namespace) => PgNode::with_namespace(process_id, namespace, arguments),
            None => PgNode::new(process_id, arguments),
        };
        Self::from_node(node)
    }

    fn process<'a, I>(&self, process_id: &str, arguments: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Argument)>,
    {
        let arguments = std::iter::once(("data", Argument::from(self))).chain(arguments);
        Self::from_node(PgNode::new(process_id, arguments))
    }

    pub fn filter_temporal(&self, range: &DateRange) -> Self {
        self.process("filter_temporal", [("extent", Argument::Value(json!(range)))])
    }

    /// Masks pixels outside `mask`, a vector cube or inline GeoJSON.
    pub fn mask_polygon(&self, mask: impl Into<Argument>) -> Self {
        self.process("mask_polygon", [("mask", mask.into())])
    }

    pub fn reduce_dimension(&self, dimension: &str, reducer_process: &str) -> Self {
        self.process(
            "reduce_dimension",
            [
                ("dimension", Argument::from(dimension)),
                ("reducer", reducer(reducer_process)),
            ],
        )
    }

    /// Composite over time keeping the maximum.
    pub fn max_time(&self) -> Self {
        self.reduce_dimension("t", "max")
    }

    pub fn merge_cubes(&self, other: &DataCube) -> Self {
        Self::from_node(PgNode::new(
            "merge_cubes",
            [("cube1", Argument::from(self)), ("cube2", Argument::from(other))],
        ))
    }

    pub fn add_dimension(&self, name: &str, label: &str, kind: &str) -> Self {
        self.process(
            "add_dimension",
            [
                ("name", Argument::from(name)),
                ("label", Argument::from(label)),
                ("type", Argument::from(kind)),
            ],
        )
    }

    pub fn resample_spatial(&self, resolution: f64, projection: u32, method: &str) -> Self {
        self.process(
            "resample_spatial",
            [
                ("resolution", Argument::from(resolution)),
                ("projection", Argument::Value(json!(projection))),
                ("method", Argument::from(method)),
                ("align", Argument::from("upper-left")),
            ],
        )
    }

    pub fn resample_cube_spatial(&self, target: &DataCube, method: &str) -> Self {
        self.process(
            "resample_cube_spatial",
            [
                ("target", Argument::from(target)),
                ("method", Argument::from(method)),
            ],
        )
    }

    /// `apply` with a UDF run on every chunk (callback parameter `x`).
    pub fn apply_udf(&self, udf: &Udf) -> Self {
        let callback = PgNode::new(
            "run_udf",
            udf.arguments(Argument::Parameter("x".to_string())),
        );
        self.process("apply", [("process", Argument::Callback(callback))])
    }

    pub fn save_result(&self, format: &str, options: Value) -> Self {
        self.process(
            "save_result",
            [
                ("format", Argument::from(format)),
                ("options", Argument::Value(options)),
            ],
        )
    }

    /// Ends the pipeline in `save_result` unless it already does.
    pub fn ensure_save_result(&self, format: &str, options: Value) -> Self {
        if self.node.process_id() == "save_result" {
            self.clone()
        } else {
            self.save_result(format, options)
        }
    }

    pub fn flat_graph(&self) -> FlatGraph {
        flatten(&self.node)
    }
}

#[derive(Debug, Clone)]
pub struct VectorCube {
    node: Rc<PgNode>,
}

impl From<&VectorCube> for Argument {
    fn from(cube: &VectorCube) -> Self {
        Argument::Node(cube.node.clone())
    }
}

impl VectorCube {
    /// Vector cube produced by running `udf` on `data` (GeoJSON or a parameter).
    pub fn run_udf(data: impl Into<Argument>, udf: &Udf) -> Self {
        Self {
            node: PgNode::new("run_udf", udf.arguments(data.into())),
        }
    }
}
