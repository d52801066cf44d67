//! Process graph nodes and their flat JSON encoding.
//!
//! A pipeline is built as a tree of reference-counted [`PgNode`]s: arguments
//! point at the nodes producing their input. [`flatten`] turns that tree into
//! the `{node_id: {process_id, arguments, result?}}` map the back-end expects,
//! sharing one entry for a node reachable along several paths.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub type FlatGraph = Map<String, Value>;

/// The GeoJSON schema used for UDP parameters.
pub fn geojson_schema() -> Value {
    json!({"type": "object", "subtype": "geojson"})
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    /// Output of another node, encoded as `{"from_node": id}`.
    Node(Rc<PgNode>),
    /// Parameter of the enclosing process, encoded as `{"from_parameter": name}`.
    Parameter(String),
    /// Child process, encoded as `{"process_graph": {...}}` with its own ids.
    Callback(Rc<PgNode>),
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Value(Value::from(value))
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Value(Value::from(value))
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Argument::Value(Value::from(value))
    }
}

impl From<Rc<PgNode>> for Argument {
    fn from(node: Rc<PgNode>) -> Self {
        Argument::Node(node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PgNode {
    process_id: String,
    namespace: Option<String>,
    arguments: BTreeMap<String, Argument>,
}

impl PgNode {
    pub fn new<'a, I>(process_id: &str, arguments: I) -> Rc<PgNode>
    where
        I: IntoIterator<Item = (&'a str, Argument)>,
    {
        Rc::new(Self::build(process_id, None, arguments))
    }

    /// Node calling a process published under `namespace` (a UDP URL or user namespace).
    pub fn with_namespace<'a, I>(process_id: &str, namespace: &str, arguments: I) -> Rc<PgNode>
    where
        I: IntoIterator<Item = (&'a str, Argument)>,
    {
        Rc::new(Self::build(process_id, Some(namespace.to_string()), arguments))
    }

    fn build<'a, I>(process_id: &str, namespace: Option<String>, arguments: I) -> PgNode
    where
        I: IntoIterator<Item = (&'a str, Argument)>,
    {
        PgNode {
            process_id: process_id.to_string(),
            namespace,
            arguments: arguments
                .into_iter()
                .map(|(name, arg)| (name.to_string(), arg))
                .collect(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

}

#[derive(Default)]
struct Flattener {
    ids: HashMap<*const PgNode, String>,
    counters: HashMap<String, usize>,
    graph: FlatGraph,
}

impl Flattener {
    fn next_id(&mut self, process_id: &str) -> String {
        let base = process_id.replace('_', "");
        let counter = self.counters.entry(base.clone()).or_insert(0);
        *counter += 1;
        format!("{}{}", base, counter)
    }

    fn visit(&mut self, node: &Rc<PgNode>) -> String {
        if let Some(id) = self.ids.get(&Rc::as_ptr(node)) {
            return id.clone();
        }

        // Dependencies first, so ids read in pipeline order.
        let mut arguments = Map::new();
        for (name, argument) in &node.arguments {
            let value = self.encode(argument);
            arguments.insert(name.clone(), value);
        }

        let id = self.next_id(&node.process_id);
        let mut entry = Map::new();
        entry.insert("process_id".to_string(), Value::from(node.process_id.as_str()));
        if let Some(namespace) = &node.namespace {
            entry.insert("namespace".to_string(), Value::from(namespace.as_str()));
        }
        entry.insert("arguments".to_string(), Value::Object(arguments));

        self.graph.insert(id.clone(), Value::Object(entry));
        self.ids.insert(Rc::as_ptr(node), id.clone());
        id
    }

    fn encode(&mut self, argument: &Argument) -> Value {
        match argument {
            Argument::Value(value) => value.clone(),
            Argument::Node(node) => json!({"from_node": self.visit(node)}),
            Argument::Parameter(name) => json!({"from_parameter": name}),
            Argument::Callback(node) => json!({"process_graph": flatten(node)}),
        }
    }
}

/// Flat graph of everything `root` depends on, with `root` marked as the result.
pub fn flatten(root: &Rc<PgNode>) -> FlatGraph {
    let mut flattener = Flattener::default();
    let result_id = flattener.visit(root);
    if let Some(Value::Object(entry)) = flattener.graph.get_mut(&result_id) {
        entry.insert("result".to_string(), Value::Bool(true));
    }
    flattener.graph
}

/// Parameter declared by a user-defined process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn geojson(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema: geojson_schema(),
            default: None,
        }
    }

    /// Reference to this parameter from inside the process body.
    pub fn reference(&self) -> Argument {
        Argument::Parameter(self.name.clone())
    }
}

/// Full description of a user-defined process, as stored by the back-end.
pub fn build_process_dict(
    process_id: &str,
    description: &str,
    process_graph: FlatGraph,
    parameters: &[Parameter],
) -> Value {
    json!({
        "id": process_id,
        "description": description,
        "process_graph": process_graph,
        "parameters": parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load() -> Rc<PgNode> {
        PgNode::new("load_collection", [("id", Argument::from("COPERNICUS_30"))])
    }

    #[test]
    fn test_single_node_is_result() {
        let graph = flatten(&load());
        assert_eq!(
            Value::Object(graph),
            json!({
                "loadcollection1": {
                    "process_id": "load_collection",
                    "arguments": {"id": "COPERNICUS_30"},
                    "result": true
                }
            })
        );
    }

    #[test]
    fn test_chain_references_previous_nodes() {
        let reduce = PgNode::new(
            "reduce_dimension",
            [
                ("data", Argument::Node(load())),
                ("dimension", Argument::from("t")),
            ],
        );
        let graph = flatten(&reduce);

        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph["reducedimension1"]["arguments"]["data"],
            json!({"from_node": "loadcollection1"})
        );
        assert_eq!(graph["reducedimension1"]["result"], json!(true));
        assert!(graph["loadcollection1"].get("result").is_none());
    }

    #[test]
    fn test_shared_node_is_emitted_once() {
        let dem = load();
        let geoid = PgNode::new("load_collection", [("id", Argument::from("EGM2008"))]);
        let resampled = PgNode::new(
            "resample_cube_spatial",
            [
                ("data", Argument::Node(geoid)),
                ("target", Argument::Node(dem.clone())),
            ],
        );
        let merged = PgNode::new(
            "merge_cubes",
            [
                ("cube1", Argument::Node(dem)),
                ("cube2", Argument::Node(resampled)),
            ],
        );

        let graph = flatten(&merged);
        assert_eq!(graph.len(), 4);
        assert_eq!(
            graph["mergecubes1"]["arguments"]["cube1"],
            json!({"from_node": "loadcollection1"})
        );
        assert_eq!(
            graph["resamplecubespatial1"]["arguments"]["target"],
            json!({"from_node": "loadcollection1"})
        );
        assert_eq!(
            graph["resamplecubespatial1"]["arguments"]["data"],
            json!({"from_node": "loadcollection2"})
        );
    }

    #[test]
    fn test_callback_and_parameter_encoding() {
        let reducer = PgNode::new("max", [("data", Argument::Parameter("data".to_string()))]);
        let reduce = PgNode::new(
            "reduce_dimension",
            [
                ("data", Argument::Node(load())),
                ("reducer", Argument::Callback(reducer)),
            ],
        );

        let graph = flatten(&reduce);
        assert_eq!(
            graph["reducedimension1"]["arguments"]["reducer"],
            json!({"process_graph": {
                "max1": {
                    "process_id": "max",
                    "arguments": {"data": {"from_parameter": "data"}},
                    "result": true
                }
            }})
        );
    }

    #[test]
    fn test_namespace_is_emitted() {
        let node = PgNode::with_namespace("variability_map", "u:someone", [("raw", Argument::from(false))]);
        let graph = flatten(&node);
        assert_eq!(graph["variabilitymap1"]["namespace"], json!("u:someone"));
        assert_eq!(graph["variabilitymap1"]["arguments"]["raw"], json!(false));
    }

    #[test]
    fn test_process_dict() {
        let field = Parameter::geojson("field", "field");
        let dict = build_process_dict("test_DEM_gen", "test_desc", flatten(&load()), &[field]);
        assert_eq!(dict["id"], "test_DEM_gen");
        assert_eq!(
            dict["parameters"],
            json!([{"name": "field", "description": "field", "schema": {"type": "object", "subtype": "geojson"}}])
        );
        assert!(dict["process_graph"]["loadcollection1"].is_object());
    }
}
