//! Graph data model and pure operation interpreter.
//!
//! `Snapshot` is the authoritative value object a project owns; `apply` is
//! the only function allowed to mutate it, and only by producing a new one.

pub mod ops;
pub mod payload;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display-order entry parallel to `Snapshot::timelines`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineMeta {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub is_active: bool,
    pub order: i64,
}

/// A single timeline-scoped variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub var_type: String,
}

/// A per-node inner operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InnerOperation {
    pub id: String,
    pub order: i64,
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// A node in a layer. `node_type == "layer"` makes this a proxy pointing at
/// a child `Layer` entry of the same name in `timeline.layers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<InnerOperation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_nodes: Option<Vec<String>>,
}

/// An edge between two nodes within the same layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub conditions: Vec<serde_json::Value>,
}

fn default_edge_type() -> String {
    "link".to_string()
}

/// A layer: the unit that owns nodes and edges. `node_ids` is always kept a
/// duplicate-free permutation of `nodes`'s keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub layer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_layer_id: Option<String>,
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub edges: HashMap<String, Edge>,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

pub const ROOT_LAYER_ID: &str = "root";

impl Layer {
    fn new_root() -> Self {
        Self {
            id: ROOT_LAYER_ID.to_string(),
            name: "Root".to_string(),
            layer_type: None,
            depth: None,
            parent_layer_id: None,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            node_ids: Vec::new(),
        }
    }

    /// Remove every edge whose endpoint is `node_id`, checking both the
    /// canonical field names and legacy `source`/`target` aliases.
    pub fn purge_edges_touching(&mut self, node_id: &str) {
        self.edges
            .retain(|_, e| e.start_node_id != node_id && e.end_node_id != node_id);
    }

    /// Enforce `node_ids` as the duplicate-free key-set of `nodes`,
    /// preserving existing relative order and appending any stragglers.
    pub fn reconcile_node_ids(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.node_ids.retain(|id| self.nodes.contains_key(id) && seen.insert(id.clone()));
        for id in self.nodes.keys() {
            if !seen.contains(id) {
                self.node_ids.push(id.clone());
                seen.insert(id.clone());
            }
        }
    }
}

/// A timeline: a set of layers (always including `root`) plus variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    #[serde(default)]
    pub layers: HashMap<String, Layer>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_layer_number: Option<i64>,
}

impl Timeline {
    fn new_empty() -> Self {
        let mut layers = HashMap::new();
        layers.insert(ROOT_LAYER_ID.to_string(), Layer::new_root());
        Self {
            layers,
            metadata: serde_json::Value::Object(Default::default()),
            variables: Vec::new(),
            last_layer_number: None,
        }
    }

    /// Ensure a `root` layer exists.
    pub fn ensure_root(&mut self) {
        self.layers
            .entry(ROOT_LAYER_ID.to_string())
            .or_insert_with(Layer::new_root);
    }
}

/// The authoritative per-project graph state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub timelines: HashMap<String, Timeline>,
    #[serde(default)]
    pub timelines_metadata: Vec<TimelineMeta>,
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(rename = "_lastModified", default)]
    pub last_modified: i64,
}

impl Snapshot {
    /// Empty scaffold used on first access to a project.
    pub fn empty(project_id: impl Into<String>) -> Self {
        Self {
            timelines: HashMap::new(),
            timelines_metadata: Vec::new(),
            project_id: project_id.into(),
            project_name: String::new(),
            last_modified: 0,
        }
    }

    /// Legacy-format detection: a persisted root object with `layers`
    /// but no `timelines` gets wrapped into a single `base-timeline`.
    pub fn from_legacy_value(
        project_id: &str,
        mut value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("timelines") && obj.contains_key("layers") {
                let layers = obj.remove("layers").unwrap_or(serde_json::json!({}));
                let mut timeline_obj = serde_json::Map::new();
                timeline_obj.insert("layers".to_string(), layers);
                let mut timelines = serde_json::Map::new();
                timelines.insert("base-timeline".to_string(), serde_json::Value::Object(timeline_obj));
                obj.insert("timelines".to_string(), serde_json::Value::Object(timelines));
                obj.entry("timelinesMetadata").or_insert_with(|| {
                    serde_json::json!([{
                        "id": "base-timeline",
                        "name": "Timeline",
                        "createdAt": 0,
                        "isActive": true,
                        "order": 0,
                    }])
                });
            }
            obj.entry("projectId").or_insert_with(|| serde_json::Value::String(project_id.to_string()));
        }
        serde_json::from_value(value)
    }

    /// Ensure `timelineId` exists, creating an empty scaffold (with `root`
    /// layer) if absent. Returns `true` if a new timeline was created.
    pub fn ensure_timeline(&mut self, timeline_id: &str) -> bool {
        if self.timelines.contains_key(timeline_id) {
            self.timelines.get_mut(timeline_id).unwrap().ensure_root();
            return false;
        }
        self.timelines.insert(timeline_id.to_string(), Timeline::new_empty());
        let order = self.timelines_metadata.len() as i64;
        self.timelines_metadata.push(TimelineMeta {
            id: timeline_id.to_string(),
            name: timeline_id.to_string(),
            created_at: self.last_modified,
            is_active: true,
            order,
        });
        true
    }

    /// Ensure `timelineId` and, within it, `layerId` exist.
    pub fn ensure_layer(&mut self, timeline_id: &str, layer_id: &str) {
        self.ensure_timeline(timeline_id);
        let timeline = self.timelines.get_mut(timeline_id).unwrap();
        timeline.layers.entry(layer_id.to_string()).or_insert_with(|| Layer {
            id: layer_id.to_string(),
            name: layer_id.to_string(),
            layer_type: None,
            depth: None,
            parent_layer_id: None,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            node_ids: Vec::new(),
        });
    }

    /// Structural self-check, used by property tests.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (tid, timeline) in &self.timelines {
            if !timeline.layers.contains_key(ROOT_LAYER_ID) {
                return Err(format!("timeline {tid} missing root layer"));
            }
            for (lid, layer) in &timeline.layers {
                let node_keys: std::collections::HashSet<_> = layer.nodes.keys().collect();
                let id_set: std::collections::HashSet<_> = layer.node_ids.iter().collect();
                if node_keys != id_set {
                    return Err(format!("timeline {tid} layer {lid} nodeIds != keys(nodes)"));
                }
                if layer.node_ids.len() != id_set.len() {
                    return Err(format!("timeline {tid} layer {lid} nodeIds has duplicates"));
                }
            }
        }
        Ok(())
    }
}
