//! The pure, total operation interpreter.
//!
//! `apply` never errors and never panics: a malformed or unknown operation
//! is logged and skipped, and every other operation in the batch still
//! applies. This is what lets the serializer commit a whole batch
//! atomically without needing per-operation validation up front.

use super::payload::{resolve, Operation, OpKind};
use super::{Coordinates, Edge, InnerOperation, Layer, Node, Snapshot, Variable};

/// Apply `ops` to `snapshot` in order, returning a new snapshot. Pure:
/// `snapshot` is never mutated in place.
pub fn apply(snapshot: &Snapshot, ops: &[Operation]) -> Snapshot {
    let mut next = snapshot.clone();
    for op in ops {
        apply_one(&mut next, op);
    }
    next
}

fn apply_one(snapshot: &mut Snapshot, op: &Operation) {
    let resolved = resolve(&op.op_type);
    if resolved.kind == OpKind::Unknown {
        tracing::warn!(op_type = %op.op_type, op_id = %op.id, "skipping unknown operation type");
        return;
    }

    snapshot.ensure_layer(&op.timeline_id, &op.layer_id);
    snapshot.last_modified = op.timestamp;

    let result = match resolved.kind {
        OpKind::CreateNode => create_node(snapshot, op),
        OpKind::DeleteNode => delete_node(snapshot, op),
        OpKind::UpdateNode => update_node(snapshot, op),
        OpKind::MoveNode => move_node(snapshot, op),
        OpKind::CreateEdge => create_edge(snapshot, op),
        OpKind::DeleteEdge => delete_edge(snapshot, op),
        OpKind::UpdateEdge => update_edge(snapshot, op),
        OpKind::CreateLayer => create_layer(snapshot, op),
        OpKind::DeleteLayer => delete_layer(snapshot, op),
        OpKind::UpdateLayer => update_layer(snapshot, op),
        OpKind::LayerEndingsUpdated => update_layer(snapshot, op),
        OpKind::LayerMoved => move_layer(snapshot, op),
        OpKind::CreateVariable => create_variable(snapshot, op),
        OpKind::DeleteVariable => delete_variable(snapshot, op),
        OpKind::UpdateVariable => update_variable(snapshot, op),
        OpKind::DuplicateNodes | OpKind::PasteCopiedNodes => duplicate_nodes(snapshot, op),
        OpKind::CutNodes => cut_nodes(snapshot, op),
        OpKind::PasteCutNodes => paste_cut_nodes(snapshot, op),
        OpKind::MoveNodes => move_nodes(snapshot, op),
        OpKind::InnerOperationCreated => inner_op_created(snapshot, op),
        OpKind::InnerOperationUpdated => inner_op_updated(snapshot, op),
        OpKind::InnerOperationDeleted => inner_op_deleted(snapshot, op),
        OpKind::InnerOperationsToggled => inner_ops_toggled(snapshot, op),
        OpKind::CreateTimeline => create_timeline(snapshot, op),
        OpKind::RenameTimeline => rename_timeline(snapshot, op),
        OpKind::DeleteTimeline => delete_timeline(snapshot, op),
        OpKind::DuplicateTimeline => duplicate_timeline(snapshot, op),
        OpKind::Unknown => unreachable!(),
    };

    if let Err(reason) = result {
        tracing::warn!(op_type = %op.op_type, op_id = %op.id, reason, "skipping malformed operation");
    }
}

type OpResult = Result<(), &'static str>;

fn layer_mut<'a>(snapshot: &'a mut Snapshot, op: &Operation) -> Result<&'a mut Layer, &'static str> {
    snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .and_then(|t| t.layers.get_mut(&op.layer_id))
        .ok_or("layer not found")
}

fn str_field(payload: &serde_json::Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn node_from_payload(payload: &serde_json::Value) -> Result<Node, &'static str> {
    serde_json::from_value(payload.clone()).map_err(|_| "invalid node payload")
}

fn create_node(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node = node_from_payload(&op.payload)?;
    let layer = layer_mut(snapshot, op)?;
    let id = node.id.clone();
    layer.nodes.insert(id.clone(), node);
    if !layer.node_ids.contains(&id) {
        layer.node_ids.push(id);
    }
    Ok(())
}

fn delete_node(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId")
        .or_else(|| str_field(&op.payload, "id"))
        .ok_or("missing nodeId")?;
    let layer = layer_mut(snapshot, op)?;
    layer.nodes.remove(&node_id);
    layer.node_ids.retain(|id| id != &node_id);
    layer.purge_edges_touching(&node_id);
    Ok(())
}

fn update_node(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let changes = op.payload.get("changes").ok_or("missing changes")?.clone();
    let layer = layer_mut(snapshot, op)?;
    let node = layer.nodes.get_mut(&node_id).ok_or("node not found")?;

    // `newData` shallow-merges into existing data; a bare `data` replaces it
    // wholesale.
    if let Some(new_data) = changes.get("newData") {
        if let (Some(existing), Some(incoming)) = (node.data.as_object_mut(), new_data.as_object()) {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
        } else {
            node.data = new_data.clone();
        }
    }

    merge_node_fields(node, &changes)
}

fn merge_node_fields(node: &mut Node, changes: &serde_json::Value) -> OpResult {
    let obj = changes.as_object().ok_or("changes must be an object")?;
    if let Some(t) = obj.get("type").and_then(|v| v.as_str()) {
        node.node_type = t.to_string();
    }
    if let Some(c) = obj.get("coordinates") {
        if let Ok(coords) = serde_json::from_value::<Coordinates>(c.clone()) {
            node.coordinates = coords;
        }
    }
    if let Some(d) = obj.get("data") {
        node.data = d.clone();
    }
    if let Some(ops) = obj.get("operations") {
        node.operations = serde_json::from_value(ops.clone()).ok();
    }
    if let Some(sn) = obj.get("startingNodes") {
        node.starting_nodes = serde_json::from_value(sn.clone()).ok();
    }
    if let Some(en) = obj.get("endingNodes") {
        node.ending_nodes = serde_json::from_value(en.clone()).ok();
    }
    Ok(())
}

fn move_node(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let coords: Coordinates = op
        .payload
        .get("coordinates")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or("missing coordinates")?;
    let layer = layer_mut(snapshot, op)?;
    let node = layer.nodes.get_mut(&node_id).ok_or("node not found")?;
    node.coordinates = coords;
    Ok(())
}

fn create_edge(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let edge: Edge = serde_json::from_value(op.payload.clone()).map_err(|_| "invalid edge payload")?;
    let layer = layer_mut(snapshot, op)?;
    layer.edges.insert(edge.id.clone(), edge);
    Ok(())
}

fn delete_edge(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let edge_id = str_field(&op.payload, "edgeId")
        .or_else(|| str_field(&op.payload, "id"))
        .ok_or("missing edgeId")?;
    let layer = layer_mut(snapshot, op)?;
    layer.edges.remove(&edge_id);
    Ok(())
}

fn update_edge(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let edge_id = str_field(&op.payload, "edgeId").ok_or("missing edgeId")?;
    let changes = op.payload.get("changes").ok_or("missing changes")?.clone();
    let layer = layer_mut(snapshot, op)?;
    let edge = layer.edges.get_mut(&edge_id).ok_or("edge not found")?;
    let obj = changes.as_object().ok_or("changes must be an object")?;
    if let Some(c) = obj.get("conditions").and_then(|v| v.as_array()) {
        edge.conditions = c.clone();
    }
    if let Some(h) = obj.get("sourceHandle").and_then(|v| v.as_str()) {
        edge.source_handle = Some(h.to_string());
    }
    if let Some(h) = obj.get("targetHandle").and_then(|v| v.as_str()) {
        edge.target_handle = Some(h.to_string());
    }
    Ok(())
}

fn create_layer(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let layer: Layer = serde_json::from_value(op.payload.clone()).map_err(|_| "invalid layer payload")?;
    let proxy_node: Node = node_from_payload(&op.payload).unwrap_or(Node {
        id: layer.id.clone(),
        node_type: "layer".to_string(),
        coordinates: Coordinates { x: 0.0, y: 0.0 },
        data: serde_json::Value::Null,
        operations: None,
        starting_nodes: None,
        ending_nodes: None,
    });
    let layer_id = layer.id.clone();

    let parent = layer_mut(snapshot, op)?;
    parent.nodes.insert(layer_id.clone(), proxy_node);
    if !parent.node_ids.contains(&layer_id) {
        parent.node_ids.push(layer_id.clone());
    }

    let timeline = snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .ok_or("timeline not found")?;
    timeline.layers.insert(layer_id, layer);
    Ok(())
}

fn delete_layer(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let layer_id = str_field(&op.payload, "layerId").ok_or("missing layerId")?;
    if layer_id == super::ROOT_LAYER_ID {
        return Err("cannot delete root layer");
    }

    let parent = layer_mut(snapshot, op)?;
    parent.nodes.remove(&layer_id);
    parent.node_ids.retain(|id| id != &layer_id);
    parent.purge_edges_touching(&layer_id);

    let timeline = snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .ok_or("timeline not found")?;
    timeline.layers.remove(&layer_id);
    Ok(())
}

fn update_layer(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let changes = op.payload.get("changes").unwrap_or(&op.payload).clone();
    let layer = layer_mut(snapshot, op)?;
    let obj = changes.as_object().ok_or("changes must be an object")?;
    if let Some(n) = obj.get("name").and_then(|v| v.as_str()) {
        layer.name = n.to_string();
    }
    if let Some(sn) = obj.get("startingNodes") {
        if let Some(root_node) = layer.nodes.get_mut(&layer.id.clone()) {
            root_node.starting_nodes = serde_json::from_value(sn.clone()).ok();
        }
    }
    if let Some(en) = obj.get("endingNodes") {
        if let Some(root_node) = layer.nodes.get_mut(&layer.id.clone()) {
            root_node.ending_nodes = serde_json::from_value(en.clone()).ok();
        }
    }
    Ok(())
}

fn move_layer(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let new_parent = str_field(&op.payload, "parentLayerId");
    let layer = layer_mut(snapshot, op)?;
    layer.parent_layer_id = new_parent;
    Ok(())
}

fn create_variable(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let var: Variable = serde_json::from_value(op.payload.clone()).map_err(|_| "invalid variable payload")?;
    let timeline = snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .ok_or("timeline not found")?;
    timeline.variables.retain(|v| v.id != var.id);
    timeline.variables.push(var);
    Ok(())
}

fn delete_variable(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let var_id = str_field(&op.payload, "variableId")
        .or_else(|| str_field(&op.payload, "id"))
        .ok_or("missing variableId")?;
    let timeline = snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .ok_or("timeline not found")?;
    timeline.variables.retain(|v| v.id != var_id);
    Ok(())
}

fn update_variable(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let var_id = str_field(&op.payload, "variableId").ok_or("missing variableId")?;
    let changes = op.payload.get("changes").ok_or("missing changes")?.clone();
    let timeline = snapshot
        .timelines
        .get_mut(&op.timeline_id)
        .ok_or("timeline not found")?;
    let var = timeline
        .variables
        .iter_mut()
        .find(|v| v.id == var_id)
        .ok_or("variable not found")?;
    if let Some(v) = changes.get("value") {
        var.value = v.clone();
    }
    if let Some(n) = changes.get("name").and_then(|v| v.as_str()) {
        var.name = n.to_string();
    }
    Ok(())
}

fn duplicate_nodes(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let nodes: Vec<Node> = op
        .payload
        .get("nodes")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or("missing nodes array")?;
    let layer = layer_mut(snapshot, op)?;
    for node in nodes {
        let id = node.id.clone();
        layer.nodes.insert(id.clone(), node);
        if !layer.node_ids.contains(&id) {
            layer.node_ids.push(id);
        }
    }
    Ok(())
}

fn cut_nodes(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_ids: Vec<String> = op
        .payload
        .get("nodeIds")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or("missing nodeIds array")?;
    let layer = layer_mut(snapshot, op)?;
    for id in &node_ids {
        layer.nodes.remove(id);
        layer.purge_edges_touching(id);
    }
    layer.node_ids.retain(|id| !node_ids.contains(id));
    Ok(())
}

fn paste_cut_nodes(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    duplicate_nodes(snapshot, op)
}

fn move_nodes(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let moves: Vec<(String, Coordinates)> = op
        .payload
        .get("moves")
        .and_then(|v| v.as_array())
        .ok_or("missing moves array")?
        .iter()
        .filter_map(|entry| {
            let node_id = entry.get("nodeId")?.as_str()?.to_string();
            let coords: Coordinates = serde_json::from_value(entry.get("coordinates")?.clone()).ok()?;
            Some((node_id, coords))
        })
        .collect();
    let layer = layer_mut(snapshot, op)?;
    for (node_id, coords) in moves {
        if let Some(node) = layer.nodes.get_mut(&node_id) {
            node.coordinates = coords;
        }
    }
    Ok(())
}

fn find_node_by_inner_op_target<'a>(
    layer: &'a mut Layer,
    node_id: &str,
) -> Result<&'a mut Node, &'static str> {
    layer.nodes.get_mut(node_id).ok_or("node not found")
}

fn inner_op_created(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let inner: InnerOperation = op
        .payload
        .get("operation")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or("missing operation payload")?;
    let layer = layer_mut(snapshot, op)?;
    let node = find_node_by_inner_op_target(layer, &node_id)?;
    node.operations.get_or_insert_with(Vec::new).push(inner);
    Ok(())
}

fn inner_op_updated(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let op_id = str_field(&op.payload, "operationId").ok_or("missing operationId")?;
    let changes = op.payload.get("changes").ok_or("missing changes")?.clone();
    let layer = layer_mut(snapshot, op)?;
    let node = find_node_by_inner_op_target(layer, &node_id)?;
    let ops = node.operations.as_mut().ok_or("node has no operations")?;
    let inner = ops.iter_mut().find(|o| o.id == op_id).ok_or("operation not found")?;
    if let Some(obj) = changes.as_object() {
        if let Some(order) = obj.get("order").and_then(|v| v.as_i64()) {
            inner.order = order;
        }
        if let Some(enabled) = obj.get("enabled").and_then(|v| v.as_bool()) {
            inner.enabled = enabled;
        }
        for (k, v) in obj {
            if k != "order" && k != "enabled" {
                inner.extra.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}

fn inner_op_deleted(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let op_id = str_field(&op.payload, "operationId").ok_or("missing operationId")?;
    let layer = layer_mut(snapshot, op)?;
    let node = find_node_by_inner_op_target(layer, &node_id)?;
    if let Some(ops) = node.operations.as_mut() {
        ops.retain(|o| o.id != op_id);
    }
    Ok(())
}

fn inner_ops_toggled(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let node_id = str_field(&op.payload, "nodeId").ok_or("missing nodeId")?;
    let op_ids: Vec<String> = op
        .payload
        .get("operationIds")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or("missing operationIds")?;
    let enabled = op.payload.get("enabled").and_then(|v| v.as_bool()).ok_or("missing enabled")?;
    let layer = layer_mut(snapshot, op)?;
    let node = find_node_by_inner_op_target(layer, &node_id)?;
    if let Some(ops) = node.operations.as_mut() {
        for inner in ops.iter_mut() {
            if op_ids.contains(&inner.id) {
                inner.enabled = enabled;
            }
        }
    }
    Ok(())
}

fn create_timeline(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let name = str_field(&op.payload, "name").unwrap_or_else(|| op.timeline_id.clone());
    snapshot.ensure_timeline(&op.timeline_id);
    if let Some(meta) = snapshot.timelines_metadata.iter_mut().find(|m| m.id == op.timeline_id) {
        meta.name = name;
    }
    Ok(())
}

fn rename_timeline(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let name = str_field(&op.payload, "name").ok_or("missing name")?;
    let meta = snapshot
        .timelines_metadata
        .iter_mut()
        .find(|m| m.id == op.timeline_id)
        .ok_or("timeline metadata not found")?;
    meta.name = name;
    Ok(())
}

fn delete_timeline(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    snapshot.timelines.remove(&op.timeline_id);
    snapshot.timelines_metadata.retain(|m| m.id != op.timeline_id);
    Ok(())
}

fn duplicate_timeline(snapshot: &mut Snapshot, op: &Operation) -> OpResult {
    let new_id = str_field(&op.payload, "newTimelineId").ok_or("missing newTimelineId")?;
    let name = str_field(&op.payload, "name").unwrap_or_else(|| new_id.clone());
    let source = snapshot
        .timelines
        .get(&op.timeline_id)
        .ok_or("source timeline not found")?
        .clone();
    let order = snapshot.timelines_metadata.len() as i64;
    snapshot.timelines.insert(new_id.clone(), source);
    snapshot.timelines_metadata.push(super::TimelineMeta {
        id: new_id,
        name,
        created_at: op.timestamp,
        is_active: true,
        order,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(op_type: &str, timeline_id: &str, layer_id: &str, payload: serde_json::Value) -> Operation {
        Operation {
            id: format!("op-{op_type}"),
            op_type: op_type.to_string(),
            timeline_id: timeline_id.to_string(),
            layer_id: layer_id.to_string(),
            payload,
            timestamp: 1000,
            user_id: Some("u1".to_string()),
            device_id: "d1".to_string(),
        }
    }

    fn node_payload(id: &str, x: f64, y: f64) -> serde_json::Value {
        serde_json::json!({
            "id": id, "type": "narrative", "coordinates": {"x": x, "y": y}, "data": {}
        })
    }

    #[test]
    fn test_create_then_delete_node_round_trips_empty() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op("node.deleted", "t1", "root", serde_json::json!({"nodeId": "n1"})),
        ];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t1"].layers["root"].nodes.is_empty());
        assert!(result.timelines["t1"].layers["root"].node_ids.is_empty());
        result.check_invariants().unwrap();
    }

    #[test]
    fn test_undo_of_create_node_deletes_it() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op("node.created.undo", "t1", "root", serde_json::json!({"nodeId": "n1"})),
        ];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t1"].layers["root"].nodes.is_empty());
    }

    #[test]
    fn test_move_node_updates_coordinates() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op(
                "node.moved",
                "t1",
                "root",
                serde_json::json!({"nodeId": "n1", "coordinates": {"x": 5.0, "y": 9.0}}),
            ),
        ];
        let result = apply(&snapshot, &ops);
        let node = &result.timelines["t1"].layers["root"].nodes["n1"];
        assert_eq!(node.coordinates.x, 5.0);
        assert_eq!(node.coordinates.y, 9.0);
    }

    #[test]
    fn test_deleting_node_cleans_up_touching_edges() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op("node.created", "t1", "root", node_payload("n2", 1.0, 1.0)),
            op(
                "edge.created",
                "t1",
                "root",
                serde_json::json!({"id": "e1", "type": "link", "startNodeId": "n1", "endNodeId": "n2"}),
            ),
            op("node.deleted", "t1", "root", serde_json::json!({"nodeId": "n1"})),
        ];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t1"].layers["root"].edges.is_empty());
    }

    #[test]
    fn test_unknown_operation_is_skipped_not_fatal() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![op("totally.bogus", "t1", "root", serde_json::json!({}))];
        let result = apply(&snapshot, &ops);
        assert_eq!(result, snapshot);
    }

    #[test]
    fn test_malformed_payload_is_skipped_batch_continues() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", serde_json::json!({"bad": true})),
            op("node.created", "t1", "root", node_payload("n2", 0.0, 0.0)),
        ];
        let result = apply(&snapshot, &ops);
        assert!(!result.timelines["t1"].layers["root"].nodes.contains_key("n1"));
        assert!(result.timelines["t1"].layers["root"].nodes.contains_key("n2"));
    }

    #[test]
    fn test_apply_is_idempotent_on_cloned_ops_application_is_deterministic() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0))];
        let r1 = apply(&snapshot, &ops);
        let r2 = apply(&snapshot, &ops);
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_inner_operation_lifecycle() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op(
                "operation.created",
                "t1",
                "root",
                serde_json::json!({"nodeId": "n1", "operation": {"id": "io1", "order": 0, "enabled": true}}),
            ),
            op(
                "operations.toggled",
                "t1",
                "root",
                serde_json::json!({"nodeId": "n1", "operationIds": ["io1"], "enabled": false}),
            ),
        ];
        let result = apply(&snapshot, &ops);
        let node = &result.timelines["t1"].layers["root"].nodes["n1"];
        assert_eq!(node.operations.as_ref().unwrap()[0].enabled, false);
    }

    #[test]
    fn test_create_layer_inserts_proxy_node_in_parent() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![op(
            "layer.created",
            "t1",
            "root",
            serde_json::json!({"id": "child", "name": "Child"}),
        )];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t1"].layers.contains_key("child"));
        assert!(result.timelines["t1"].layers["root"].nodes.contains_key("child"));
        assert_eq!(result.timelines["t1"].layers["root"].nodes["child"].node_type, "layer");
        assert!(result.timelines["t1"].layers["root"].node_ids.contains(&"child".to_string()));
    }

    #[test]
    fn test_delete_nested_layer_removes_proxy_from_actual_parent() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("layer.created", "t1", "root", serde_json::json!({"id": "mid", "name": "Mid"})),
            op("layer.created", "t1", "mid", serde_json::json!({"id": "child", "name": "Child"})),
            op("layer.deleted", "t1", "mid", serde_json::json!({"layerId": "child"})),
        ];
        let result = apply(&snapshot, &ops);
        assert!(!result.timelines["t1"].layers.contains_key("child"));
        assert!(!result.timelines["t1"].layers["mid"].nodes.contains_key("child"));
        assert!(result.timelines["t1"].layers["root"].nodes.contains_key("mid"));
    }

    #[test]
    fn test_delete_root_layer_is_rejected() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![op("layer.deleted", "t1", "root", serde_json::json!({"layerId": "root"}))];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t1"].layers.contains_key("root"));
    }

    #[test]
    fn test_duplicate_timeline_copies_layers() {
        let snapshot = Snapshot::empty("p1");
        let ops = vec![
            op("node.created", "t1", "root", node_payload("n1", 0.0, 0.0)),
            op(
                "timeline.duplicated",
                "t1",
                "root",
                serde_json::json!({"newTimelineId": "t2", "name": "Copy"}),
            ),
        ];
        let result = apply(&snapshot, &ops);
        assert!(result.timelines["t2"].layers["root"].nodes.contains_key("n1"));
    }
}
