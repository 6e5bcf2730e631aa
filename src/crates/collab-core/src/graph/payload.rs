//! The wire-level `Operation` envelope and canonical op kinds.

use serde::{Deserialize, Serialize};

/// One client-submitted mutation, as received over the socket and as stored
/// in the `operation` table's `payload` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub timeline_id: String,
    #[serde(default = "default_layer_id")]
    pub layer_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: String,
}

fn default_layer_id() -> String {
    crate::graph::ROOT_LAYER_ID.to_string()
}

/// The semantic action an op type string resolves to, independent of which
/// alias (plain / `.undo` / `.redo`) was used. Undo/redo of a symmetric
/// action (e.g. update) collapse to the same canonical kind; only
/// create/delete pairs actually invert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    CreateNode,
    DeleteNode,
    UpdateNode,
    MoveNode,
    CreateEdge,
    DeleteEdge,
    UpdateEdge,
    CreateLayer,
    DeleteLayer,
    UpdateLayer,
    CreateVariable,
    DeleteVariable,
    UpdateVariable,
    DuplicateNodes,
    CutNodes,
    PasteCopiedNodes,
    PasteCutNodes,
    MoveNodes,
    InnerOperationCreated,
    InnerOperationUpdated,
    InnerOperationDeleted,
    InnerOperationsToggled,
    LayerEndingsUpdated,
    LayerMoved,
    CreateTimeline,
    RenameTimeline,
    DeleteTimeline,
    DuplicateTimeline,
    Unknown,
}

/// Whether the alias used was the inverse form (`.undo` for a create/delete
/// pair inverts to the other half of the pair; everything else is its own
/// inverse and `is_undo` only affects logging, not semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOp {
    pub kind: OpKind,
    pub is_undo: bool,
}

/// Map a raw `type` string (e.g. `"node.created"`, `"node.created.undo"`,
/// `"nodes.duplicated"`) to its canonical kind. Unknown strings resolve to
/// `OpKind::Unknown`, which the interpreter logs and skips: malformed input
/// is never allowed to panic the server.
pub fn resolve(op_type: &str) -> ResolvedOp {
    let (base, is_undo) = if let Some(stripped) = op_type.strip_suffix(".undo") {
        (stripped, true)
    } else if let Some(stripped) = op_type.strip_suffix(".redo") {
        (stripped, false)
    } else {
        (op_type, false)
    };

    let kind = match base {
        "CREATE_NODE" | "node.added" | "node.created" => {
            if is_undo {
                OpKind::DeleteNode
            } else {
                OpKind::CreateNode
            }
        }
        "DELETE_NODE" | "node.deleted" => {
            if is_undo {
                OpKind::CreateNode
            } else {
                OpKind::DeleteNode
            }
        }
        "UPDATE_NODE" | "node.updated" => OpKind::UpdateNode,
        "MOVE_NODE" | "node.moved" => OpKind::MoveNode,
        "CREATE_EDGE" | "edge.added" | "edge.created" => {
            if is_undo {
                OpKind::DeleteEdge
            } else {
                OpKind::CreateEdge
            }
        }
        "DELETE_EDGE" | "edge.deleted" => {
            if is_undo {
                OpKind::CreateEdge
            } else {
                OpKind::DeleteEdge
            }
        }
        "UPDATE_EDGE" | "edge.updated" => OpKind::UpdateEdge,
        "CREATE_LAYER" | "layer.added" | "layer.created" => {
            if is_undo {
                OpKind::DeleteLayer
            } else {
                OpKind::CreateLayer
            }
        }
        "DELETE_LAYER" | "layer.deleted" => {
            if is_undo {
                OpKind::CreateLayer
            } else {
                OpKind::DeleteLayer
            }
        }
        "UPDATE_LAYER" | "layer.updated" => OpKind::UpdateLayer,
        "layer.endings.updated" => OpKind::LayerEndingsUpdated,
        "layer.moved" => OpKind::LayerMoved,
        "CREATE_VARIABLE" | "variable.added" | "variable.created" => {
            if is_undo {
                OpKind::DeleteVariable
            } else {
                OpKind::CreateVariable
            }
        }
        "DELETE_VARIABLE" | "variable.deleted" => {
            if is_undo {
                OpKind::CreateVariable
            } else {
                OpKind::DeleteVariable
            }
        }
        "UPDATE_VARIABLE" | "variable.updated" => OpKind::UpdateVariable,
        "nodes.duplicated" => OpKind::DuplicateNodes,
        "nodes.cut" => OpKind::CutNodes,
        "nodes.pasted.copy" => OpKind::PasteCopiedNodes,
        "nodes.pasted.cut" => OpKind::PasteCutNodes,
        "nodes.moved" => OpKind::MoveNodes,
        "operation.created" => OpKind::InnerOperationCreated,
        "operation.updated" => OpKind::InnerOperationUpdated,
        "operation.deleted" => OpKind::InnerOperationDeleted,
        "operations.toggled" => OpKind::InnerOperationsToggled,
        "timeline.created" => OpKind::CreateTimeline,
        "timeline.renamed" => OpKind::RenameTimeline,
        "timeline.deleted" => OpKind::DeleteTimeline,
        "timeline.duplicated" => OpKind::DuplicateTimeline,
        _ => OpKind::Unknown,
    };

    ResolvedOp { kind, is_undo }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_alias_resolves_to_itself() {
        assert_eq!(resolve("node.created").kind, OpKind::CreateNode);
        assert_eq!(resolve("node.created").is_undo, false);
    }

    #[test]
    fn test_undo_of_create_inverts_to_delete() {
        let r = resolve("node.created.undo");
        assert_eq!(r.kind, OpKind::DeleteNode);
        assert!(r.is_undo);
    }

    #[test]
    fn test_redo_of_delete_stays_delete() {
        assert_eq!(resolve("node.deleted.redo").kind, OpKind::DeleteNode);
    }

    #[test]
    fn test_symmetric_update_undo_stays_update() {
        assert_eq!(resolve("node.updated.undo").kind, OpKind::UpdateNode);
    }

    #[test]
    fn test_unrecognized_type_is_unknown() {
        assert_eq!(resolve("bogus.nonsense").kind, OpKind::Unknown);
    }

    #[test]
    fn test_canonical_uppercase_forms_resolve() {
        assert_eq!(resolve("CREATE_NODE").kind, OpKind::CreateNode);
        assert_eq!(resolve("DELETE_NODE").kind, OpKind::DeleteNode);
        assert_eq!(resolve("UPDATE_NODE").kind, OpKind::UpdateNode);
        assert_eq!(resolve("MOVE_NODE").kind, OpKind::MoveNode);
        assert_eq!(resolve("CREATE_EDGE").kind, OpKind::CreateEdge);
        assert_eq!(resolve("CREATE_LAYER").kind, OpKind::CreateLayer);
        assert_eq!(resolve("CREATE_VARIABLE").kind, OpKind::CreateVariable);
    }

    #[test]
    fn test_dotted_added_alias_matches_canonical() {
        assert_eq!(resolve("node.added").kind, OpKind::CreateNode);
        let r = resolve("node.added.redo");
        assert_eq!(r.kind, OpKind::CreateNode);
        assert!(!r.is_undo);
        let r = resolve("node.deleted.undo");
        assert_eq!(r.kind, OpKind::CreateNode);
        assert!(r.is_undo);
    }

    #[test]
    fn test_composite_and_inner_op_kinds() {
        assert_eq!(resolve("nodes.duplicated").kind, OpKind::DuplicateNodes);
        assert_eq!(resolve("nodes.pasted.cut").kind, OpKind::PasteCutNodes);
        assert_eq!(resolve("operations.toggled").kind, OpKind::InnerOperationsToggled);
        assert_eq!(resolve("timeline.duplicated").kind, OpKind::DuplicateTimeline);
    }
}
