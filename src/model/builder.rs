//! The structural model a declarative workflow is assembled through.

use rustc_hash::FxHashMap;

use crate::graphs::{GraphBuilder, Link, LinkCondition, WorkflowNode};
use crate::types::NodeId;

use super::errors::ModelError;
use super::node::{ModelLink, ModelNode, NodeTag};

/// Deferred build step that runs once all of a node's children are known.
///
/// Callbacks run during [`WorkflowModel::finalize`], in registration order,
/// and may add further nodes, links, and callbacks of their own.
pub type CompletionCallback = Box<dyn FnOnce(&mut WorkflowModel) -> Result<(), ModelError> + Send>;

/// Mutable structural model of a workflow under construction.
///
/// The model tracks what the final executable graph does not: parent/child
/// relationships, tree depth, structural tags, pending links, and deferred
/// completion callbacks. The declarative compiler drives it while visiting
/// the action tree; [`finalize`](Self::finalize) then runs every deferred
/// callback, resolves all pending links, and pours the result into a
/// [`GraphBuilder`].
///
/// Two-pass contract: **all** completion callbacks (including ones
/// registered by other callbacks) run before **any** link is resolved, so a
/// forward link may name a node that only a later callback creates.
#[derive(Default)]
pub struct WorkflowModel {
    nodes: FxHashMap<NodeId, ModelNode>,
    insertion_order: Vec<NodeId>,
    links: Vec<ModelLink>,
    callbacks: Vec<CompletionCallback>,
    start: Option<NodeId>,
}

impl WorkflowModel {
    /// An empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the first root node added, which becomes the graph's start.
    #[must_use]
    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    /// Number of nodes in the model.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ModelNode> {
        self.nodes.get(id)
    }

    /// Add a node under an optional parent.
    pub fn add_node(&mut self, node: WorkflowNode, parent: Option<&str>) -> Result<(), ModelError> {
        self.add_node_with(node, parent, None, None)
    }

    /// Add a node with an optional structural tag and completion callback.
    ///
    /// The first node added without a parent becomes the start node. A named
    /// parent must already exist; the child's depth is the parent's plus one
    /// and the child is appended to the parent's sibling list.
    pub fn add_node_with(
        &mut self,
        node: WorkflowNode,
        parent: Option<&str>,
        tag: Option<NodeTag>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), ModelError> {
        if node.id.is_empty() {
            return Err(ModelError::MissingRequiredProperties {
                action_id: node.kind.encode(),
                property: "id",
            });
        }
        if self.nodes.contains_key(&node.id) {
            return Err(ModelError::DuplicateStep {
                id: node.id.clone(),
            });
        }

        let parent = parent.filter(|p| !p.is_empty());
        let depth = match parent {
            None => 0,
            Some(parent_id) => {
                let parent_node =
                    self.nodes
                        .get_mut(parent_id)
                        .ok_or_else(|| ModelError::UnresolvedParent {
                            child: node.id.clone(),
                            parent: parent_id.to_string(),
                        })?;
                parent_node.children.push(node.id.clone());
                parent_node.depth + 1
            }
        };
        if parent.is_none() && self.start.is_none() {
            self.start = Some(node.id.clone());
        }

        let id = node.id.clone();
        self.insertion_order.push(id.clone());
        self.nodes.insert(
            id,
            ModelNode {
                node,
                parent: parent.map(str::to_string),
                children: Vec::new(),
                depth,
                tag,
            },
        );
        if let Some(callback) = on_complete {
            self.callbacks.push(callback);
        }
        Ok(())
    }

    /// Register a deferred build step independent of any one node.
    pub fn on_complete(&mut self, callback: CompletionCallback) {
        self.callbacks.push(callback);
    }

    /// Record a link. The source must already exist; the target is resolved
    /// at finalize time so forward references work.
    pub fn add_link(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: Option<LinkCondition>,
    ) -> Result<(), ModelError> {
        let source = source.into();
        if !self.nodes.contains_key(&source) {
            return Err(ModelError::UnresolvedStep { id: source });
        }
        self.links.push(ModelLink {
            source,
            target: target.into(),
            condition,
        });
        Ok(())
    }

    /// Record a link from a parent's most recently added child to `target`.
    ///
    /// With no children yet, the parent itself is the source — this is how
    /// a block's entry node chains to its first child. When the last sibling
    /// is a clean-start marker no link is drawn at all: clean-start nodes
    /// exist precisely so nothing chains off a completed jump. When the last
    /// sibling is a scope entry, the link sources from that scope's exit
    /// node instead, so the chain resumes only after the scope's body has
    /// run. The exit node may not exist yet; it materializes when the
    /// scope's own completion callback runs, before links resolve.
    pub fn add_link_from_last_sibling(
        &mut self,
        parent: &str,
        target: impl Into<NodeId>,
        condition: Option<LinkCondition>,
    ) -> Result<(), ModelError> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| ModelError::UnresolvedStep {
                id: parent.to_string(),
            })?;
        let source = match parent_node.children.last() {
            None => parent.to_string(),
            Some(child_id) => {
                let child = self
                    .nodes
                    .get(child_id)
                    .ok_or_else(|| ModelError::UnresolvedStep {
                        id: child_id.clone(),
                    })?;
                if child.is_clean_start() {
                    return Ok(());
                }
                match &child.tag {
                    Some(NodeTag::Scope { exit_id }) => exit_id.clone(),
                    _ => child_id.clone(),
                }
            }
        };
        self.links.push(ModelLink {
            source,
            target: target.into(),
            condition,
        });
        Ok(())
    }

    /// Depth of a node in the tree. An absent or empty id is the implicit
    /// root and has depth 0; an unknown id is an error.
    pub fn depth_of(&self, id: Option<&str>) -> Result<u32, ModelError> {
        match id.filter(|i| !i.is_empty()) {
            None => Ok(0),
            Some(id) => self
                .nodes
                .get(id)
                .map(|n| n.depth)
                .ok_or_else(|| ModelError::UnresolvedStep { id: id.to_string() }),
        }
    }

    /// Walk from `from` up the parent chain and return the nearest node
    /// (including `from` itself) whose tag matches.
    #[must_use]
    pub fn locate_tagged_ancestor(
        &self,
        from: &str,
        matches: impl Fn(&NodeTag) -> bool,
    ) -> Option<&ModelNode> {
        let mut current = self.nodes.get(from)?;
        loop {
            if current.tag.as_ref().is_some_and(&matches) {
                return Some(current);
            }
            current = self.nodes.get(current.parent.as_deref()?)?;
        }
    }

    /// The nearest enclosing loop of a node, if any.
    #[must_use]
    pub fn nearest_loop(&self, from: &str) -> Option<&ModelNode> {
        self.locate_tagged_ancestor(from, |tag| matches!(tag, NodeTag::Loop { .. }))
    }

    /// Run all deferred callbacks, resolve every pending link, and pour the
    /// result into `builder`.
    ///
    /// Callbacks drain in registration order, and a callback may register
    /// more; the drain continues until none remain. Only then are links
    /// resolved, so forward links to callback-created nodes (a scope's exit
    /// node, a loop's continuation) are legal.
    pub fn finalize(mut self, builder: &mut GraphBuilder) -> Result<(), ModelError> {
        while !self.callbacks.is_empty() {
            let batch = std::mem::take(&mut self.callbacks);
            for callback in batch {
                callback(&mut self)?;
            }
        }

        for link in &self.links {
            if !self.nodes.contains_key(&link.target) {
                return Err(ModelError::UnresolvedTarget {
                    origin: link.source.clone(),
                    target: link.target.clone(),
                });
            }
        }

        for id in &self.insertion_order {
            builder.insert_node(self.nodes[id].node.clone());
        }
        if let Some(start) = self.start.take() {
            builder.set_start_if_unset(start);
        }
        for link in self.links {
            let edge = match link.condition {
                Some(condition) => Link::guarded(link.target, condition),
                None => Link::unconditional(link.target),
            };
            builder.insert_link(link.source, edge);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WorkflowMessage;
    use crate::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
    use crate::types::NodeKind;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl NodeHandler for Noop {
        async fn handle(
            &self,
            message: WorkflowMessage,
            _ctx: &mut NodeContext,
        ) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::with_payload(message.payload))
        }
    }

    fn node(id: &str, kind: NodeKind) -> WorkflowNode {
        WorkflowNode::new(id, kind, Arc::new(Noop))
    }

    #[test]
    /// Children sit one level below their parent; roots are depth 0 and the
    /// first root becomes the start.
    fn test_depth_and_start_tracking() {
        let mut model = WorkflowModel::new();
        model
            .add_node(node("root", NodeKind::ScopeEntry), None)
            .unwrap();
        model
            .add_node(node("child", NodeKind::Effect), Some("root"))
            .unwrap();
        model
            .add_node(node("grandchild", NodeKind::Effect), Some("child"))
            .unwrap();

        assert_eq!(model.start(), Some("root"));
        assert_eq!(model.depth_of(None).unwrap(), 0);
        assert_eq!(model.depth_of(Some("")).unwrap(), 0);
        assert_eq!(model.depth_of(Some("root")).unwrap(), 0);
        assert_eq!(model.depth_of(Some("child")).unwrap(), 1);
        assert_eq!(model.depth_of(Some("grandchild")).unwrap(), 2);
        assert!(matches!(
            model.depth_of(Some("ghost")),
            Err(ModelError::UnresolvedStep { .. })
        ));
    }

    #[test]
    /// Naming a parent that does not exist is an immediate error.
    fn test_unresolved_parent() {
        let mut model = WorkflowModel::new();
        let err = model
            .add_node(node("orphan", NodeKind::Effect), Some("ghost"))
            .expect_err("parent missing");
        match err {
            ModelError::UnresolvedParent { child, parent } => {
                assert_eq!(child, "orphan");
                assert_eq!(parent, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    /// Node ids must be unique and non-empty.
    fn test_id_validation() {
        let mut model = WorkflowModel::new();
        model.add_node(node("a", NodeKind::Effect), None).unwrap();
        assert!(matches!(
            model.add_node(node("a", NodeKind::Effect), None),
            Err(ModelError::DuplicateStep { .. })
        ));
        assert!(matches!(
            model.add_node(node("", NodeKind::Effect), None),
            Err(ModelError::MissingRequiredProperties { .. })
        ));
    }

    #[test]
    /// The last-sibling link falls back to the parent when the parent has no
    /// children yet, and is suppressed entirely when the last sibling is a
    /// clean-start marker.
    fn test_last_sibling_link_rules() {
        let mut model = WorkflowModel::new();
        model
            .add_node(node("scope", NodeKind::ScopeEntry), None)
            .unwrap();
        model
            .add_node(node("exit", NodeKind::ScopeExit), None)
            .unwrap();

        // No children yet: source is the parent itself.
        model
            .add_link_from_last_sibling("scope", "exit", None)
            .unwrap();

        model
            .add_node(node("jump", NodeKind::Jump), Some("scope"))
            .unwrap();
        model
            .add_node(node("fresh", NodeKind::CleanStart), Some("scope"))
            .unwrap();

        // Last sibling is clean-start: no link is drawn.
        model
            .add_link_from_last_sibling("scope", "exit", None)
            .unwrap();

        let mut builder = GraphBuilder::new();
        model.finalize(&mut builder).unwrap();
        let workflow = builder.compile().unwrap();
        assert_eq!(workflow.links_from("scope").len(), 1);
        assert_eq!(workflow.links_from("scope")[0].target, "exit");
        assert!(workflow.links_from("fresh").is_empty());
        assert!(workflow.links().all(|(_, l)| l.target != "fresh"));
    }

    #[test]
    /// A scope-tagged last sibling redirects the chain through its exit node
    /// instead of sourcing the link at the entry.
    fn test_last_sibling_scope_redirect() {
        let mut model = WorkflowModel::new();
        model
            .add_node(node("root", NodeKind::ScopeEntry), None)
            .unwrap();
        model
            .add_node_with(
                node("block", NodeKind::ScopeEntry),
                Some("root"),
                Some(NodeTag::Scope {
                    exit_id: "block__exit".to_string(),
                }),
                None,
            )
            .unwrap();
        model
            .add_node(node("block__exit", NodeKind::ScopeExit), Some("block"))
            .unwrap();

        // Chain past the scope: the link sources from the exit.
        model
            .add_link_from_last_sibling("root", "next", None)
            .unwrap();
        model
            .add_node(node("next", NodeKind::Effect), Some("root"))
            .unwrap();

        let mut builder = GraphBuilder::new();
        model.finalize(&mut builder).unwrap();
        let workflow = builder.compile().unwrap();
        assert!(workflow.links_from("block").is_empty());
        assert_eq!(workflow.links_from("block__exit").len(), 1);
        assert_eq!(workflow.links_from("block__exit")[0].target, "next");
    }

    #[test]
    /// Ancestor lookup walks the parent chain to the nearest tagged node.
    fn test_nearest_loop() {
        let mut model = WorkflowModel::new();
        model
            .add_node(node("root", NodeKind::ScopeEntry), None)
            .unwrap();
        model
            .add_node_with(
                node("loop", NodeKind::LoopEntry),
                Some("root"),
                Some(NodeTag::Loop {
                    select_id: "loop__select".to_string(),
                    continuation_id: "loop__after".to_string(),
                }),
                None,
            )
            .unwrap();
        model
            .add_node(node("body", NodeKind::Effect), Some("loop"))
            .unwrap();
        model
            .add_node(node("breaker", NodeKind::Jump), Some("body"))
            .unwrap();

        let found = model.nearest_loop("breaker").expect("loop ancestor");
        assert_eq!(found.id(), "loop");
        assert!(model.nearest_loop("root").is_none());
    }

    #[test]
    /// Links may point forward to nodes that only a completion callback
    /// creates; all callbacks run before any link resolves.
    fn test_forward_link_to_callback_created_node() {
        let mut model = WorkflowModel::new();
        model
            .add_node_with(
                node("scope", NodeKind::ScopeEntry),
                None,
                None,
                Some(Box::new(|model: &mut WorkflowModel| {
                    model.add_node(node("scope__exit", NodeKind::ScopeExit), None)
                })),
            )
            .unwrap();
        model.add_link("scope", "scope__exit", None).unwrap();

        let mut builder = GraphBuilder::new();
        model.finalize(&mut builder).unwrap();
        let workflow = builder.compile().unwrap();
        assert!(workflow.contains("scope__exit"));
        assert_eq!(workflow.links_from("scope")[0].target, "scope__exit");
    }

    #[test]
    /// A link whose target never materializes fails finalize.
    fn test_unresolved_target() {
        let mut model = WorkflowModel::new();
        model.add_node(node("a", NodeKind::Effect), None).unwrap();
        model.add_link("a", "nowhere", None).unwrap();
        let mut builder = GraphBuilder::new();
        let err = model.finalize(&mut builder).expect_err("dangling target");
        match err {
            ModelError::UnresolvedTarget { origin, target } => {
                assert_eq!(origin, "a");
                assert_eq!(target, "nowhere");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
