use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::element::{NodeId, UiBounds, UiNode};

/// A point-in-time view of one application's accessibility tree. All
/// queries against a snapshot see the same logical instant; element
/// coordinates are only meaningful for the snapshot that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub app: String,
    pub captured_at: DateTime<Utc>,
    pub root: NodeId,
    pub nodes: HashMap<NodeId, UiNode>,
    pub focused: Option<NodeId>,
}

impl UiSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(&id)
    }

    pub fn root_node(&self) -> Option<&UiNode> {
        self.nodes.get(&self.root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first pre-order walk from the root. Children are visited in
    /// the order the native tree reported them, which is what the ranking
    /// tie-break relies on.
    pub fn pre_order(&self) -> PreOrder<'_> {
        PreOrder {
            snapshot: self,
            stack: vec![self.root],
            emitted: 0,
        }
    }
}

pub struct PreOrder<'a> {
    snapshot: &'a UiSnapshot,
    stack: Vec<NodeId>,
    emitted: usize,
}

impl<'a> Iterator for PreOrder<'a> {
    /// `(position, node)` where position is the pre-order index.
    type Item = (usize, &'a UiNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.stack.pop()?;
            let Some(node) = self.snapshot.node(id) else {
                continue;
            };
            for &child in node.children.iter().rev() {
                self.stack.push(child);
            }
            let position = self.emitted;
            self.emitted += 1;
            return Some((position, node));
        }
    }
}

/// Test and provider helper for assembling snapshots by hand.
pub struct SnapshotBuilder {
    app: String,
    nodes: HashMap<NodeId, UiNode>,
    root_children: Vec<NodeId>,
    focused: Option<NodeId>,
    next_id: u64,
}

impl SnapshotBuilder {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            nodes: HashMap::new(),
            root_children: Vec::new(),
            focused: None,
            next_id: 1,
        }
    }

    /// Add a leaf element under the root; returns its id.
    pub fn leaf(
        &mut self,
        role: &str,
        title: Option<&str>,
        description: Option<&str>,
        value: Option<&str>,
        bounds: UiBounds,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            UiNode {
                id,
                role: role.to_string(),
                title: title.map(str::to_string),
                description: description.map(str::to_string),
                value: value.map(str::to_string),
                help: None,
                enabled: true,
                bounds: Some(bounds),
                children: vec![],
            },
        );
        self.root_children.push(id);
        id
    }

    pub fn disabled(mut self, id: NodeId) -> Self {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.enabled = false;
        }
        self
    }

    pub fn focus(mut self, id: NodeId) -> Self {
        self.focused = Some(id);
        self
    }

    pub fn build(self) -> UiSnapshot {
        let root = NodeId(0);
        let mut nodes = self.nodes;
        nodes.insert(
            root,
            UiNode {
                id: root,
                role: "AXApplication".to_string(),
                title: Some(self.app.clone()),
                description: None,
                value: None,
                help: None,
                enabled: true,
                bounds: None,
                children: self.root_children,
            },
        );
        UiSnapshot {
            app: self.app,
            captured_at: Utc::now(),
            root,
            nodes,
            focused: self.focused,
        }
    }
}
