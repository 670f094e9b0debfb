use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::transform::Transform;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a node in the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Returns a process-wide unique id.
    pub fn fresh() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Renderer,
    Asset,
}

/// Node as seen by the host scene graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub transform: Transform,
}

/// The host primitives the viewer is allowed to use.
pub trait SceneGraph: Send + Sync {
    fn add(&self, node: SceneNode);
    fn remove(&self, id: NodeId) -> bool;
    /// Updates a node's transform in place. Returns `false` for unknown ids.
    fn set_transform(&self, id: NodeId, transform: Transform) -> bool;
}

impl<T> SceneGraph for Arc<T>
where
    T: SceneGraph + ?Sized,
{
    fn add(&self, node: SceneNode) {
        (**self).add(node)
    }

    fn remove(&self, id: NodeId) -> bool {
        (**self).remove(id)
    }

    fn set_transform(&self, id: NodeId, transform: Transform) -> bool {
        (**self).set_transform(id, transform)
    }
}

/// In-memory scene graph shared between the host and the viewer.
#[derive(Debug, Default)]
pub struct HostScene {
    nodes: Arc<RwLock<Vec<SceneNode>>>,
    journal: Arc<RwLock<Journal>>,
}

/// Running record of every mutation applied to a [`HostScene`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    pub mutations: u64,
    /// Names of every node ever added, in order.
    pub added: Vec<String>,
}

impl Clone for HostScene {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
            journal: Arc::clone(&self.journal),
        }
    }
}

impl HostScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all attached nodes.
    pub fn all_nodes(&self) -> Vec<SceneNode> {
        self.nodes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<SceneNode> {
        self.nodes.read().iter().find(|node| node.id == id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().iter().any(|node| node.id == id)
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes
            .read()
            .iter()
            .filter(|node| node.kind == kind)
            .count()
    }

    pub fn journal(&self) -> Journal {
        self.journal.read().clone()
    }
}

impl SceneGraph for HostScene {
    fn add(&self, node: SceneNode) {
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|existing| existing.id == node.id) {
            warn!("{} ({}) is already attached", node.id, node.name);
            return;
        }
        let mut journal = self.journal.write();
        journal.mutations += 1;
        journal.added.push(node.name.clone());
        nodes.push(node);
    }

    fn remove(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let Some(index) = nodes.iter().position(|node| node.id == id) else {
            return false;
        };
        nodes.remove(index);
        self.journal.write().mutations += 1;
        true
    }

    fn set_transform(&self, id: NodeId, transform: Transform) -> bool {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.iter_mut().find(|node| node.id == id) else {
            return false;
        };
        node.transform = transform;
        self.journal.write().mutations += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn node(name: &str, kind: NodeKind) -> SceneNode {
        SceneNode {
            id: NodeId::fresh(),
            name: name.to_string(),
            kind,
            transform: Transform::IDENTITY,
        }
    }

    #[test]
    fn add_and_remove_nodes() {
        let scene = HostScene::new();
        let renderer = node("renderer", NodeKind::Renderer);
        let asset = node("a.splat", NodeKind::Asset);
        scene.add(renderer.clone());
        scene.add(asset.clone());
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.count(NodeKind::Asset), 1);
        assert!(scene.remove(asset.id));
        assert!(!scene.remove(asset.id));
        assert!(scene.contains(renderer.id));
        assert_eq!(scene.journal().added, vec!["renderer", "a.splat"]);
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let scene = HostScene::new();
        let renderer = node("renderer", NodeKind::Renderer);
        scene.add(renderer.clone());
        scene.add(renderer);
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.journal().mutations, 1);
    }

    #[test]
    fn clones_share_nodes() {
        let scene = HostScene::new();
        let shared = scene.clone();
        let asset = node("a.splat", NodeKind::Asset);
        scene.add(asset.clone());
        let moved = Transform {
            position: Vec3::X,
            ..Transform::IDENTITY
        };
        assert!(shared.set_transform(asset.id, moved));
        assert_eq!(scene.get(asset.id).unwrap().transform, moved);
    }
}
