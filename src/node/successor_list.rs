use crate::node::node_ref::NodeRef;

/// Ordered walk of successors, `nodes[0]` being the node itself. The tail
/// backs up the direct successor when it dies; capacity is R+1.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    pub nodes: Vec<NodeRef>,
    capacity: usize,
}

impl SuccessorList {
    /// List for a fresh node: itself, then its successor when distinct.
    pub fn new(own: &NodeRef, successor: &NodeRef, capacity: usize) -> SuccessorList {
        let mut nodes = vec![own.clone()];
        if !successor.is_empty() && successor.id != own.id && nodes.len() < capacity {
            nodes.push(successor.clone());
        }
        SuccessorList { nodes, capacity }
    }

    /// Entries after self, in ring order.
    pub fn backups(&self) -> &[NodeRef] {
        &self.nodes[1..]
    }

    /// Swaps in a freshly gathered walk, truncated to capacity.
    pub fn replace(&mut self, mut nodes: Vec<NodeRef>) {
        nodes.truncate(self.capacity);
        self.nodes = nodes;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
