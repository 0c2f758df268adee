use crate::node::node_ref::NodeRef;
use crate::node::ring;
use crate::utils::types::HashPos;

/// Routing shortcuts; finger `i` targets the owner of `(id + 2^i) mod 2^m`.
#[derive(Debug, Clone)]
pub struct FingerTable {
    pub fingers: Vec<NodeRef>,
}

impl FingerTable {
    /// A table with every entry unknown, the state of a joining node.
    pub fn new(m: u32) -> FingerTable {
        FingerTable {
            fingers: vec![NodeRef::empty(); m as usize],
        }
    }

    /// A table with every finger pointing at `node`, the genesis state.
    pub fn filled(node: &NodeRef, m: u32) -> FingerTable {
        FingerTable {
            fingers: vec![node.clone(); m as usize],
        }
    }

    pub fn set_finger(&mut self, index: usize, node: NodeRef) {
        self.fingers[index] = node;
    }

    pub fn set_all(&mut self, node: &NodeRef) {
        for finger in &mut self.fingers {
            *finger = node.clone();
        }
    }

    /// The highest finger strictly between this node and `target`, if any.
    /// Unknown entries are skipped.
    pub fn closest_preceding(&self, self_id: HashPos, target: HashPos) -> Option<NodeRef> {
        for finger in self.fingers.iter().rev() {
            if finger.is_empty() {
                continue;
            }
            if ring::between(finger.id, self_id, target) {
                return Some(finger.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_high_to_low() {
        let mut table = FingerTable::new(8);
        table.set_finger(0, NodeRef::new(110, "10.0.0.2:4000"));
        table.set_finger(5, NodeRef::new(140, "10.0.0.3:4000"));
        table.set_finger(7, NodeRef::new(230, "10.0.0.4:4000"));

        // 230 is not in (100, 200), 140 is
        let hit = table.closest_preceding(100, 200).unwrap();
        assert_eq!(hit.id, 140);
    }

    #[test]
    fn skips_unknown_entries() {
        let mut table = FingerTable::new(8);
        table.set_finger(2, NodeRef::new(120, "10.0.0.2:4000"));
        let hit = table.closest_preceding(100, 130).unwrap();
        assert_eq!(hit.id, 120);
    }

    #[test]
    fn none_when_no_finger_precedes() {
        let table = FingerTable::filled(&NodeRef::new(100, "10.0.0.1:4000"), 8);
        // every finger is the node itself, which is never strictly between
        assert!(table.closest_preceding(100, 101).is_none());
    }
}
