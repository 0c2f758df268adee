pub mod cache;
pub mod finger_table;
pub mod node_ref;
pub mod ring;
pub mod storage;
pub mod successor_list;

use std::sync::{Arc, Mutex};

use crate::node::cache::RecentQueries;
use crate::node::finger_table::FingerTable;
use crate::node::node_ref::NodeRef;
use crate::node::storage::DnsStore;
use crate::node::successor_list::SuccessorList;
use crate::utils::config::Config;

/// Shared state of a running node: one lock per field, shared between the
/// request dispatcher and the maintenance loops. No lock is ever held across
/// a transport call.
#[derive(Clone)]
pub struct NodeState {
    pub node: NodeRef,
    pub fingers: Arc<Mutex<FingerTable>>,
    pub predecessor: Arc<Mutex<Option<NodeRef>>>,
    pub successor: Arc<Mutex<NodeRef>>,
    pub succ_list: Arc<Mutex<SuccessorList>>,
    pub store: Arc<Mutex<DnsStore>>,
    pub cache: Arc<Mutex<RecentQueries>>,
}

impl NodeState {
    /// State for the first node of a new ring: it is its own successor and
    /// has no predecessor.
    pub fn genesis(node: NodeRef, config: &Config) -> NodeState {
        let fingers = FingerTable::filled(&node, config.m);
        let succ_list = SuccessorList::new(&node, &node, config.replication + 1);
        NodeState::assemble(node.clone(), fingers, node, succ_list, config)
    }

    /// State for a node joining through an existing member; fingers beyond
    /// the successor start unknown and are filled by the first fix_fingers
    /// sweep.
    pub fn joining(node: NodeRef, successor: NodeRef, config: &Config) -> NodeState {
        let mut fingers = FingerTable::new(config.m);
        fingers.set_finger(0, successor.clone());
        let succ_list = SuccessorList::new(&node, &successor, config.replication + 1);
        NodeState::assemble(node, fingers, successor, succ_list, config)
    }

    fn assemble(
        node: NodeRef,
        fingers: FingerTable,
        successor: NodeRef,
        succ_list: SuccessorList,
        config: &Config,
    ) -> NodeState {
        NodeState {
            node,
            fingers: Arc::new(Mutex::new(fingers)),
            predecessor: Arc::new(Mutex::new(None)),
            successor: Arc::new(Mutex::new(successor)),
            succ_list: Arc::new(Mutex::new(succ_list)),
            store: Arc::new(Mutex::new(DnsStore::new())),
            cache: Arc::new(Mutex::new(RecentQueries::new(config.cache_size))),
        }
    }

    pub fn successor(&self) -> NodeRef {
        self.successor.lock().unwrap().clone()
    }

    pub fn predecessor(&self) -> Option<NodeRef> {
        self.predecessor.lock().unwrap().clone()
    }

    /// Replaces the successor pointer; the first finger shadows it.
    pub fn set_successor(&self, new: &NodeRef) {
        *self.successor.lock().unwrap() = new.clone();
        self.fingers.lock().unwrap().set_finger(0, new.clone());
    }
}
