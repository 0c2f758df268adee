//! Conversions between domain values and their wire messages.

use crate::node::node_ref::NodeRef;
use crate::threads::chord::chord_proto::{IpList, NodeMsg, RecordBatch};
use crate::utils::types::RecordSet;

impl From<NodeRef> for NodeMsg {
    fn from(node: NodeRef) -> NodeMsg {
        NodeMsg {
            id: node.id,
            address: node.address,
        }
    }
}

impl From<&NodeRef> for NodeMsg {
    fn from(node: &NodeRef) -> NodeMsg {
        node.clone().into()
    }
}

impl From<NodeMsg> for NodeRef {
    fn from(msg: NodeMsg) -> NodeRef {
        NodeRef {
            id: msg.id,
            address: msg.address,
        }
    }
}

/// The unknown reference crosses the wire as the default message.
impl From<Option<NodeRef>> for NodeMsg {
    fn from(node: Option<NodeRef>) -> NodeMsg {
        node.map(NodeMsg::from).unwrap_or_default()
    }
}

/// Reads a wire reference back into `None` when it carries the unknown
/// sentinel.
pub fn optional_node(msg: NodeMsg) -> Option<NodeRef> {
    let node: NodeRef = msg.into();
    if node.is_empty() {
        None
    } else {
        Some(node)
    }
}

impl From<RecordSet> for RecordBatch {
    fn from(records: RecordSet) -> RecordBatch {
        RecordBatch {
            records: records
                .into_iter()
                .map(|(key, ips)| (key, IpList { ips }))
                .collect(),
        }
    }
}

impl From<RecordBatch> for RecordSet {
    fn from(batch: RecordBatch) -> RecordSet {
        batch
            .records
            .into_iter()
            .map(|(key, list)| (key, list.ips))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_round_trips_as_default() {
        let msg = NodeMsg::from(None::<NodeRef>);
        assert_eq!(msg, NodeMsg::default());
        assert!(optional_node(msg).is_none());
    }

    #[test]
    fn record_batch_keeps_every_key() {
        let records = RecordSet::from([
            (5, vec!["1.1.1.1".to_string()]),
            (9, vec!["2.2.2.2".to_string(), "3.3.3.3".to_string()]),
        ]);
        let batch: RecordBatch = records.clone().into();
        assert_eq!(RecordSet::from(batch), records);
    }
}
