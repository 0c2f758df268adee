//! Client side of the wire protocol: one logical call per invocation, no
//! retries. A dial or call failure collapses into `None`/`false`, the empty
//! reply the maintenance loops read as a liveness signal.

use std::time::Duration;

use log::debug;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::node::node_ref::NodeRef;
use crate::threads::chord::chord_proto::chord_client::ChordClient;
use crate::threads::chord::chord_proto::{
    Empty, FindSuccessorRequest, GetRequest, NotifyRequest, PutRequest, ReplicateRequest,
    ShiftRequest,
};
use crate::utils::types::{Address, HashPos, RecordSet};

/// Dials `address` with bounded connect and per-call timeouts.
pub async fn connect(address: &Address, timeout: Duration) -> Option<ChordClient<Channel>> {
    let endpoint = match Endpoint::from_shared(format!("http://{}", address)) {
        Ok(endpoint) => endpoint.connect_timeout(timeout).timeout(timeout),
        Err(e) => {
            debug!("Invalid peer address {}: {}", address, e);
            return None;
        }
    };
    match endpoint.connect().await {
        Ok(channel) => Some(ChordClient::new(channel)),
        Err(e) => {
            debug!("Failed dialing {}: {}", address, e);
            None
        }
    }
}

/// Dials the local service without a per-call deadline; a maintenance tick
/// may fan out many individually bounded cross-node calls.
pub async fn connect_local(address: &Address, timeout: Duration) -> Option<ChordClient<Channel>> {
    let endpoint = match Endpoint::from_shared(format!("http://{}", address)) {
        Ok(endpoint) => endpoint.connect_timeout(timeout),
        Err(e) => {
            debug!("Invalid local address {}: {}", address, e);
            return None;
        }
    };
    match endpoint.connect().await {
        Ok(channel) => Some(ChordClient::new(channel)),
        Err(e) => {
            debug!("Local service at {} not reachable: {}", address, e);
            None
        }
    }
}

/// PING; `false` is the empty reply.
pub async fn ping(address: &Address, timeout: Duration) -> bool {
    match connect(address, timeout).await {
        Some(mut client) => client.ping(Request::new(Empty {})).await.is_ok(),
        None => false,
    }
}

/// FIND_SUCCESSOR carrying the accumulated hop count. A reply without a
/// usable node is malformed and treated as empty.
pub async fn find_successor(
    address: &Address,
    id: HashPos,
    hops: u32,
    timeout: Duration,
) -> Option<(NodeRef, u32)> {
    let mut client = connect(address, timeout).await?;
    let response = client
        .find_successor(Request::new(FindSuccessorRequest { id, hops }))
        .await
        .ok()?
        .into_inner();
    let node: NodeRef = response.node.unwrap_or_default().into();
    if node.is_empty() {
        debug!("Malformed find_successor reply from {}", address);
        return None;
    }
    Some((node, response.hops))
}

/// GET_SUCCESSOR; the empty reference means the peer answered but has none.
pub async fn get_successor(address: &Address, timeout: Duration) -> Option<NodeRef> {
    let mut client = connect(address, timeout).await?;
    let msg = client
        .get_successor(Request::new(Empty {}))
        .await
        .ok()?
        .into_inner();
    Some(msg.into())
}

/// GET_PREDECESSOR; same empty-reference convention as `get_successor`.
pub async fn get_predecessor(address: &Address, timeout: Duration) -> Option<NodeRef> {
    let mut client = connect(address, timeout).await?;
    let msg = client
        .get_predecessor(Request::new(Empty {}))
        .await
        .ok()?
        .into_inner();
    Some(msg.into())
}

pub async fn notify(address: &Address, node: &NodeRef, timeout: Duration) -> bool {
    match connect(address, timeout).await {
        Some(mut client) => client
            .notify(Request::new(NotifyRequest {
                node: Some(node.into()),
            }))
            .await
            .is_ok(),
        None => false,
    }
}

/// GET at the key's owner. The outer `None` is the empty reply; the inner
/// option is whether the owner holds the record.
pub async fn get_record(
    address: &Address,
    key: HashPos,
    timeout: Duration,
) -> Option<Option<Vec<String>>> {
    let mut client = connect(address, timeout).await?;
    let response = client
        .get(Request::new(GetRequest { key }))
        .await
        .ok()?
        .into_inner();
    if response.found {
        Some(Some(response.ips))
    } else {
        Some(None)
    }
}

pub async fn put_records(
    address: &Address,
    owner: HashPos,
    records: RecordSet,
    timeout: Duration,
) -> bool {
    match connect(address, timeout).await {
        Some(mut client) => client
            .put(Request::new(PutRequest {
                owner,
                records: Some(records.into()),
            }))
            .await
            .is_ok(),
        None => false,
    }
}

/// SHIFT against the successor; returns the records this node now owns.
pub async fn shift(
    address: &Address,
    boundary: HashPos,
    timeout: Duration,
) -> Option<RecordSet> {
    let mut client = connect(address, timeout).await?;
    let response = client
        .shift(Request::new(ShiftRequest { boundary }))
        .await
        .ok()?
        .into_inner();
    Some(response.records.map(RecordSet::from).unwrap_or_default())
}

pub async fn replicate(
    address: &Address,
    sender: HashPos,
    records: RecordSet,
    timeout: Duration,
) -> bool {
    match connect(address, timeout).await {
        Some(mut client) => client
            .replicate(Request::new(ReplicateRequest {
                sender,
                records: Some(records.into()),
            }))
            .await
            .is_ok(),
        None => false,
    }
}
