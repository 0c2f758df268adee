//! Connects to a set of running nodes and validates the ring invariants:
//! predecessor ordering, successor-list consistency and finger targets.
//!
//! Usage: `validate_cluster <host:port> [<host:port> ...]`

use std::env;
use std::process::exit;

use tonic::transport::Channel;
use tonic::Request;

use chord_dns::node::ring;
use chord_dns::threads::chord::chord_proto::chord_client::ChordClient;
use chord_dns::threads::chord::chord_proto::{Empty, NodeMsg, NodeSummaryMsg};
use chord_dns::utils::types::HashPos;

#[tokio::main]
async fn main() {
    let urls: Vec<String> = env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: validate_cluster <host:port> [<host:port> ...]");
        exit(2);
    }

    let mut summaries: Vec<NodeSummaryMsg> = Vec::new();
    for url in &urls {
        let mut client: ChordClient<Channel> =
            match ChordClient::connect(format!("http://{}", url)).await {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("cannot reach {}: {}", url, e);
                    exit(1);
                }
            };
        match client.get_node_summary(Request::new(Empty {})).await {
            Ok(response) => summaries.push(response.into_inner()),
            Err(e) => {
                eprintln!("summary call to {} failed: {}", url, e);
                exit(1);
            }
        }
    }

    summaries.sort_by_key(|summary| node_id(&summary.node));
    let ids: Vec<HashPos> = summaries.iter().map(|s| node_id(&s.node)).collect();
    let count = summaries.len();
    let mut valid = true;

    // every node's predecessor is the previous node on the ring
    for (i, summary) in summaries.iter().enumerate() {
        let expected = node_address(&summaries[(i + count - 1) % count].node);
        let predecessor = summary.predecessor.clone().unwrap_or_default().address;
        if predecessor != expected {
            eprintln!(
                "node {}: predecessor is {:?}, expected {}",
                node_address(&summary.node),
                predecessor,
                expected
            );
            valid = false;
        }
    }

    // successor lists walk the ring in order
    for (i, summary) in summaries.iter().enumerate() {
        for (j, entry) in summary.successor_list.iter().skip(1).enumerate() {
            let expected = node_address(&summaries[(i + j + 1) % count].node);
            if entry.address != expected {
                eprintln!(
                    "node {}: successor list entry {} is {}, expected {}",
                    node_address(&summary.node),
                    j + 1,
                    entry.address,
                    expected
                );
                valid = false;
            }
        }
    }

    // every finger points at the node responsible for its start position
    for summary in &summaries {
        let own = node_id(&summary.node);
        let m = summary.fingers.len() as u32;
        for (i, finger) in summary.fingers.iter().enumerate() {
            if finger.address.is_empty() {
                eprintln!("node {}: finger {} still unknown", node_address(&summary.node), i);
                valid = false;
                continue;
            }
            let target = ring::finger_start(own, i as u32, m);
            let expected = responsible_id(&ids, target);
            if finger.id != expected {
                eprintln!(
                    "node {}: finger {} points at {}, but {} is responsible for {}",
                    node_address(&summary.node),
                    i,
                    finger.id,
                    expected,
                    target
                );
                valid = false;
            }
        }
    }

    if valid {
        println!("cluster of {} nodes looks good", count);
    } else {
        eprintln!("cluster is invalid");
        exit(1);
    }
}

fn node_id(node: &Option<NodeMsg>) -> HashPos {
    node.as_ref().map(|n| n.id).unwrap_or_default()
}

fn node_address(node: &Option<NodeMsg>) -> String {
    node.as_ref().map(|n| n.address.clone()).unwrap_or_default()
}

/// First id clockwise from `target`, with wraparound to the smallest id.
fn responsible_id(ids: &[HashPos], target: HashPos) -> HashPos {
    ids.iter()
        .copied()
        .filter(|&id| id >= target)
        .min()
        .or_else(|| ids.iter().copied().min())
        .expect("at least one node id")
}
