//! End-to-end ring behavior against real nodes on loopback ports. Every node
//! binds port 0, runs shortened maintenance intervals and resolves through a
//! scripted legacy resolver; assertions poll with deadlines instead of
//! assuming tick timing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tonic::transport::Channel;
use tonic::Request;

use chord_dns::node::ring;
use chord_dns::query::LegacyDns;
use chord_dns::threads::chord::chord_proto::chord_client::ChordClient;
use chord_dns::threads::chord::chord_proto::{Empty, GetRequest, NodeSummaryMsg, QueryRequest};
use chord_dns::threads::setup::{self, NodeHandle};
use chord_dns::utils::config::Config;
use chord_dns::utils::crypto::hash;
use chord_dns::utils::error::Error;
use chord_dns::utils::types::HashPos;

struct ScriptedDns {
    answers: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedDns {
    fn new(entries: &[(&str, &str)]) -> Arc<ScriptedDns> {
        let answers = entries
            .iter()
            .map(|(name, ip)| (name.to_string(), vec![ip.to_string()]))
            .collect();
        Arc::new(ScriptedDns {
            answers,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl LegacyDns for ScriptedDns {
    async fn resolve(&self, name: &str) -> chord_dns::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(name).cloned().ok_or_else(|| Error::Resolve {
            name: name.to_string(),
            reason: "scripted miss".to_string(),
        })
    }
}

fn fast_config(data_dir: &std::path::Path) -> Arc<Config> {
    Arc::new(Config {
        stabilize_interval: Duration::from_millis(200),
        fix_fingers_interval: Duration::from_millis(200),
        check_predecessor_interval: Duration::from_millis(200),
        replicate_interval: Duration::from_millis(400),
        call_timeout: Duration::from_millis(800),
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    })
}

async fn spawn_node(
    peer: Option<String>,
    config: Arc<Config>,
    resolver: Arc<dyn LegacyDns>,
) -> NodeHandle {
    setup::start("127.0.0.1:0".to_string(), peer, config, resolver)
        .await
        .expect("node starts")
}

/// Dials a node, retrying while its server comes up.
async fn client(address: &str) -> ChordClient<Channel> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(client) = ChordClient::connect(format!("http://{}", address)).await {
            return client;
        }
        assert!(Instant::now() < deadline, "node at {} never came up", address);
        sleep(Duration::from_millis(100)).await;
    }
}

async fn summary(address: &str) -> NodeSummaryMsg {
    client(address)
        .await
        .get_node_summary(Request::new(Empty {}))
        .await
        .expect("summary call")
        .into_inner()
}

async fn query(address: &str, name: &str) -> Result<Vec<String>, tonic::Status> {
    client(address)
        .await
        .query_dns(Request::new(QueryRequest {
            name: name.to_string(),
        }))
        .await
        .map(|response| response.into_inner().ips)
}

async fn get_at(address: &str, key: HashPos) -> Option<Vec<String>> {
    let response = client(address)
        .await
        .get(Request::new(GetRequest { key }))
        .await
        .expect("get call")
        .into_inner();
    if response.found {
        Some(response.ips)
    } else {
        None
    }
}

fn predecessor_address(summary: &NodeSummaryMsg) -> String {
    summary.predecessor.clone().unwrap_or_default().address
}

/// Owner of `key` in a ring described by (id, address) pairs.
fn owner_of(nodes: &[(HashPos, String)], key: HashPos) -> String {
    let mut sorted: Vec<(HashPos, String)> = nodes.to_vec();
    sorted.sort();
    for i in 0..sorted.len() {
        let prev = sorted[(i + sorted.len() - 1) % sorted.len()].0;
        if ring::belongs_to(key, prev, sorted[i].0) {
            return sorted[i].1.clone();
        }
    }
    unreachable!("some node owns every key");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn genesis_node_serves_and_caches_queries() {
    let dir = tempfile::tempdir().unwrap();
    let dns = ScriptedDns::new(&[("example.com", "1.2.3.4")]);
    let node = spawn_node(None, fast_config(dir.path()), dns.clone()).await;
    let address = node.node.address.clone();

    // resolved through legacy DNS, then written back into the owner's shard
    let ips = query(&address, "example.com").await.unwrap();
    assert_eq!(ips, vec!["1.2.3.4".to_string()]);

    let key = hash(b"example.com", 32);
    assert_eq!(get_at(&address, key).await, Some(vec!["1.2.3.4".to_string()]));

    // normalization maps back to the same key, answered from the cache
    let ips = query(&address, "WWW.Example.COM").await.unwrap();
    assert_eq!(ips, vec!["1.2.3.4".to_string()]);
    assert_eq!(dns.calls(), 1);

    // unknown names surface the resolver failure
    assert!(query(&address, "missing.test").await.is_err());

    node.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joining_node_inherits_its_arc() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<(String, String)> = (0..6)
        .map(|i| (format!("site{}.test", i), format!("10.0.0.{}", i + 1)))
        .collect();
    let entries: Vec<(&str, &str)> = names
        .iter()
        .map(|(name, ip)| (name.as_str(), ip.as_str()))
        .collect();
    let dns = ScriptedDns::new(&entries);

    let n0 = spawn_node(None, fast_config(dir.path()), dns.clone()).await;
    let a0 = n0.node.address.clone();
    for (name, ip) in &names {
        assert_eq!(query(&a0, name).await.unwrap(), vec![ip.clone()]);
    }

    let n1 = spawn_node(Some(a0.clone()), fast_config(dir.path()), dns.clone()).await;
    let a1 = n1.node.address.clone();

    // the two nodes point at each other once stabilization has run
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let s0 = summary(&a0).await;
        let s1 = summary(&a1).await;
        if predecessor_address(&s0) == a1 && predecessor_address(&s1) == a0 {
            break;
        }
        assert!(Instant::now() < deadline, "two-node ring never converged");
        sleep(Duration::from_millis(200)).await;
    }

    // every record sits in its owner's primary shard
    let nodes = vec![(n0.node.id, a0.clone()), (n1.node.id, a1.clone())];
    for (name, ip) in &names {
        let key = hash(name.as_bytes(), 32);
        let owner = owner_of(&nodes, key);
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if get_at(&owner, key).await == Some(vec![ip.clone()]) {
                break;
            }
            assert!(
                Instant::now() < deadline,
                "{} never landed at its owner {}",
                name,
                owner
            );
            sleep(Duration::from_millis(200)).await;
        }
    }

    n0.shutdown();
    n1.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dead_node_keys_survive_on_its_successor() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<(String, String)> = (0..8)
        .map(|i| (format!("host{}.test", i), format!("10.1.0.{}", i + 1)))
        .collect();
    let entries: Vec<(&str, &str)> = names
        .iter()
        .map(|(name, ip)| (name.as_str(), ip.as_str()))
        .collect();
    let dns = ScriptedDns::new(&entries);

    let n0 = spawn_node(None, fast_config(dir.path()), dns.clone()).await;
    let a0 = n0.node.address.clone();
    let n1 = spawn_node(Some(a0.clone()), fast_config(dir.path()), dns.clone()).await;
    let n2 = spawn_node(Some(a0.clone()), fast_config(dir.path()), dns.clone()).await;

    let mut members: Vec<(HashPos, String, Option<NodeHandle>)> = vec![
        (n0.node.id, n0.node.address.clone(), Some(n0)),
        (n1.node.id, n1.node.address.clone(), Some(n1)),
        (n2.node.id, n2.node.address.clone(), Some(n2)),
    ];
    members.sort_by_key(|(id, _, _)| *id);

    // wait until each node's predecessor is the previous ring member
    let deadline = Instant::now() + Duration::from_secs(45);
    loop {
        let mut converged = true;
        for i in 0..members.len() {
            let expected = members[(i + members.len() - 1) % members.len()].1.clone();
            let s = summary(&members[i].1).await;
            if predecessor_address(&s) != expected {
                converged = false;
                break;
            }
        }
        if converged {
            break;
        }
        assert!(Instant::now() < deadline, "three-node ring never converged");
        sleep(Duration::from_millis(200)).await;
    }

    for (name, ip) in &names {
        assert_eq!(query(&members[0].1, name).await.unwrap(), vec![ip.clone()]);
    }

    // pick a key, find its owner and the owner's successor on the ring
    let (victim_name, victim_ip) = names[0].clone();
    let key = hash(victim_name.as_bytes(), 32);
    let nodes: Vec<(HashPos, String)> = members
        .iter()
        .map(|(id, address, _)| (*id, address.clone()))
        .collect();
    let owner_address = owner_of(&nodes, key);
    let owner_index = members
        .iter()
        .position(|(_, address, _)| *address == owner_address)
        .unwrap();
    let heir_address = members[(owner_index + 1) % members.len()].1.clone();
    let owner_id = members[owner_index].0;

    // wait until the heir holds a replica of the owner's shard for that key
    let deadline = Instant::now() + Duration::from_secs(45);
    loop {
        let s = summary(&heir_address).await;
        let replicated = s
            .shards
            .iter()
            .any(|shard| shard.owner == owner_id && shard.keys.contains(&key));
        if replicated {
            break;
        }
        assert!(Instant::now() < deadline, "replica never reached the heir");
        sleep(Duration::from_millis(200)).await;
    }

    members[owner_index].2.take().unwrap().shutdown();

    // the heir adopts the orphaned shard and serves the key as its own
    let deadline = Instant::now() + Duration::from_secs(45);
    loop {
        if get_at(&heir_address, key).await == Some(vec![victim_ip.clone()]) {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "key was lost with its owner instead of surviving on the heir"
        );
        sleep(Duration::from_millis(200)).await;
    }

    // the survivors close the ring around the gap
    let survivors: Vec<&(HashPos, String, Option<NodeHandle>)> = members
        .iter()
        .filter(|(_, _, handle)| handle.is_some())
        .collect();
    let deadline = Instant::now() + Duration::from_secs(45);
    loop {
        let s0 = summary(&survivors[0].1).await;
        let s1 = summary(&survivors[1].1).await;
        if predecessor_address(&s0) == survivors[1].1
            && predecessor_address(&s1) == survivors[0].1
        {
            break;
        }
        assert!(Instant::now() < deadline, "ring never healed after the failure");
        sleep(Duration::from_millis(200)).await;
    }

    for (_, _, handle) in members {
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}
