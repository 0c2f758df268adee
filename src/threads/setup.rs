//! Node bootstrap: genesis vs join, the state handoff to the service task,
//! gRPC server startup and the maintenance driver loops.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::node::node_ref::NodeRef;
use crate::node::NodeState;
use crate::query::LegacyDns;
use crate::threads::chord::chord_proto;
use crate::threads::chord::chord_proto::chord_server::ChordServer;
use crate::threads::chord::ChordService;
use crate::threads::maintenance::{run_tick_loop, Tick};
use crate::threads::transport;
use crate::utils::config::Config;
use crate::utils::crypto::hash;
use crate::utils::error::{Error, Result};
use crate::utils::types::Address;

/// Handle on a running node. Dropping it leaves the node running; `shutdown`
/// stops the server and every loop.
pub struct NodeHandle {
    pub node: NodeRef,
    shutdown: oneshot::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Stops the server and aborts the maintenance loops.
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            task.abort();
        }
    }

    /// Blocks until every node task has finished (effectively forever in
    /// normal operation).
    pub async fn wait(self) {
        let NodeHandle {
            tasks,
            shutdown: _keep_alive,
            ..
        } = self;
        for task in tasks {
            let _ = task.await;
        }
    }
}

/// Boots a node: binds the listener, resolves genesis vs join, hands the
/// shared state to the service task and spawns the driver loops. A bind port
/// of 0 is replaced by the kernel-assigned port before the address is
/// hashed.
pub async fn start(
    bind: Address,
    peer: Option<Address>,
    config: Arc<Config>,
    resolver: Arc<dyn LegacyDns>,
) -> Result<NodeHandle> {
    config.validate()?;

    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {}: {}", bind, e)))?;
    let bound = listener
        .local_addr()
        .map_err(|e| Error::Config(e.to_string()))?;
    let address = match bind.rsplit_once(':') {
        Some((host, "0")) => format!("{}:{}", host, bound.port()),
        _ => bind.clone(),
    };

    let node = NodeRef::new(hash(address.as_bytes(), config.m), address.clone());
    info!("Node {} owns ring position {}", node.address, node.id);

    let (tx_state, rx_state) = oneshot::channel();
    let (tx_shutdown, rx_shutdown) = oneshot::channel::<()>();
    let mut tasks = Vec::new();

    info!("Starting up gRPC service on {}", address);
    let service_config = config.clone();
    let incoming = TcpListenerStream::new(listener);
    tasks.push(tokio::spawn(async move {
        let service = ChordService::new(rx_state, service_config, resolver).await;
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(chord_proto::FILE_DESCRIPTOR_SET)
            .build()
            .expect("descriptor set compiled into the binary is valid");

        // only an explicit shutdown stops the server; a dropped handle
        // leaves the node running
        let signal = async move {
            if rx_shutdown.await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        if let Err(e) = Server::builder()
            .add_service(ChordServer::new(service))
            .add_service(reflection)
            .serve_with_incoming_shutdown(incoming, signal)
            .await
        {
            error!("gRPC server stopped: {}", e);
        }
    }));

    let state = match peer {
        Some(ref helper) => join_ring(&node, helper, &config).await?,
        None => {
            info!("Starting up a new ring");
            NodeState::genesis(node.clone(), &config)
        }
    };

    if tx_state.send(state.clone()).is_err() {
        return Err(Error::Config("service task exited during startup".to_string()));
    }

    for tick in [
        Tick::Stabilize,
        Tick::FixFingers,
        Tick::CheckPredecessor,
        Tick::Replicate,
    ] {
        tasks.push(tokio::spawn(run_tick_loop(
            address.clone(),
            config.clone(),
            tick,
        )));
    }

    // one-shot handover of the keys this node now owns
    if peer.is_some() {
        let successor = state.successor();
        if successor.id != node.id {
            match transport::shift(&successor.address, node.id, config.call_timeout).await {
                Some(records) if !records.is_empty() => {
                    info!("Inherited {} records from {:?}", records.len(), successor);
                    state.store.lock().unwrap().merge(node.id, records);
                }
                Some(_) => debug!("No records to inherit from {:?}", successor),
                None => warn!(
                    "Shift against {:?} failed; keys will arrive via replication",
                    successor
                ),
            }
        }
    }

    Ok(NodeHandle {
        node,
        shutdown: tx_shutdown,
        tasks,
    })
}

/// Resolves this node's successor through any existing ring member.
async fn join_ring(node: &NodeRef, helper: &Address, config: &Arc<Config>) -> Result<NodeState> {
    info!("Joining the ring through {}", helper);
    let (successor, _) = transport::find_successor(helper, node.id, 0, config.call_timeout)
        .await
        .ok_or_else(|| Error::Unreachable(helper.clone()))?;
    info!("Successor is {:?}", successor);
    Ok(NodeState::joining(node.clone(), successor, config))
}
