use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::oneshot::Receiver;
use tonic::{Request, Response, Status};

use crate::node::node_ref::NodeRef;
use crate::node::ring;
use crate::node::NodeState;
use crate::query::{normalize_name, LegacyDns};
use crate::threads::chord::chord_proto::{
    Empty, FindSuccessorRequest, FindSuccessorResponse, GetRequest, GetResponse, NodeMsg,
    NodeSummaryMsg, NotifyRequest, PutRequest, QueryRequest, QueryResponse, ReplicateRequest,
    ShardSummaryMsg, ShiftRequest, ShiftResponse,
};
use crate::threads::{snapshot, transport};
use crate::utils::config::Config;
use crate::utils::crypto::hash;
use crate::utils::types::{HashPos, RecordSet};

pub mod chord_proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("chord_descriptor");
}

/// The running node: request dispatcher plus the protocol logic behind every
/// maintenance tick.
pub struct ChordService {
    state: NodeState,
    config: Arc<Config>,
    resolver: Arc<dyn LegacyDns>,
}

impl ChordService {
    /// Waits for the setup task to hand over the shared state, then serves.
    pub async fn new(
        rx: Receiver<NodeState>,
        config: Arc<Config>,
        resolver: Arc<dyn LegacyDns>,
    ) -> ChordService {
        let state = rx
            .await
            .expect("setup task dropped before handing over node state");
        ChordService::with_state(state, config, resolver)
    }

    pub fn with_state(
        state: NodeState,
        config: Arc<Config>,
        resolver: Arc<dyn LegacyDns>,
    ) -> ChordService {
        ChordService {
            state,
            config,
            resolver,
        }
    }

    /// Resolves the owner of `id`. Answers from the local successor when the
    /// id falls into its arc, otherwise recurses through the closest
    /// preceding finger; the local step always costs one hop and a recursive
    /// reply carries the accumulated count.
    pub async fn locate_successor(&self, id: HashPos, hops: u32) -> (NodeRef, u32) {
        let successor = self.state.successor();
        if ring::belongs_to(id, self.state.node.id, successor.id) {
            return (successor, hops + 1);
        }

        let closest = {
            self.state
                .fingers
                .lock()
                .unwrap()
                .closest_preceding(self.state.node.id, id)
        };
        let Some(closest) = closest else {
            return (successor, hops + 1);
        };
        if closest.id == self.state.node.id {
            return (successor, hops + 1);
        }

        match transport::find_successor(&closest.address, id, hops + 1, self.config.call_timeout)
            .await
        {
            Some((node, total)) => (node, total),
            None => {
                // stale finger; the next fix_fingers sweep rewrites it
                debug!("Finger {:?} unreachable while routing {}", closest, id);
                (successor, hops + 1)
            }
        }
    }

    /// One stabilization round: reconcile the successor pointer against the
    /// successor's predecessor, notify, and rebuild the successor list.
    async fn stabilize_once(&self) {
        let successor = self.state.successor();

        match transport::get_predecessor(&successor.address, self.config.call_timeout).await {
            Some(candidate) => {
                if !candidate.is_empty()
                    && ring::between(candidate.id, self.state.node.id, successor.id)
                {
                    info!("Stabilize: successor is now {:?}", candidate);
                    self.state.set_successor(&candidate);
                }
            }
            None => {
                warn!("Successor {:?} unreachable, walking successor list", successor);
                self.promote_backup_successor(&successor).await;
            }
        }

        let successor = self.state.successor();
        if successor.id != self.state.node.id
            && !transport::notify(&successor.address, &self.state.node, self.config.call_timeout)
                .await
        {
            debug!("Notify to {:?} not delivered", successor);
        }

        self.rebuild_successor_list().await;
    }

    /// Pings the backups in order and promotes the first live one; `dead` is
    /// the successor that just failed and is skipped outright.
    async fn promote_backup_successor(&self, dead: &NodeRef) {
        let backups: Vec<NodeRef> = {
            self.state.succ_list.lock().unwrap().backups().to_vec()
        };
        for backup in backups {
            if backup.id == dead.id || backup.id == self.state.node.id {
                continue;
            }
            if transport::ping(&backup.address, self.config.call_timeout).await {
                info!("Promoting {:?} to successor", backup);
                self.state.set_successor(&backup);
                return;
            }
        }
        // nobody left to follow; point back at ourselves until a notify
        // rebuilds the ring
        warn!("No live successor candidate, reverting to self");
        let own = self.state.node.clone();
        self.state.set_successor(&own);
    }

    /// Walks GET_SUCCESSOR pointers starting at self until the list is full,
    /// the walk wraps, or a peer fails to answer (which truncates the list).
    /// The walk is gathered fully before swapping under the list lock.
    async fn rebuild_successor_list(&self) {
        let capacity = { self.state.succ_list.lock().unwrap().capacity() };
        let mut walk = vec![self.state.node.clone()];

        let successor = self.state.successor();
        if successor.id != self.state.node.id && !successor.is_empty() {
            walk.push(successor);
        }

        while walk.len() < capacity {
            let last = walk[walk.len() - 1].clone();
            match transport::get_successor(&last.address, self.config.call_timeout).await {
                Some(next) if !next.is_empty() => {
                    if next.id == self.state.node.id || walk.iter().any(|n| n.id == next.id) {
                        break;
                    }
                    walk.push(next);
                }
                _ => break,
            }
        }

        self.state.succ_list.lock().unwrap().replace(walk);
    }

    /// One check_predecessor round: ping, and on the empty reply adopt the
    /// dead predecessor's replica shard. Adoption and pointer clearing happen
    /// under the predecessor lock so the handover stays atomic with respect
    /// to the other handlers.
    async fn check_predecessor_once(&self) {
        let Some(predecessor) = self.state.predecessor() else {
            return;
        };
        if transport::ping(&predecessor.address, self.config.call_timeout).await {
            debug!("Predecessor {:?} is alive", predecessor);
            return;
        }

        warn!("Predecessor {:?} presumed dead, adopting its shard", predecessor);
        let mut guard = self.state.predecessor.lock().unwrap();
        // notify may have replaced it while the ping was in flight
        if guard.as_ref().map(|p| p.id) == Some(predecessor.id) {
            self.state
                .store
                .lock()
                .unwrap()
                .adopt(predecessor.id, self.state.node.id);
            *guard = None;
        }
    }

    /// One fix_fingers round: rewrite every finger, then the snapshot tick.
    async fn fix_fingers_once(&self) {
        for i in 0..self.config.m {
            let target = ring::finger_start(self.state.node.id, i, self.config.m);
            let (owner, _) = self.locate_successor(target, 0).await;
            self.state
                .fingers
                .lock()
                .unwrap()
                .set_finger(i as usize, owner);
        }
        self.snapshot_tick().await;
    }

    /// Cold-start load while storage is still empty, then an unconditional
    /// write of the current map. I/O failures are logged and swallowed.
    async fn snapshot_tick(&self) {
        let path = snapshot::snapshot_path(&self.config.data_dir, &self.state.node.address);

        let empty = { self.state.store.lock().unwrap().is_empty() };
        if empty {
            match snapshot::load(&path).await {
                Ok(shards) if !shards.is_empty() => {
                    info!("Restored snapshot from {}", path.display());
                    self.state.store.lock().unwrap().restore(shards);
                }
                Ok(_) => {}
                Err(e) => debug!("No snapshot restored from {}: {}", path.display(), e),
            }
        }

        let view = { self.state.store.lock().unwrap().view() };
        if let Err(e) = snapshot::save(&path, view).await {
            warn!("Snapshot write to {} failed: {}", path.display(), e);
        }
    }

    /// One replication round: fan the primary shard out to the next R
    /// distinct successors, each found by resolving the position just past
    /// the previous target.
    async fn replicate_once(&self) {
        let records = {
            let store = self.state.store.lock().unwrap();
            match store.shard(self.state.node.id) {
                Some(shard) if !shard.is_empty() => shard.clone(),
                _ => return,
            }
        };

        let ring_size = self.config.ring_size();
        let mut targets: Vec<NodeRef> = Vec::new();
        let mut cursor = self.state.successor();
        while targets.len() < self.config.replication {
            if cursor.is_empty()
                || cursor.id == self.state.node.id
                || targets.iter().any(|t| t.id == cursor.id)
            {
                break;
            }
            targets.push(cursor.clone());
            let (next, _) = self.locate_successor((cursor.id + 1) % ring_size, 0).await;
            cursor = next;
        }

        for target in targets {
            if !transport::replicate(
                &target.address,
                self.state.node.id,
                records.clone(),
                self.config.call_timeout,
            )
            .await
            {
                debug!("Replica push to {:?} skipped, peer unreachable", target);
            }
        }
    }

    /// The lookup pipeline: cache, local storage, ring, then the legacy
    /// resolver with a writeback to the owner.
    async fn resolve_name(&self, raw: &str) -> Result<(Vec<String>, u32), Status> {
        let name = normalize_name(raw);
        if name.is_empty() {
            return Err(Status::invalid_argument("empty name"));
        }
        let key = hash(name.as_bytes(), self.config.m);

        if let Some(ips) = self.state.cache.lock().unwrap().get(key) {
            info!("{} answered from cache", name);
            return Ok((ips, 0));
        }

        let local = {
            let store = self.state.store.lock().unwrap();
            store.get(self.state.node.id, key).cloned()
        };
        if let Some(ips) = local {
            info!("{} answered from local storage", name);
            return Ok((ips, 0));
        }

        let (owner, hops) = self.locate_successor(key, 0).await;
        debug!("{} hashes to {}, owned by {:?} ({} hops)", name, key, owner, hops);

        if owner.id != self.state.node.id {
            match transport::get_record(&owner.address, key, self.config.call_timeout).await {
                Some(Some(ips)) => {
                    info!("{} answered by the ring after {} hops", name, hops);
                    self.state.cache.lock().unwrap().insert(key, ips.clone());
                    return Ok((ips, hops));
                }
                Some(None) => debug!("Owner {:?} holds no record for {}", owner, name),
                None => warn!("Owner {:?} unreachable for {}", owner, name),
            }
        }

        // last resort: legacy DNS, then write the answer back into the ring
        let ips = self
            .resolver
            .resolve(&name)
            .await
            .map_err(|e| Status::not_found(e.to_string()))?;
        info!("{} answered by legacy dns", name);

        self.state.cache.lock().unwrap().insert(key, ips.clone());

        let records = RecordSet::from([(key, ips.clone())]);
        if owner.id == self.state.node.id {
            self.state.store.lock().unwrap().merge(owner.id, records);
        } else if !transport::put_records(
            &owner.address,
            owner.id,
            records,
            self.config.call_timeout,
        )
        .await
        {
            warn!("Writeback to owner {:?} failed for {}", owner, name);
        }

        Ok((ips, hops))
    }
}

#[tonic::async_trait]
impl chord_proto::chord_server::Chord for ChordService {
    /// Liveness probe.
    async fn ping(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    async fn find_successor(
        &self,
        request: Request<FindSuccessorRequest>,
    ) -> Result<Response<FindSuccessorResponse>, Status> {
        let FindSuccessorRequest { id, hops } = request.into_inner();
        let (node, hops) = self.locate_successor(id, hops).await;
        debug!("find_successor({}) -> {:?} after {} hops", id, node, hops);
        Ok(Response::new(FindSuccessorResponse {
            node: Some(node.into()),
            hops,
        }))
    }

    async fn get_successor(&self, _: Request<Empty>) -> Result<Response<NodeMsg>, Status> {
        Ok(Response::new(self.state.successor().into()))
    }

    async fn get_predecessor(&self, _: Request<Empty>) -> Result<Response<NodeMsg>, Status> {
        Ok(Response::new(self.state.predecessor().into()))
    }

    /// A peer believes it is our predecessor; accept it when we have none or
    /// it sits between the current predecessor and us.
    async fn notify(&self, request: Request<NotifyRequest>) -> Result<Response<Empty>, Status> {
        let candidate: NodeRef = request.into_inner().node.unwrap_or_default().into();
        if candidate.is_empty() {
            return Err(Status::invalid_argument("notify carried no node"));
        }

        let mut predecessor = self.state.predecessor.lock().unwrap();
        let accept = match predecessor.as_ref() {
            None => true,
            Some(current) => ring::between(candidate.id, current.id, self.state.node.id),
        };
        if accept {
            debug!("Notify: predecessor is now {:?}", candidate);
            *predecessor = Some(candidate);
        }
        Ok(Response::new(Empty {}))
    }

    /// GET serves the primary shard only; replica shards answer for their
    /// owner only after adoption.
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let key = request.into_inner().key;
        let found = {
            let store = self.state.store.lock().unwrap();
            store.get(self.state.node.id, key).cloned()
        };
        match found {
            Some(ips) => {
                info!("GET {} served from primary shard", key);
                Ok(Response::new(GetResponse { found: true, ips }))
            }
            None => {
                debug!("GET {} not present", key);
                Ok(Response::new(GetResponse {
                    found: false,
                    ips: vec![],
                }))
            }
        }
    }

    /// PUT merges into the addressed shard; the periodic replication loop
    /// fans it out afterwards.
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<Empty>, Status> {
        let PutRequest { owner, records } = request.into_inner();
        let records: RecordSet = records.map(Into::into).unwrap_or_default();
        info!("PUT of {} records for owner {}", records.len(), owner);
        self.state.store.lock().unwrap().merge(owner, records);
        Ok(Response::new(Empty {}))
    }

    /// One-shot handover to a joining predecessor: every primary key outside
    /// `(boundary, self]` now belongs to the joiner.
    async fn shift(
        &self,
        request: Request<ShiftRequest>,
    ) -> Result<Response<ShiftResponse>, Status> {
        let boundary = request.into_inner().boundary;
        let departed = {
            self.state
                .store
                .lock()
                .unwrap()
                .split_departed(self.state.node.id, boundary)
        };
        info!(
            "Shift at boundary {}: handing over {} records",
            boundary,
            departed.len()
        );
        Ok(Response::new(ShiftResponse {
            records: Some(departed.into()),
        }))
    }

    async fn replicate(
        &self,
        request: Request<ReplicateRequest>,
    ) -> Result<Response<Empty>, Status> {
        let ReplicateRequest { sender, records } = request.into_inner();
        let records: RecordSet = records.map(Into::into).unwrap_or_default();
        debug!("Replica batch of {} records from {}", records.len(), sender);
        self.state.store.lock().unwrap().merge(sender, records);
        Ok(Response::new(Empty {}))
    }

    async fn stabilize(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.stabilize_once().await;
        Ok(Response::new(Empty {}))
    }

    async fn fix_fingers(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.fix_fingers_once().await;
        Ok(Response::new(Empty {}))
    }

    async fn check_predecessor(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.check_predecessor_once().await;
        Ok(Response::new(Empty {}))
    }

    async fn run_replication(&self, _: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.replicate_once().await;
        Ok(Response::new(Empty {}))
    }

    async fn query_dns(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let name = request.into_inner().name;
        let (ips, hops) = self.resolve_name(&name).await?;
        Ok(Response::new(QueryResponse { ips, hops }))
    }

    /// Programmatic inspection of fingers, pointers, storage and cache.
    async fn get_node_summary(
        &self,
        _: Request<Empty>,
    ) -> Result<Response<NodeSummaryMsg>, Status> {
        let predecessor = self.state.predecessor();
        let successor_list: Vec<NodeMsg> = {
            let list = self.state.succ_list.lock().unwrap();
            list.nodes.iter().map(NodeMsg::from).collect()
        };
        let fingers: Vec<NodeMsg> = {
            let table = self.state.fingers.lock().unwrap();
            table.fingers.iter().map(NodeMsg::from).collect()
        };
        let shards: Vec<ShardSummaryMsg> = {
            let store = self.state.store.lock().unwrap();
            store
                .iter()
                .map(|(owner, shard)| ShardSummaryMsg {
                    owner: *owner,
                    keys: shard.keys().copied().collect(),
                })
                .collect()
        };
        let cache_entries = self.state.cache.lock().unwrap().len() as u32;

        Ok(Response::new(NodeSummaryMsg {
            node: Some(self.state.node.clone().into()),
            predecessor: Some(predecessor.into()),
            successor_list,
            fingers,
            shards,
            cache_entries,
        }))
    }
}
