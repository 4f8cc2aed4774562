use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use warp::http::StatusCode;
use warp::reply::Json;
use warp::reply::WithStatus;
use warp::Filter;

/// Membership shared by the fake peers of one cluster.
/// A peer joins it the first time it answers `GET /cluster`.
pub type SharedMembership = Arc<Mutex<BTreeSet<u64>>>;

type SharedState = Arc<Mutex<FakePeerState>>;

#[derive(Debug, Clone, Default)]
pub struct FakeCollection {
    pub points_count: u64,
    pub local_shards: Vec<Value>,
    pub remote_shards: Vec<Value>,
    pub shard_transfers: Vec<Value>,
}

/// What a fake peer reports; tests mutate it through [`FakePeer::update`]
#[derive(Debug, Clone)]
pub struct FakePeerState {
    pub peer_id: u64,
    /// Used when no shared membership is attached
    pub peers: BTreeSet<u64>,
    pub membership: Option<SharedMembership>,
    pub leader: Option<u64>,
    /// Render `peers` as a list instead of an object keyed by id
    pub peers_as_list: bool,
    pub collections: BTreeMap<String, FakeCollection>,
    /// Every endpoint answers with this status when set
    pub fail_with: Option<u16>,
    /// `GET /cluster` answers with a body of the wrong shape
    pub malformed_cluster: bool,
    pub requests: usize,
}

impl FakePeerState {
    pub fn new(peer_id: u64) -> Self {
        Self {
            peer_id,
            peers: BTreeSet::from([peer_id]),
            membership: None,
            leader: None,
            peers_as_list: false,
            collections: BTreeMap::new(),
            fail_with: None,
            malformed_cluster: false,
            requests: 0,
        }
    }

    pub fn with_peers(
        mut self,
        peers: impl IntoIterator<Item = u64>,
    ) -> Self {
        self.peers = peers.into_iter().collect();
        self
    }

    pub fn with_leader(
        mut self,
        leader: u64,
    ) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn with_membership(
        mut self,
        membership: SharedMembership,
    ) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_collection(
        mut self,
        name: &str,
        collection: FakeCollection,
    ) -> Self {
        self.collections.insert(name.to_string(), collection);
        self
    }

    fn cluster_json(&self) -> Value {
        if self.malformed_cluster {
            return json!({ "peer_id": "not-a-number" });
        }

        let ids: Vec<u64> = match &self.membership {
            Some(membership) => {
                let mut members = membership.lock();
                members.insert(self.peer_id);
                members.iter().copied().collect()
            }
            None => self.peers.iter().copied().collect(),
        };
        let peer_uri = |id: u64| format!("http://peer{id}:6335/");
        let peers = if self.peers_as_list {
            Value::Array(ids.iter().map(|id| json!({ "id": id, "uri": peer_uri(*id) })).collect())
        } else {
            Value::Object(
                ids.iter()
                    .map(|id| (id.to_string(), json!({ "uri": peer_uri(*id) })))
                    .collect(),
            )
        };
        let role = if self.leader == Some(self.peer_id) { "Leader" } else { "Follower" };

        json!({
            "status": "enabled",
            "peer_id": self.peer_id,
            "peers": peers,
            "raft_info": {
                "term": 1,
                "commit": 3,
                "pending_operations": 0,
                "leader": self.leader,
                "role": role,
                "is_voter": true
            }
        })
    }

    fn collections_json(&self) -> Value {
        let names: Vec<Value> = self.collections.keys().map(|name| json!({ "name": name })).collect();
        json!({ "collections": names })
    }

    fn collection_json(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.collections.get(name).map(|c| {
            json!({
                "status": "green",
                "optimizer_status": "ok",
                "points_count": c.points_count,
                "segments_count": 1
            })
        })
    }

    fn collection_cluster_json(
        &self,
        name: &str,
    ) -> Option<Value> {
        self.collections.get(name).map(|c| {
            json!({
                "peer_id": self.peer_id,
                "shard_count": c.local_shards.len() + c.remote_shards.len(),
                "local_shards": c.local_shards,
                "remote_shards": c.remote_shards,
                "shard_transfers": c.shard_transfers
            })
        })
    }

    fn respond(
        &mut self,
        body: impl FnOnce(&Self) -> Option<Value>,
    ) -> WithStatus<Json> {
        self.requests += 1;
        if let Some(code) = self.fail_with {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return warp::reply::with_status(
                warp::reply::json(&json!({ "status": { "error": "injected failure" } })),
                status,
            );
        }
        match body(self) {
            Some(result) => warp::reply::with_status(
                warp::reply::json(&json!({ "result": result, "status": "ok", "time": 0.0001 })),
                StatusCode::OK,
            ),
            None => warp::reply::with_status(
                warp::reply::json(&json!({ "status": { "error": "Not found" } })),
                StatusCode::NOT_FOUND,
            ),
        }
    }
}

pub fn local_shard(
    shard_id: u32,
    state: &str,
) -> Value {
    json!({ "shard_id": shard_id, "points_count": 0, "state": state })
}

pub fn remote_shard(
    shard_id: u32,
    peer_id: u64,
    state: &str,
) -> Value {
    json!({ "shard_id": shard_id, "peer_id": peer_id, "state": state })
}

pub fn shard_transfer(
    shard_id: u32,
    from: u64,
    to: u64,
) -> Value {
    json!({ "shard_id": shard_id, "from": from, "to": to, "sync": false })
}

fn routes(
    state: SharedState
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let root = warp::get()
        .and(warp::path::end())
        .and(with_state.clone())
        .map(|state: SharedState| {
            state.lock().respond(|_| Some(json!({ "title": "fake peer", "version": "0.0.0" })))
        });
    let cluster = warp::get()
        .and(warp::path!("cluster"))
        .and(with_state.clone())
        .map(|state: SharedState| state.lock().respond(|s| Some(s.cluster_json())));
    let collections = warp::get()
        .and(warp::path!("collections"))
        .and(with_state.clone())
        .map(|state: SharedState| state.lock().respond(|s| Some(s.collections_json())));
    let collection = warp::get()
        .and(warp::path!("collections" / String))
        .and(with_state.clone())
        .map(|name: String, state: SharedState| state.lock().respond(|s| s.collection_json(&name)));
    let collection_cluster = warp::get()
        .and(warp::path!("collections" / String / "cluster"))
        .and(with_state)
        .map(|name: String, state: SharedState| {
            state.lock().respond(|s| s.collection_cluster_json(&name))
        });

    root.or(cluster).or(collections).or(collection).or(collection_cluster)
}

/// In-process HTTP server answering the read-only endpoints of a peer
pub struct FakePeer {
    addr: SocketAddr,
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl FakePeer {
    /// Listens on an OS-assigned port of 127.0.0.1
    pub async fn start(state: FakePeerState) -> Self {
        Self::start_on(0, state).await
    }

    pub async fn start_on(
        port: u16,
        state: FakePeerState,
    ) -> Self {
        let state = Arc::new(Mutex::new(state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(routes(state.clone()))
            .try_bind_with_graceful_shutdown(([127, 0, 0, 1], port), async {
                shutdown_rx.await.ok();
            })
            .unwrap_or_else(|e| panic!("failed to bind fake peer on port {port}: {e}"));
        debug!("fake peer listening on {addr}");

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            server: Some(tokio::spawn(server)),
        }
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn update(
        &self,
        f: impl FnOnce(&mut FakePeerState),
    ) {
        f(&mut self.state.lock());
    }

    /// Shared handle for changing the state from a spawned task
    pub fn state(&self) -> Arc<Mutex<FakePeerState>> {
        self.state.clone()
    }

    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Stops listening; later connections are refused.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
        }
    }
}

impl Drop for FakePeer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
