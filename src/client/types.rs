use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::de::Error as _;
use serde::Deserialize;
use serde::Deserializer;

/// Every peer answer is wrapped in `{"result": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub result: T,
}

/// `GET /cluster`: one peer's view of the cluster
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterInfo {
    pub peer_id: u64,
    #[serde(default, deserialize_with = "deserialize_peers")]
    pub peers: BTreeMap<u64, PeerInfo>,
    pub raft_info: RaftInfo,
}

impl ClusterInfo {
    pub fn peer_ids(&self) -> BTreeSet<u64> {
        self.peers.keys().copied().collect()
    }

    pub fn size(&self) -> usize {
        self.peers.len()
    }

    pub fn leader(&self) -> Option<u64> {
        self.raft_info.leader
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PeerInfo {
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RaftInfo {
    #[serde(default)]
    pub term: u64,
    #[serde(default)]
    pub commit: u64,
    #[serde(default)]
    pub pending_operations: u64,
    /// `null` while no leader is known
    #[serde(default)]
    pub leader: Option<u64>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_voter: Option<bool>,
}

/// Peers come either as an object keyed by peer id or as a list of
/// `{"id": .., "uri": ..}` entries.
fn deserialize_peers<'de, D>(deserializer: D) -> Result<BTreeMap<u64, PeerInfo>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Peers {
        Keyed(BTreeMap<String, PeerInfo>),
        Listed(Vec<ListedPeer>),
    }

    #[derive(Deserialize)]
    struct ListedPeer {
        #[serde(alias = "peer_id")]
        id: u64,
        #[serde(default)]
        uri: String,
    }

    match Peers::deserialize(deserializer)? {
        Peers::Keyed(peers) => peers
            .into_iter()
            .map(|(id, info)| {
                id.parse::<u64>()
                    .map(|id| (id, info))
                    .map_err(|_| D::Error::custom(format!("invalid peer id key {id:?}")))
            })
            .collect(),
        Peers::Listed(peers) => Ok(peers
            .into_iter()
            .map(|p| (p.id, PeerInfo { uri: p.uri }))
            .collect()),
    }
}

/// Replica state of a shard as reported by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ReplicaState {
    Active,
    Dead,
    Partial,
    Initializing,
    Listener,
    PartialSnapshot,
    Recovery,
    Resharding,
    #[serde(other)]
    Unknown,
}

/// `GET /collections/{name}/cluster`: shard placement seen by one peer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectionClusterInfo {
    #[serde(default)]
    pub peer_id: Option<u64>,
    #[serde(default)]
    pub shard_count: Option<u64>,
    #[serde(default)]
    pub local_shards: Vec<LocalShardInfo>,
    #[serde(default)]
    pub remote_shards: Vec<RemoteShardInfo>,
    #[serde(default)]
    pub shard_transfers: Vec<ShardTransferInfo>,
}

impl CollectionClusterInfo {
    /// States of every local and remote replica, local ones first
    pub fn replica_states(&self) -> impl Iterator<Item = ReplicaState> + '_ {
        self.local_shards
            .iter()
            .map(|s| s.state)
            .chain(self.remote_shards.iter().map(|s| s.state))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalShardInfo {
    #[serde(alias = "id")]
    pub shard_id: u32,
    #[serde(default)]
    pub points_count: Option<u64>,
    pub state: ReplicaState,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteShardInfo {
    #[serde(alias = "id")]
    pub shard_id: u32,
    pub peer_id: u64,
    pub state: ReplicaState,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShardTransferInfo {
    pub shard_id: u32,
    pub from: u64,
    pub to: u64,
    #[serde(default)]
    pub sync: bool,
}

/// `GET /collections/{name}`, reduced to what convergence checks look at
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub points_count: Option<u64>,
    #[serde(default)]
    pub segments_count: Option<u64>,
}

/// `GET /collections`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct CollectionsResponse {
    #[serde(default)]
    pub collections: Vec<CollectionDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct CollectionDescription {
    pub name: String,
}
