//! Conditions over collections and their shard placement.

use async_trait::async_trait;
use tracing::debug;

use super::not_yet;
use crate::client::CollectionClusterInfo;
use crate::client::CollectionInfo;
use crate::client::PeerClient;
use crate::client::ReplicaState;
use crate::poll::Condition;
use crate::Result;

pub fn all_replicas_active(info: &CollectionClusterInfo) -> bool {
    info.replica_states().all(|state| state == ReplicaState::Active)
}

pub fn has_shard_transfers(
    info: &CollectionClusterInfo,
    expected: usize,
) -> bool {
    info.shard_transfers.len() == expected
}

pub fn has_local_shards(
    info: &CollectionClusterInfo,
    expected: usize,
) -> bool {
    info.local_shards.len() == expected
}

pub fn has_points(
    info: &CollectionInfo,
    expected: u64,
) -> bool {
    info.points_count == Some(expected)
}

/// The collection is listed on every peer of the set
pub struct CollectionExists {
    client: PeerClient,
    uris: Vec<String>,
    collection: String,
}

impl CollectionExists {
    pub fn new(
        client: &PeerClient,
        uris: &[String],
        collection: &str,
    ) -> Self {
        Self {
            client: client.clone(),
            uris: uris.to_vec(),
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl Condition for CollectionExists {
    fn name(&self) -> String {
        format!("CollectionExists({} on {} peers)", self.collection, self.uris.len())
    }

    async fn check(&mut self) -> Result<bool> {
        for uri in &self.uris {
            match self.client.list_collections(uri).await {
                Ok(names) if names.contains(&self.collection) => continue,
                Ok(names) => {
                    debug!("Collection '{}' does not exist on peer {} found {:?}", self.collection, uri, names);
                    return Ok(false);
                }
                Err(e) => return not_yet(uri, e),
            }
        }
        Ok(true)
    }
}

/// Which part of `GET /collections/{name}/cluster` a [`ShardCondition`] looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardCheck {
    AllReplicasActive,
    SomeReplicasNotActive,
    ShardTransfersCount(usize),
    LocalShardsCount(usize),
}

impl ShardCheck {
    pub fn evaluate(
        &self,
        info: &CollectionClusterInfo,
    ) -> bool {
        match self {
            ShardCheck::AllReplicasActive => all_replicas_active(info),
            ShardCheck::SomeReplicasNotActive => !all_replicas_active(info),
            ShardCheck::ShardTransfersCount(expected) => has_shard_transfers(info, *expected),
            ShardCheck::LocalShardsCount(expected) => has_local_shards(info, *expected),
        }
    }
}

/// Shard placement of one collection, as seen by one peer
pub struct ShardCondition {
    client: PeerClient,
    uri: String,
    collection: String,
    check: ShardCheck,
}

impl ShardCondition {
    pub fn new(
        client: &PeerClient,
        uri: &str,
        collection: &str,
        check: ShardCheck,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
            collection: collection.to_string(),
            check,
        }
    }

    pub fn all_replicas_active(
        client: &PeerClient,
        uri: &str,
        collection: &str,
    ) -> Self {
        Self::new(client, uri, collection, ShardCheck::AllReplicasActive)
    }

    pub fn some_replicas_not_active(
        client: &PeerClient,
        uri: &str,
        collection: &str,
    ) -> Self {
        Self::new(client, uri, collection, ShardCheck::SomeReplicasNotActive)
    }

    pub fn shard_transfers_count(
        client: &PeerClient,
        uri: &str,
        collection: &str,
        expected: usize,
    ) -> Self {
        Self::new(client, uri, collection, ShardCheck::ShardTransfersCount(expected))
    }

    pub fn local_shards_count(
        client: &PeerClient,
        uri: &str,
        collection: &str,
        expected: usize,
    ) -> Self {
        Self::new(client, uri, collection, ShardCheck::LocalShardsCount(expected))
    }
}

#[async_trait]
impl Condition for ShardCondition {
    fn name(&self) -> String {
        format!("{:?}({}, {})", self.check, self.uri, self.collection)
    }

    async fn check(&mut self) -> Result<bool> {
        match self
            .client
            .collection_cluster_info(&self.uri, &self.collection)
            .await
        {
            Ok(info) => Ok(self.check.evaluate(&info)),
            Err(e) => not_yet(&self.uri, e),
        }
    }
}

/// The collection holds exactly `expected` points
pub struct CollectionSize {
    client: PeerClient,
    uri: String,
    collection: String,
    expected: u64,
}

impl CollectionSize {
    pub fn new(
        client: &PeerClient,
        uri: &str,
        collection: &str,
        expected: u64,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
            collection: collection.to_string(),
            expected,
        }
    }
}

#[async_trait]
impl Condition for CollectionSize {
    fn name(&self) -> String {
        format!("CollectionSize({}, {} == {})", self.uri, self.collection, self.expected)
    }

    async fn check(&mut self) -> Result<bool> {
        match self.client.collection_info(&self.uri, &self.collection).await {
            Ok(info) => Ok(has_points(&info, self.expected)),
            Err(e) => not_yet(&self.uri, e),
        }
    }
}
