//! Named convergence conditions and the waits built on them.
//!
//! Every condition turns an unreachable peer into "not yet". Every
//! `Convergence::wait_*` dumps what the involved peers report, at error
//! level, before returning a failure.

mod cluster;
mod collection;
pub use cluster::*;
pub use collection::*;


use std::fmt::Write as _;

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::client::PeerClient;
use crate::poll::wait_for;
use crate::poll::Condition;
use crate::poll::PollSettings;
use crate::Error;
use crate::Result;

/// Converts a failed query into the verdict of a condition: unreachable
/// peers are simply not converged yet, anything else is fatal.
pub(crate) fn not_yet(
    uri: &str,
    e: Error,
) -> Result<bool> {
    if e.is_unreachable() {
        warn!("Could not contact peer {uri}: {e}");
        Ok(false)
    } else {
        Err(e)
    }
}

/// What to print when a wait fails
enum Diagnostics<'a> {
    Clusters(&'a [String]),
    CollectionCluster { uri: &'a str, collection: &'a str },
}

/// Waits on cluster state with one client and one wait budget
#[derive(Debug, Clone)]
pub struct Convergence {
    client: PeerClient,
    poll: PollSettings,
}

impl Convergence {
    pub fn new(
        client: PeerClient,
        poll: PollSettings,
    ) -> Self {
        Self { client, poll }
    }

    pub fn client(&self) -> &PeerClient {
        &self.client
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    /// Same client, different wait budget
    pub fn with_poll_settings(
        &self,
        poll: PollSettings,
    ) -> Self {
        Self {
            client: self.client.clone(),
            poll,
        }
    }

    /// Waits until the peer sees `expected_size` members and a leader, and
    /// returns that leader.
    pub async fn wait_peer_added(
        &self,
        uri: &str,
        expected_size: usize,
    ) -> Result<u64> {
        let peers = [uri.to_string()];
        self.wait_or_dump(
            &mut ClusterSize::new(&self.client, uri, expected_size),
            Diagnostics::Clusters(&peers),
        )
        .await?;
        self.wait_or_dump(
            &mut LeaderDefined::new(&self.client, uri),
            Diagnostics::Clusters(&peers),
        )
        .await?;

        self.client
            .leader(uri)
            .await?
            .ok_or_else(|| Error::Fatal(format!("peer {uri} lost its leader right after electing it")))
    }

    pub async fn wait_for_uniform_cluster_status(
        &self,
        uris: &[String],
        expected_leader: u64,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut ClusterConsistent::new(&self.client, uris, expected_leader),
            Diagnostics::Clusters(uris),
        )
        .await
    }

    pub async fn wait_for_peer_online(
        &self,
        uri: &str,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut PeerOnline::new(&self.client, uri),
            Diagnostics::Clusters(&[uri.to_string()]),
        )
        .await
    }

    pub async fn wait_all_peers_up(
        &self,
        uris: &[String],
    ) -> Result<()> {
        self.wait_or_dump(&mut AllPeersRespond::new(&self.client, uris), Diagnostics::Clusters(uris))
            .await
    }

    pub async fn wait_for_uniform_collection_existence(
        &self,
        collection: &str,
        uris: &[String],
    ) -> Result<()> {
        self.wait_or_dump(
            &mut CollectionExists::new(&self.client, uris, collection),
            Diagnostics::Clusters(uris),
        )
        .await
    }

    pub async fn wait_for_all_replicas_active(
        &self,
        uri: &str,
        collection: &str,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut ShardCondition::all_replicas_active(&self.client, uri, collection),
            Diagnostics::Clusters(&[uri.to_string()]),
        )
        .await
    }

    pub async fn wait_for_some_replicas_not_active(
        &self,
        uri: &str,
        collection: &str,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut ShardCondition::some_replicas_not_active(&self.client, uri, collection),
            Diagnostics::Clusters(&[uri.to_string()]),
        )
        .await
    }

    pub async fn wait_for_collection_shard_transfers_count(
        &self,
        uri: &str,
        collection: &str,
        expected: usize,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut ShardCondition::shard_transfers_count(&self.client, uri, collection, expected),
            Diagnostics::CollectionCluster { uri, collection },
        )
        .await
    }

    pub async fn wait_for_collection_local_shards_count(
        &self,
        uri: &str,
        collection: &str,
        expected: usize,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut ShardCondition::local_shards_count(&self.client, uri, collection, expected),
            Diagnostics::CollectionCluster { uri, collection },
        )
        .await
    }

    pub async fn wait_collection_size(
        &self,
        uri: &str,
        collection: &str,
        expected: u64,
    ) -> Result<()> {
        self.wait_or_dump(
            &mut CollectionSize::new(&self.client, uri, collection, expected),
            Diagnostics::CollectionCluster { uri, collection },
        )
        .await
    }

    /// The collection shows up everywhere, then every peer sees all of its
    /// replicas active.
    pub async fn wait_collection_exists_and_active_on_all_peers(
        &self,
        collection: &str,
        uris: &[String],
    ) -> Result<()> {
        self.wait_for_uniform_collection_existence(collection, uris).await?;
        for uri in uris {
            self.wait_for_all_replicas_active(uri, collection).await?;
        }
        Ok(())
    }

    /// Waits for a leader other than `previous` that the peer reports
    /// `count` times in a row, and returns it.
    pub async fn wait_leader_reelected(
        &self,
        uri: &str,
        previous: Option<u64>,
        count: usize,
    ) -> Result<u64> {
        let mut condition = LeaderReelected::new(&self.client, uri, previous, count);
        self.wait_or_dump(&mut condition, Diagnostics::Clusters(&[uri.to_string()]))
            .await?;
        condition
            .elected()
            .ok_or_else(|| Error::Fatal(format!("no new leader recorded for {uri}")))
    }

    /// API URI of the reachable peer with the highest peer id.
    /// Offline peers are skipped.
    pub async fn fetch_highest_peer_id(
        &self,
        uris: &[String],
    ) -> Option<String> {
        let mut highest: Option<(u64, &String)> = None;
        for uri in uris {
            match self.client.cluster_info(uri).await {
                Ok(info) => {
                    if highest.map_or(true, |(id, _)| info.peer_id > id) {
                        highest = Some((info.peer_id, uri));
                    }
                }
                Err(e) => warn!("Can't retrieve cluster info for offline peer {uri}: {e}"),
            }
        }
        highest.map(|(_, uri)| uri.clone())
    }

    /// Logs the `/cluster` answer of every peer and returns the report.
    /// Peers that cannot answer are reported, not treated as failures.
    pub async fn dump_clusters_info(
        &self,
        uris: &[String],
    ) -> String {
        let mut report = String::new();
        for uri in uris {
            match self.client.raw(uri, "/cluster").await {
                Ok(info) => {
                    let pretty = serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string());
                    let _ = writeln!(report, "{uri}:\n{pretty}");
                }
                Err(e) if e.is_unreachable() => {
                    let _ = writeln!(report, "Can't retrieve cluster info for offline peer {uri}");
                }
                Err(e) => {
                    let _ = writeln!(report, "Can't retrieve cluster info for peer {uri}: {e}");
                }
            }
        }
        error!("cluster info:\n{report}");
        report
    }

    /// Logs the `/collections/{name}/cluster` answer of one peer and returns
    /// the report.
    pub async fn dump_collection_cluster_info(
        &self,
        uri: &str,
        collection: &str,
    ) -> String {
        let path = format!("/collections/{collection}/cluster");
        let report = match self.client.raw(uri, &path).await {
            Ok(info) => {
                let pretty = serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string());
                format!("{uri} {collection}:\n{pretty}")
            }
            Err(e) => format!("Can't retrieve cluster info of collection {collection} from {uri}: {e}"),
        };
        error!("collection cluster info:\n{report}");
        report
    }

    async fn wait_or_dump<C>(
        &self,
        condition: &mut C,
        diagnostics: Diagnostics<'_>,
    ) -> Result<()>
    where
        C: Condition,
    {
        match wait_for(condition, self.poll).await {
            Ok(()) => {
                info!("{} satisfied", condition.name());
                Ok(())
            }
            Err(e) => {
                error!("waiting for {} failed: {}", condition.name(), e);
                match diagnostics {
                    Diagnostics::Clusters(uris) => {
                        self.dump_clusters_info(uris).await;
                    }
                    Diagnostics::CollectionCluster { uri, collection } => {
                        self.dump_collection_cluster_info(uri, collection).await;
                    }
                }
                Err(e)
            }
        }
    }
}
