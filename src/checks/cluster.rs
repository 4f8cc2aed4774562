//! Conditions over `GET /cluster` and peer liveness.

use async_trait::async_trait;
use tracing::debug;

use super::not_yet;
use crate::client::ClusterInfo;
use crate::client::PeerClient;
use crate::poll::Condition;
use crate::Result;

/// The peer's membership has exactly `expected` peers
pub fn has_cluster_size(
    info: &ClusterInfo,
    expected: usize,
) -> bool {
    info.size() == expected
}

/// The peer knows who the leader is
pub fn has_leader(info: &ClusterInfo) -> bool {
    info.leader().is_some()
}

/// The peer agrees on the leader and on the membership size
pub fn is_consistent(
    info: &ClusterInfo,
    expected_leader: u64,
    expected_size: usize,
) -> bool {
    info.leader() == Some(expected_leader) && info.size() == expected_size
}

pub struct ClusterSize {
    client: PeerClient,
    uri: String,
    expected: usize,
}

impl ClusterSize {
    pub fn new(
        client: &PeerClient,
        uri: &str,
        expected: usize,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
            expected,
        }
    }
}

#[async_trait]
impl Condition for ClusterSize {
    fn name(&self) -> String {
        format!("ClusterSize({} == {})", self.uri, self.expected)
    }

    async fn check(&mut self) -> Result<bool> {
        match self.client.cluster_info(&self.uri).await {
            Ok(info) => {
                let ok = has_cluster_size(&info, self.expected);
                if !ok {
                    debug!("Cluster size invalid for peer {} {}/{}", self.uri, info.size(), self.expected);
                }
                Ok(ok)
            }
            Err(e) => not_yet(&self.uri, e),
        }
    }
}

pub struct LeaderDefined {
    client: PeerClient,
    uri: String,
}

impl LeaderDefined {
    pub fn new(
        client: &PeerClient,
        uri: &str,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
        }
    }
}

#[async_trait]
impl Condition for LeaderDefined {
    fn name(&self) -> String {
        format!("LeaderDefined({})", self.uri)
    }

    async fn check(&mut self) -> Result<bool> {
        match self.client.cluster_info(&self.uri).await {
            Ok(info) => Ok(has_leader(&info)),
            Err(e) => not_yet(&self.uri, e),
        }
    }
}

/// Every peer of the set reports `expected_leader` and a membership as large
/// as the set. All peers are queried on every evaluation.
pub struct ClusterConsistent {
    client: PeerClient,
    uris: Vec<String>,
    expected_leader: u64,
}

impl ClusterConsistent {
    pub fn new(
        client: &PeerClient,
        uris: &[String],
        expected_leader: u64,
    ) -> Self {
        Self {
            client: client.clone(),
            uris: uris.to_vec(),
            expected_leader,
        }
    }
}

#[async_trait]
impl Condition for ClusterConsistent {
    fn name(&self) -> String {
        format!(
            "ClusterConsistent({} peers, leader {})",
            self.uris.len(),
            self.expected_leader
        )
    }

    async fn check(&mut self) -> Result<bool> {
        let expected_size = self.uris.len();
        let mut all_consistent = true;

        for uri in &self.uris {
            let consistent = match self.client.cluster_info(uri).await {
                Ok(info) => {
                    let ok = is_consistent(&info, self.expected_leader, expected_size);
                    if !ok {
                        debug!(
                            "Peer {} reports leader {:?} and {} peers, expected leader {} and {} peers",
                            uri,
                            info.leader(),
                            info.size(),
                            self.expected_leader,
                            expected_size
                        );
                    }
                    ok
                }
                Err(e) => not_yet(uri, e)?,
            };
            all_consistent &= consistent;
        }
        Ok(all_consistent)
    }
}

/// `GET /` answers with a success status
pub struct PeerOnline {
    client: PeerClient,
    uri: String,
}

impl PeerOnline {
    pub fn new(
        client: &PeerClient,
        uri: &str,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
        }
    }
}

#[async_trait]
impl Condition for PeerOnline {
    fn name(&self) -> String {
        format!("PeerOnline({})", self.uri)
    }

    async fn check(&mut self) -> Result<bool> {
        Ok(self.client.is_online(&self.uri).await)
    }
}

/// Every peer answers `GET /collections`
pub struct AllPeersRespond {
    client: PeerClient,
    uris: Vec<String>,
}

impl AllPeersRespond {
    pub fn new(
        client: &PeerClient,
        uris: &[String],
    ) -> Self {
        Self {
            client: client.clone(),
            uris: uris.to_vec(),
        }
    }
}

#[async_trait]
impl Condition for AllPeersRespond {
    fn name(&self) -> String {
        format!("AllPeersRespond({} peers)", self.uris.len())
    }

    async fn check(&mut self) -> Result<bool> {
        for uri in &self.uris {
            if let Err(e) = self.client.list_collections(uri).await {
                return not_yet(uri, e);
            }
        }
        Ok(true)
    }
}

/// A peer elected a new leader
///
/// Holds once the peer reported the same non-null leader, different from
/// `previous`, on `count` consecutive evaluations.
pub struct LeaderReelected {
    client: PeerClient,
    uri: String,
    previous: Option<u64>,
    count: usize,
    candidate: Option<u64>,
    seen: usize,
}

impl LeaderReelected {
    pub fn new(
        client: &PeerClient,
        uri: &str,
        previous: Option<u64>,
        count: usize,
    ) -> Self {
        Self {
            client: client.clone(),
            uri: uri.to_string(),
            previous,
            count: count.max(1),
            candidate: None,
            seen: 0,
        }
    }

    /// The new leader, once one has been observed
    pub fn elected(&self) -> Option<u64> {
        self.candidate
    }

    /// Records one observation and tells whether the new leader is stable.
    pub fn observe(
        &mut self,
        leader: Option<u64>,
    ) -> bool {
        match leader {
            Some(leader) if Some(leader) != self.previous => {
                if self.candidate == Some(leader) {
                    self.seen += 1;
                } else {
                    self.candidate = Some(leader);
                    self.seen = 1;
                }
            }
            _ => {
                self.candidate = None;
                self.seen = 0;
            }
        }
        self.seen >= self.count
    }
}

#[async_trait]
impl Condition for LeaderReelected {
    fn name(&self) -> String {
        format!(
            "LeaderReelected({}, previous {:?}, {} times)",
            self.uri, self.previous, self.count
        )
    }

    async fn check(&mut self) -> Result<bool> {
        match self.client.leader(&self.uri).await {
            Ok(leader) => Ok(self.observe(leader)),
            Err(e) => not_yet(&self.uri, e),
        }
    }
}
