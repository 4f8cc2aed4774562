use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::error;
use tracing::info;

use super::Cluster;
use crate::checks::Convergence;
use crate::client::PeerClient;
use crate::config::HarnessConfig;
use crate::peer::PeerLauncher;
use crate::poll::PollSettings;
use crate::utils::file_io::current_test_name;
use crate::utils::file_io::init_test_log_dir;
use crate::Error;
use crate::LaunchError;
use crate::Result;

const DEFAULT_PEERS: usize = 3;

/// Starts a [`Cluster`]: founder first, joiners once the founder leads,
/// then waits for every peer to agree on leader and membership.
pub struct ClusterBuilder {
    config: HarnessConfig,
    peers: usize,
    port_seed: Option<u16>,
    base_dir: Option<PathBuf>,
    test_name: Option<String>,
    joiner_env: BTreeMap<usize, BTreeMap<String, String>>,
}

impl ClusterBuilder {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            peers: DEFAULT_PEERS,
            port_seed: None,
            base_dir: None,
            test_name: None,
            joiner_env: BTreeMap::new(),
        }
    }

    pub fn peers(
        mut self,
        peers: usize,
    ) -> Self {
        self.peers = peers;
        self
    }

    /// Derive ports from `seed` instead of allocating them
    pub fn port_seed(
        mut self,
        seed: u16,
    ) -> Self {
        self.port_seed = Some(seed);
        self
    }

    /// Keep peer directories under `dir` instead of a temporary directory
    pub fn base_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Name of the log folder; defaults to the running test's name
    pub fn test_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Extra environment for the joiner at `peer_index` (1 is the first joiner)
    pub fn joiner_env(
        mut self,
        peer_index: usize,
        env: BTreeMap<String, String>,
    ) -> Self {
        self.joiner_env.insert(peer_index, env);
        self
    }

    pub async fn start(self) -> Result<Cluster> {
        if self.peers == 0 {
            return Err(Error::Fatal("a cluster needs at least one peer".to_string()));
        }
        let config = self.config.validate()?;

        let test_name = self.test_name.unwrap_or_else(current_test_name);
        let log_dir = init_test_log_dir(&config.peer.log_root, &test_name)?;
        let (base_dir, temp_dir) = match self.base_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir).map_err(|source| LaunchError::WorkingDir {
                    path: dir.clone(),
                    source,
                })?;
                (dir, None)
            }
            None => {
                let temp_dir = tempfile::Builder::new()
                    .prefix(&format!("{test_name}-"))
                    .tempdir()?;
                (temp_dir.path().to_path_buf(), Some(temp_dir))
            }
        };
        info!(
            "starting {} peers for {} in {:?}, logs in {:?}",
            self.peers, test_name, base_dir, log_dir
        );

        let convergence = Convergence::new(
            PeerClient::new(&config.client)?,
            PollSettings::from(&config.poll),
        );
        let launcher = PeerLauncher::new(config.peer, log_dir);

        let mut cluster = Cluster::bootstrap(
            launcher,
            convergence,
            base_dir,
            temp_dir,
            self.port_seed,
        )
        .await?;

        if let Err(e) = join_peers(&mut cluster, self.peers, &self.joiner_env).await {
            error!("cluster for {} failed to converge: {}", test_name, e);
            cluster.shutdown().await;
            return Err(e);
        }
        Ok(cluster)
    }
}

async fn join_peers(
    cluster: &mut Cluster,
    peers: usize,
    joiner_env: &BTreeMap<usize, BTreeMap<String, String>>,
) -> Result<()> {
    let no_env = BTreeMap::new();
    for index in 1..peers {
        cluster.start_peer(None, joiner_env.get(&index).unwrap_or(&no_env))?;
    }

    let uris = cluster.peer_uris();
    cluster
        .convergence()
        .wait_for_uniform_cluster_status(&uris, cluster.leader())
        .await
}
