//! One test's cluster: peers, their processes, directories and log folder.
//!
//! ```ignore
//! let config = HarnessConfig::new()?.validate()?;
//! let mut cluster = ClusterBuilder::new(config).peers(3).port_seed(6000).start().await?;
//! cluster.convergence().wait_for_uniform_collection_existence("c", &cluster.peer_uris()).await?;
//! cluster.shutdown().await;
//! ```

mod builder;
pub use builder::*;

#[cfg(test)]
mod cluster_test;

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::info;
use tracing::warn;

use crate::checks::Convergence;
use crate::client::PeerClient;
use crate::constants::FOUNDER_INDEX;
use crate::peer::Peer;
use crate::peer::PeerLauncher;
use crate::process::ProcessGroup;
use crate::utils::file_io::make_peer_dir;
use crate::utils::net::PeerPorts;
use crate::Error;
use crate::Result;

/// Log file of the `launch`-th peer launch of a test
pub fn log_file_name(launch: usize) -> String {
    format!("peer_0_{launch}.log")
}

/// Peers of one test, in join order
///
/// Dropping the cluster kills every process that is still running and
/// removes the temporary base directory, if one was created.
pub struct Cluster {
    peers: Vec<Peer>,
    founder: Peer,
    leader: u64,
    // Declared before `temp_dir`: processes are signalled before their
    // directories are removed.
    processes: ProcessGroup,
    launcher: PeerLauncher,
    convergence: Convergence,
    base_dir: PathBuf,
    temp_dir: Option<TempDir>,
    port_seed: Option<u16>,
    next_peer_dir: usize,
    next_launch: usize,
}

impl Cluster {
    /// Launches the founder and waits until it leads a single-node cluster.
    pub(crate) async fn bootstrap(
        launcher: PeerLauncher,
        convergence: Convergence,
        base_dir: PathBuf,
        temp_dir: Option<TempDir>,
        port_seed: Option<u16>,
    ) -> Result<Self> {
        let mut processes = ProcessGroup::new();
        let founder_dir = make_peer_dir(
            &base_dir,
            FOUNDER_INDEX,
            launcher.config().config_template.as_deref(),
        )?;
        let ports = PeerPorts::for_peer(port_seed, FOUNDER_INDEX)?;
        let founder = launcher.start_founder(
            &mut processes,
            &founder_dir,
            &log_file_name(FOUNDER_INDEX),
            ports,
        )?;

        let leader = match convergence.wait_peer_added(&founder.api_uri, 1).await {
            Ok(leader) => leader,
            Err(e) => {
                processes.kill_all().await;
                return Err(e);
            }
        };
        info!("founder {} leads with id {}", founder.api_uri, leader);

        Ok(Self {
            peers: vec![founder.clone()],
            founder,
            leader,
            processes,
            launcher,
            convergence,
            base_dir,
            temp_dir,
            port_seed,
            next_peer_dir: FOUNDER_INDEX + 1,
            next_launch: FOUNDER_INDEX + 1,
        })
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(
        &self,
        index: usize,
    ) -> Option<&Peer> {
        self.peers.get(index)
    }

    /// API URIs of the live peers, in join order
    pub fn peer_uris(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.api_uri.clone()).collect()
    }

    pub fn founder(&self) -> &Peer {
        &self.founder
    }

    /// Internal URI every joiner bootstraps from
    pub fn bootstrap_uri(&self) -> &str {
        &self.founder.p2p_uri
    }

    /// Leader id reported by the founder at bootstrap
    pub fn leader(&self) -> u64 {
        self.leader
    }

    pub fn convergence(&self) -> &Convergence {
        &self.convergence
    }

    pub fn client(&self) -> &PeerClient {
        self.convergence.client()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn log_dir(&self) -> &Path {
        self.launcher.log_dir()
    }

    /// True while a temporary base directory is owned by this cluster
    pub fn owns_base_dir(&self) -> bool {
        self.temp_dir.is_some()
    }

    pub fn processes(&mut self) -> &mut ProcessGroup {
        &mut self.processes
    }

    /// Launches a new joiner in a fresh `peer{n}` directory.
    ///
    /// `port_base` pins its ports to `base`, `base + 1`, `base + 2`; otherwise
    /// they follow the port seed, or are allocated when there is none.
    /// Does not wait for the peer to join.
    pub fn start_peer(
        &mut self,
        port_base: Option<u16>,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Peer> {
        let number = self.next_peer_dir;
        let ports = match port_base {
            Some(base) => PeerPorts::from_base(base)?,
            None => PeerPorts::for_peer(self.port_seed, number)?,
        };
        let peer_dir = make_peer_dir(
            &self.base_dir,
            number,
            self.launcher.config().config_template.as_deref(),
        )?;
        self.next_peer_dir += 1;
        self.launch_joiner(&peer_dir, ports, extra_env)
    }

    /// Relaunches a killed joiner with its previous directory and ports.
    /// Fails if the peer's process is still running.
    pub fn restart_peer(
        &mut self,
        peer: &Peer,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Peer> {
        if self.processes.is_running(peer.pid) {
            return Err(Error::Fatal(format!("peer {} is still running", peer.api_uri)));
        }
        self.peers.retain(|p| p.api_uri != peer.api_uri);
        self.launch_joiner(&peer.dir, peer.ports, extra_env)
    }

    /// Relaunches the founder with its previous directory and ports,
    /// without a bootstrap URI. Does not wait for it to come back.
    pub fn restart_founder(&mut self) -> Result<Peer> {
        if self.processes.is_running(self.founder.pid) {
            return Err(Error::Fatal(format!(
                "founder {} is still running",
                self.founder.api_uri
            )));
        }
        let log_name = self.next_log_name();
        let founder = self.launcher.start_founder(
            &mut self.processes,
            &self.founder.dir,
            &log_name,
            self.founder.ports,
        )?;
        self.peers.retain(|p| p.api_uri != founder.api_uri);
        self.founder = founder.clone();
        self.peers.insert(0, founder.clone());
        Ok(founder)
    }

    /// Kills the peer at `index` (join order) and returns it.
    pub async fn kill_peer(
        &mut self,
        index: usize,
    ) -> Result<Peer> {
        if index >= self.peers.len() {
            return Err(Error::Fatal(format!(
                "no peer at index {index}, cluster has {} peers",
                self.peers.len()
            )));
        }
        let peer = self.peers.remove(index);
        if !self.processes.kill(peer.pid).await {
            warn!("peer {} (pid {}) was not running", peer.api_uri, peer.pid);
        }
        info!("killed peer {} ({})", peer.api_uri, peer.pid);
        Ok(peer)
    }

    /// Kills the most recently joined peer.
    pub async fn kill_last_peer(&mut self) -> Result<Peer> {
        match self.peers.len() {
            0 => Err(Error::Fatal("cluster has no peers left".to_string())),
            n => self.kill_peer(n - 1).await,
        }
    }

    /// Kills every peer. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.peers.clear();
        self.processes.kill_all().await;
    }

    fn launch_joiner(
        &mut self,
        peer_dir: &Path,
        ports: PeerPorts,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Peer> {
        let log_name = self.next_log_name();
        let bootstrap_uri = self.founder.p2p_uri.clone();
        let peer = self.launcher.start_joiner(
            &mut self.processes,
            peer_dir,
            &log_name,
            &bootstrap_uri,
            ports,
            extra_env,
        )?;
        self.peers.push(peer.clone());
        Ok(peer)
    }

    fn next_log_name(&mut self) -> String {
        let name = log_file_name(self.next_launch);
        self.next_launch += 1;
        name
    }
}
