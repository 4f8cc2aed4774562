//! Launch configuration of cluster peers.
//!
//! The founder bootstraps a single-node cluster on its own; every joiner is
//! pointed at the founder's internal consensus URI.


use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;

use crate::config::PeerConfig;
use crate::constants::ARG_BOOTSTRAP;
use crate::constants::ARG_URI;
use crate::process::ProcessGroup;
use crate::process::SpawnSpec;
use crate::utils::net::peer_uri;
use crate::utils::net::PeerPorts;
use crate::Result;

/// One running peer of a cluster
///
/// The process itself is owned by the [`ProcessGroup`] that spawned it;
/// `pid` is the key into that group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Client-facing HTTP endpoint, e.g. `http://127.0.0.1:6333`
    pub api_uri: String,
    /// Internal consensus endpoint other peers bootstrap from
    pub p2p_uri: String,
    pub ports: PeerPorts,
    pub dir: PathBuf,
    pub log_path: PathBuf,
    pub pid: u32,
}

/// Builds arguments and environment for peers and hands them to a [`ProcessGroup`]
#[derive(Debug, Clone)]
pub struct PeerLauncher {
    config: PeerConfig,
    log_dir: PathBuf,
}

impl PeerLauncher {
    pub fn new(
        config: PeerConfig,
        log_dir: PathBuf,
    ) -> Self {
        Self { config, log_dir }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Folder receiving the log files of this launcher's peers
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Environment of a peer: clustering on, its three ports, the log level,
    /// then `extra_env` on top.
    pub fn peer_env(
        &self,
        ports: &PeerPorts,
        extra_env: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let names = &self.config.env;
        let mut env = BTreeMap::from([
            (names.cluster_enabled.clone(), "true".to_string()),
            (names.p2p_port.clone(), ports.p2p.to_string()),
            (names.http_port.clone(), ports.http.to_string()),
            (names.grpc_port.clone(), ports.grpc.to_string()),
            (names.log_level.clone(), self.config.log_level.clone()),
        ]);
        env.extend(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Starts the self-bootstrapping peer with only `--uri <p2p_uri>`.
    pub fn start_founder(
        &self,
        group: &mut ProcessGroup,
        peer_dir: &Path,
        log_name: &str,
        ports: PeerPorts,
    ) -> Result<Peer> {
        let p2p_uri = peer_uri(&self.config.host, ports.p2p);
        let args = vec![ARG_URI.to_string(), p2p_uri.clone()];
        let peer = self.launch(group, peer_dir, log_name, ports, p2p_uri, args, &BTreeMap::new())?;
        info!(api_uri = %peer.api_uri, "founder started ({})", ports);
        Ok(peer)
    }

    /// Starts a peer that joins through `bootstrap_uri`.
    pub fn start_joiner(
        &self,
        group: &mut ProcessGroup,
        peer_dir: &Path,
        log_name: &str,
        bootstrap_uri: &str,
        ports: PeerPorts,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Peer> {
        let p2p_uri = peer_uri(&self.config.host, ports.p2p);
        let args = vec![
            ARG_BOOTSTRAP.to_string(),
            bootstrap_uri.to_string(),
            ARG_URI.to_string(),
            p2p_uri.clone(),
        ];
        let peer = self.launch(group, peer_dir, log_name, ports, p2p_uri, args, extra_env)?;
        info!(api_uri = %peer.api_uri, bootstrap_uri, "joiner started ({})", ports);
        Ok(peer)
    }

    #[allow(clippy::too_many_arguments)]
    fn launch(
        &self,
        group: &mut ProcessGroup,
        peer_dir: &Path,
        log_name: &str,
        ports: PeerPorts,
        p2p_uri: String,
        args: Vec<String>,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Peer> {
        let log_path = self.log_dir.join(log_name);
        let pid = group.spawn(SpawnSpec {
            executable: self.config.executable.clone(),
            args,
            env: self.peer_env(&ports, extra_env),
            inherit_env: self.config.inherit_env,
            working_dir: peer_dir.to_path_buf(),
            log_path: log_path.clone(),
        })?;

        Ok(Peer {
            api_uri: peer_uri(&self.config.host, ports.http),
            p2p_uri,
            ports,
            dir: peer_dir.to_path_buf(),
            log_path,
            pid,
        })
    }
}
