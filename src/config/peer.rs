use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Launch parameters shared by every peer of a cluster
///
/// The environment variable names are the server's knobs; the harness only
/// fills them in, it never interprets them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerConfig {
    /// Server binary to launch
    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Directory copied into every peer working directory; `None` skips the copy
    #[serde(default = "default_config_template")]
    pub config_template: Option<PathBuf>,

    /// Root of the per-test log folders
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,

    /// Host used to build peer URIs
    #[serde(default = "default_host")]
    pub host: String,

    /// Passed to the peer unchanged
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Start peers with a copy of the harness environment
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,

    #[serde(default)]
    pub env: PeerEnvNames,
}

/// Names of the environment variables the server reads at startup
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerEnvNames {
    #[serde(default = "default_cluster_enabled_var")]
    pub cluster_enabled: String,

    #[serde(default = "default_p2p_port_var")]
    pub p2p_port: String,

    #[serde(default = "default_http_port_var")]
    pub http_port: String,

    #[serde(default = "default_grpc_port_var")]
    pub grpc_port: String,

    #[serde(default = "default_log_level_var")]
    pub log_level: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            config_template: default_config_template(),
            log_root: default_log_root(),
            host: default_host(),
            log_level: default_log_level(),
            inherit_env: default_inherit_env(),
            env: PeerEnvNames::default(),
        }
    }
}

impl Default for PeerEnvNames {
    fn default() -> Self {
        Self {
            cluster_enabled: default_cluster_enabled_var(),
            p2p_port: default_p2p_port_var(),
            http_port: default_http_port_var(),
            grpc_port: default_grpc_port_var(),
            log_level: default_log_level_var(),
        }
    }
}

impl PeerConfig {
    /// Validates launch parameters
    /// # Errors
    /// Returns `Error::Config` when a path, host or variable name is empty
    pub fn validate(&self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(invalid("peer.executable cannot be empty".into()));
        }

        if self.log_root.as_os_str().is_empty() {
            return Err(invalid("peer.log_root cannot be empty".into()));
        }

        if self.host.trim().is_empty() {
            return Err(invalid("peer.host cannot be empty".into()));
        }

        if let Some(template) = &self.config_template {
            if template.as_os_str().is_empty() {
                return Err(invalid(
                    "peer.config_template cannot be an empty path (omit it instead)".into(),
                ));
            }
        }

        self.env.validate()
    }
}

impl PeerEnvNames {
    fn validate(&self) -> Result<()> {
        let names = [
            ("cluster_enabled", &self.cluster_enabled),
            ("p2p_port", &self.p2p_port),
            ("http_port", &self.http_port),
            ("grpc_port", &self.grpc_port),
            ("log_level", &self.log_level),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(invalid(format!("peer.env.{field} cannot be empty")));
            }
        }

        let ports = [&self.p2p_port, &self.http_port, &self.grpc_port];
        if ports[0] == ports[1] || ports[0] == ports[2] || ports[1] == ports[2] {
            return Err(invalid(
                "peer.env port variables must be distinct".into(),
            ));
        }
        Ok(())
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from("target/debug/qdrant")
}
fn default_config_template() -> Option<PathBuf> {
    Some(PathBuf::from("config"))
}
fn default_log_root() -> PathBuf {
    PathBuf::from("consensus_test_logs")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_log_level() -> String {
    "DEBUG,raft::raft=info".to_string()
}
fn default_inherit_env() -> bool {
    true
}
fn default_cluster_enabled_var() -> String {
    "QDRANT__CLUSTER__ENABLED".to_string()
}
fn default_p2p_port_var() -> String {
    "QDRANT__CLUSTER__P2P__PORT".to_string()
}
fn default_http_port_var() -> String {
    "QDRANT__SERVICE__HTTP_PORT".to_string()
}
fn default_grpc_port_var() -> String {
    "QDRANT__SERVICE__GRPC_PORT".to_string()
}
fn default_log_level_var() -> String {
    "QDRANT__LOG_LEVEL".to_string()
}
