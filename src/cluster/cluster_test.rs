use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serial_test::serial;

use super::*;
use crate::checks::ClusterSize;
use crate::config::HarnessConfig;
use crate::config::PollConfig;
use crate::poll::wait_for;
use crate::test_utils::enable_logger;
use crate::test_utils::wait_for_log_line;
use crate::test_utils::write_fake_executable;
use crate::test_utils::FakePeer;
use crate::test_utils::FakePeerState;
use crate::test_utils::SharedMembership;
use crate::utils::net::derive_ports;

// Fixed port seeds, one per test
const THREE_PEERS_SEED: u16 = 42000;
const NO_LEADER_SEED: u16 = 42400;
const NO_JOIN_SEED: u16 = 42600;
const RESTART_SEED: u16 = 42800;
const BASE_DIR_SEED: u16 = 43000;

fn harness_config(dir: &Path) -> HarnessConfig {
    let template = dir.join("config");
    std::fs::create_dir_all(&template).unwrap();
    std::fs::write(template.join("config.yaml"), "log_level: INFO\n").unwrap();

    let mut config = HarnessConfig::default();
    config.peer.executable = write_fake_executable(dir);
    config.peer.log_root = dir.join("logs");
    config.peer.config_template = Some(template);
    config.poll = PollConfig {
        timeout_ms: 5_000,
        interval_ms: 50,
    };
    config
}

/// Fake HTTP endpoints on the ports the peers of `seed` will be given
async fn fake_peers(
    seed: u16,
    count: usize,
    leader: Option<u64>,
    membership: &SharedMembership,
) -> Vec<FakePeer> {
    let mut peers = vec![];
    for index in 0..count {
        let mut state = FakePeerState::new(index as u64 + 1).with_membership(membership.clone());
        state.leader = leader;
        let http = derive_ports(seed, index).unwrap().http;
        peers.push(FakePeer::start_on(http, state).await);
    }
    peers
}

fn membership() -> SharedMembership {
    Arc::new(Mutex::new(BTreeSet::new()))
}

#[tokio::test]
#[serial]
async fn test_start_three_peer_cluster() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let members = membership();
    let _fakes = fake_peers(THREE_PEERS_SEED, 3, Some(1), &members).await;

    let mut cluster = ClusterBuilder::new(harness_config(dir.path()))
        .peers(3)
        .port_seed(THREE_PEERS_SEED)
        .joiner_env(2, BTreeMap::from([("EXTRA_FLAG".to_string(), "on".to_string())]))
        .start()
        .await
        .unwrap();

    assert_eq!(cluster.leader(), 1);
    assert_eq!(cluster.peers().len(), 3);
    assert_eq!(
        cluster.peer_uris(),
        vec![
            "http://127.0.0.1:42002".to_string(),
            "http://127.0.0.1:42102".to_string(),
            "http://127.0.0.1:42202".to_string(),
        ]
    );
    assert_eq!(cluster.bootstrap_uri(), "http://127.0.0.1:42000");
    assert_eq!(cluster.processes().len(), 3);
    assert!(cluster.owns_base_dir());
    assert_eq!(members.lock().len(), 3);

    let log_dir = dir.path().join("logs/test_start_three_peer_cluster");
    assert_eq!(cluster.log_dir(), log_dir.as_path());

    let founder_log = wait_for_log_line(&log_dir.join("peer_0_0.log"), "peer started").await;
    assert!(founder_log.contains("args: --uri http://127.0.0.1:42000\n"));
    assert!(founder_log.contains("EXTRA_FLAG=unset"));

    let joiner_log = wait_for_log_line(&log_dir.join("peer_0_1.log"), "peer started").await;
    assert!(joiner_log.contains("args: --bootstrap http://127.0.0.1:42000 --uri http://127.0.0.1:42100\n"));
    assert!(joiner_log.contains("QDRANT__SERVICE__HTTP_PORT=42102"));

    let last_log = wait_for_log_line(&log_dir.join("peer_0_2.log"), "peer started").await;
    assert!(last_log.contains("EXTRA_FLAG=on"));

    for (i, peer) in cluster.peers().iter().enumerate() {
        assert_eq!(peer.dir, cluster.base_dir().join(format!("peer{i}")));
        assert!(peer.dir.join("config/config.yaml").exists());
    }

    // Killing a follower leaves the remaining peers on the same membership
    let killed = cluster.kill_peer(2).await.unwrap();
    assert_eq!(killed.api_uri, "http://127.0.0.1:42202");
    assert_eq!(cluster.processes().len(), 2);
    for uri in cluster.peer_uris() {
        let mut size = ClusterSize::new(cluster.client(), &uri, 3);
        wait_for(&mut size, cluster.convergence().poll_settings()).await.unwrap();
        assert_eq!(cluster.client().leader(&uri).await.unwrap(), Some(1));
    }

    cluster.shutdown().await;
    assert!(cluster.processes().is_empty());
    assert!(cluster.peers().is_empty());
    cluster.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_joiners_wait_for_founder_leadership() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let members = membership();
    let _fakes = fake_peers(NO_LEADER_SEED, 3, None, &members).await;
    let mut config = harness_config(dir.path());
    config.poll = PollConfig {
        timeout_ms: 300,
        interval_ms: 50,
    };

    let e = ClusterBuilder::new(config)
        .port_seed(NO_LEADER_SEED)
        .test_name("no_leader")
        .start()
        .await
        .err()
        .unwrap();

    match e {
        Error::ConvergenceTimeout { condition, .. } => {
            assert!(condition.starts_with("LeaderDefined("), "{condition}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let log_dir = dir.path().join("logs/no_leader");
    assert!(log_dir.join("peer_0_0.log").exists());
    assert!(!log_dir.join("peer_0_1.log").exists());
}

#[tokio::test]
#[serial]
async fn test_start_fails_when_joiners_never_converge() {
    let dir = tempfile::tempdir().unwrap();
    let members = membership();
    // Only the founder answers
    let _fakes = fake_peers(NO_JOIN_SEED, 1, Some(1), &members).await;
    let mut config = harness_config(dir.path());
    config.poll = PollConfig {
        timeout_ms: 300,
        interval_ms: 50,
    };

    let e = ClusterBuilder::new(config)
        .peers(2)
        .port_seed(NO_JOIN_SEED)
        .test_name("no_join")
        .start()
        .await
        .err()
        .unwrap();

    assert!(e.is_timeout());
    assert!(dir.path().join("logs/no_join/peer_0_1.log").exists());
}

#[tokio::test]
#[serial]
async fn test_missing_executable_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = harness_config(dir.path());
    config.peer.executable = dir.path().join("no-such-server");

    let e = ClusterBuilder::new(config).test_name("missing").start().await.err().unwrap();

    assert!(matches!(
        e,
        Error::Launch(crate::LaunchError::ExecutableNotFound(_))
    ));
}

#[tokio::test]
async fn test_zero_peers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let e = ClusterBuilder::new(harness_config(dir.path()))
        .peers(0)
        .start()
        .await
        .err()
        .unwrap();
    assert!(matches!(e, Error::Fatal(_)));
}

#[tokio::test]
#[serial]
async fn test_start_peer_and_restart_founder() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let members = membership();
    let _fakes = fake_peers(RESTART_SEED, 1, Some(1), &members).await;

    let mut cluster = ClusterBuilder::new(harness_config(dir.path()))
        .peers(1)
        .port_seed(RESTART_SEED)
        .test_name("restart")
        .start()
        .await
        .unwrap();
    let log_dir = dir.path().join("logs/restart");

    let extra = BTreeMap::from([("EXTRA_FLAG".to_string(), "late".to_string())]);
    let joiner = cluster.start_peer(Some(RESTART_SEED + 150), &extra).unwrap();
    assert_eq!(joiner.api_uri, "http://127.0.0.1:42952");
    assert_eq!(joiner.dir, cluster.base_dir().join("peer1"));
    let log = wait_for_log_line(&log_dir.join("peer_0_1.log"), "peer started").await;
    assert!(log.contains("--bootstrap http://127.0.0.1:42800 --uri http://127.0.0.1:42950"));
    assert!(log.contains("EXTRA_FLAG=late"));

    // The founder cannot be restarted while it runs
    assert!(cluster.restart_founder().is_err());

    let founder = cluster.kill_peer(0).await.unwrap();
    assert_eq!(cluster.peers().len(), 1);
    let restarted = cluster.restart_founder().unwrap();
    assert_eq!(restarted.ports, founder.ports);
    assert_eq!(restarted.dir, founder.dir);
    assert_ne!(restarted.pid, founder.pid);
    assert_eq!(cluster.peer(0).unwrap().api_uri, founder.api_uri);
    let log = wait_for_log_line(&log_dir.join("peer_0_2.log"), "peer started").await;
    assert!(log.contains("args: --uri http://127.0.0.1:42800\n"));

    // A running joiner keeps its place
    let running = cluster.peer(1).unwrap().clone();
    assert!(matches!(
        cluster.restart_peer(&running, &BTreeMap::new()),
        Err(Error::Fatal(_))
    ));
    assert_eq!(cluster.peers().len(), 2);
    assert_eq!(cluster.processes().len(), 2);
    assert!(cluster.processes().is_running(running.pid));

    let joiner = cluster.kill_last_peer().await.unwrap();
    let rejoined = cluster.restart_peer(&joiner, &BTreeMap::new()).unwrap();
    assert_eq!(rejoined.ports, joiner.ports);
    assert_eq!(cluster.peers().len(), 2);
    let log = wait_for_log_line(&log_dir.join("peer_0_3.log"), "peer started").await;
    assert!(log.contains("EXTRA_FLAG=unset"));

    cluster.kill_last_peer().await.unwrap();
    cluster.kill_last_peer().await.unwrap();
    assert!(cluster.kill_last_peer().await.is_err());
    assert!(cluster.kill_peer(0).await.is_err());
}

#[tokio::test]
#[serial]
async fn test_base_dir_is_kept_and_temp_dir_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let members = membership();
    let _fakes = fake_peers(BASE_DIR_SEED, 1, Some(1), &members).await;
    let base = dir.path().join("peers");

    let cluster = ClusterBuilder::new(harness_config(dir.path()))
        .peers(1)
        .port_seed(BASE_DIR_SEED)
        .base_dir(&base)
        .test_name("kept")
        .start()
        .await
        .unwrap();
    assert!(!cluster.owns_base_dir());
    assert_eq!(cluster.founder().dir, base.join("peer0"));
    drop(cluster);
    assert!(base.join("peer0/config/config.yaml").exists());

    let cluster = ClusterBuilder::new(harness_config(dir.path()))
        .peers(1)
        .port_seed(BASE_DIR_SEED)
        .test_name("temporary")
        .start()
        .await
        .unwrap();
    let temp_base = cluster.base_dir().to_path_buf();
    assert!(temp_base.join("peer0").is_dir());
    drop(cluster);
    assert!(!temp_base.exists());
}
