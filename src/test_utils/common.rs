use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::poll::condition_fn;
use crate::poll::wait_for;
use crate::poll::PollSettings;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Variables echoed by the fake peer executable at startup
pub const ECHOED_VARS: [&str; 7] = [
    "QDRANT__CLUSTER__ENABLED",
    "QDRANT__CLUSTER__P2P__PORT",
    "QDRANT__SERVICE__HTTP_PORT",
    "QDRANT__SERVICE__GRPC_PORT",
    "QDRANT__LOG_LEVEL",
    "CARGO_PKG_NAME",
    "EXTRA_FLAG",
];

/// Writes a shell script standing in for the server binary.
///
/// It prints its arguments, working directory and [`ECHOED_VARS`] to stdout,
/// a marker to stderr, then sleeps until killed.
pub fn write_fake_executable(dir: &Path) -> PathBuf {
    let mut script = String::from("#!/bin/sh\necho \"args: $*\"\necho \"cwd: $(pwd)\"\n");
    for var in ECHOED_VARS {
        script.push_str(&format!("echo \"{var}=${{{var}:-unset}}\"\n"));
    }
    script.push_str("echo \"peer started\" >&2\nexec sleep 300\n");
    write_script(dir, "fake-peer", &script)
}

/// Writes a script that exits right away with status 3.
pub fn write_exiting_executable(dir: &Path) -> PathBuf {
    write_script(dir, "exiting-peer", "#!/bin/sh\necho \"bye\" >&2\nexit 3\n")
}

fn write_script(
    dir: &Path,
    name: &str,
    body: &str,
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

pub fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Waits until the log file contains `needle` and returns the full content.
pub async fn wait_for_log_line(
    path: &Path,
    needle: &str,
) -> String {
    let mut condition = condition_fn(format!("{path:?} contains {needle:?}"), || {
        let path = path.to_path_buf();
        let needle = needle.to_string();
        async move { Ok(read_log(&path).contains(&needle)) }
    });
    let settings = PollSettings::new(Duration::from_secs(10), Duration::from_millis(20));
    wait_for(&mut condition, settings)
        .await
        .unwrap_or_else(|e| panic!("{e}; log so far: {}", read_log(path)));
    read_log(path)
}
