use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tempfile::TempDir;

// Same mock the unit tests use, so both suites see one registry/node model
#[path = "../../src/test_support.rs"]
#[allow(dead_code)]
mod test_support;

pub use test_support::{MockCluster, NODE_HOST};

/// Mock registry + nodes, plus a scratch dir for the log file and the
/// restart marker.
pub struct TestEnv {
    pub cluster: MockCluster,
    temp_dir: TempDir,
}

impl TestEnv {
    /// Registered node with the given indices.
    pub async fn start(local_index: u64, reference_index: u64) -> Self {
        let cluster = MockCluster::start().await;
        cluster.set_indices(local_index, reference_index);
        Self {
            cluster,
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn marker(&self) -> PathBuf {
        self.dir().join("restarted")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir().join("watchdog.log")
    }

    /// Command-line arguments for a full single-cycle run whose restart
    /// action touches `marker()`.
    pub fn once_args(&self) -> Vec<String> {
        vec![
            "--once".into(),
            "--node-id".into(),
            NODE_HOST.into(),
            "--local-url".into(),
            self.cluster.local_url(),
            "--reference-url".into(),
            self.cluster.reference_url(),
            "--registry-url".into(),
            self.cluster.registry_url(),
            "--restart-command".into(),
            format!("touch {}", self.marker().display()),
            "--fetch-timeout-secs".into(),
            "5".into(),
            "--log-file".into(),
            self.log_path().display().to_string(),
        ]
    }

    pub fn read_log(&self) -> String {
        std::fs::read_to_string(self.log_path()).unwrap_or_default()
    }
}

/// Run the compiled watchdog with `args` and wait for it to exit.
pub async fn run_watchdog(args: &[String]) -> Output {
    run_watchdog_with_env(args, &[]).await
}

/// Like [`run_watchdog`] with extra environment variables set.
pub async fn run_watchdog_with_env(args: &[String], vars: &[(&str, &str)]) -> Output {
    let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_node-watchdog"));
    cmd.args(args)
        .env_remove("NODE_WATCHDOG_CONFIG")
        .env_remove("NODE_WATCHDOG_DRY_RUN")
        .envs(vars.iter().copied())
        .kill_on_drop(true);

    tokio::time::timeout(Duration::from_secs(30), cmd.output())
        .await
        .expect("watchdog did not exit")
        .expect("Failed to run watchdog")
}
