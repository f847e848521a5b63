use crate::common::{run_watchdog, run_watchdog_with_env, TestEnv, NODE_HOST};

#[tokio::test]
async fn test_config_file_with_cli_override() {
    let env = TestEnv::start(890, 905).await;

    // File tolerance would restart, the command-line value keeps it synced
    let config_path = env.dir().join("watchdog.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
network = "testnet"
node_id = "{}"
local_url = "{}"
reference_url = "{}"
registry_url = "{}"
tolerance = 10
restart_command = ["touch", "{}"]
"#,
            NODE_HOST,
            env.cluster.local_url(),
            env.cluster.reference_url(),
            env.cluster.registry_url(),
            env.marker().display()
        ),
    )
    .unwrap();

    let args: Vec<String> = vec![
        "--once".into(),
        "--config".into(),
        config_path.display().to_string(),
        "--tolerance".into(),
        "20".into(),
        "--log-file".into(),
        env.log_path().display().to_string(),
    ];
    let output = run_watchdog(&args).await;
    assert!(output.status.success(), "{:?}", output);

    let log = env.read_log();
    assert!(log.contains("network=testnet"), "log:\n{}", log);
    assert!(log.contains("Cycle outcome: Synced"), "log:\n{}", log);
    assert!(log.contains("tolerance=20"), "log:\n{}", log);
    assert!(!env.marker().exists());
}

#[tokio::test]
async fn test_missing_registry_url_fails_at_startup() {
    let env = TestEnv::start(900, 900).await;

    let args: Vec<String> = vec![
        "--once".into(),
        "--node-id".into(),
        NODE_HOST.into(),
        "--local-url".into(),
        env.cluster.local_url(),
        "--reference-url".into(),
        env.cluster.reference_url(),
        "--restart-command".into(),
        "true".into(),
    ];
    let output = run_watchdog(&args).await;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("registry_url"), "stderr:\n{}", stderr);
}

fn write_dry_run_config(env: &TestEnv) -> String {
    let config_path = env.dir().join("watchdog.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
node_id = "{}"
local_url = "{}"
reference_url = "{}"
registry_url = "{}"
restart_command = ["touch", "{}"]
dry_run = true
"#,
            NODE_HOST,
            env.cluster.local_url(),
            env.cluster.reference_url(),
            env.cluster.registry_url(),
            env.marker().display()
        ),
    )
    .unwrap();
    config_path.display().to_string()
}

#[tokio::test]
async fn test_dry_run_in_file_can_be_turned_off() {
    let env = TestEnv::start(890, 905).await;
    let config_path = write_dry_run_config(&env);

    let args: Vec<String> = vec![
        "--once".into(),
        "--config".into(),
        config_path,
        "--dry-run=false".into(),
        "--log-file".into(),
        env.log_path().display().to_string(),
    ];
    let output = run_watchdog(&args).await;
    assert!(output.status.success(), "{:?}", output);

    let log = env.read_log();
    assert!(log.contains("dry_run=false"), "log:\n{}", log);
    assert!(env.marker().exists(), "restart command did not run");
}

#[tokio::test]
async fn test_dry_run_env_false_overrides_file() {
    let env = TestEnv::start(890, 905).await;
    let config_path = write_dry_run_config(&env);

    let args: Vec<String> = vec![
        "--once".into(),
        "--config".into(),
        config_path,
        "--log-file".into(),
        env.log_path().display().to_string(),
    ];
    let output = run_watchdog_with_env(&args, &[("NODE_WATCHDOG_DRY_RUN", "false")]).await;
    assert!(output.status.success(), "{:?}", output);

    let log = env.read_log();
    assert!(log.contains("dry_run=false"), "log:\n{}", log);
    assert!(env.marker().exists(), "restart command did not run");
}
