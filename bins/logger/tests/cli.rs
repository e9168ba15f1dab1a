use assert_cmd::Command;

fn logger() -> Command {
    let mut cmd = Command::cargo_bin("mqtt-logger").unwrap();
    cmd.env_remove("MQTT_LOGGER_CONFIG")
        .env_remove("MQTT_LOGGER_HOST")
        .env_remove("MQTT_LOGGER_PORT")
        .env_remove("MQTT_LOGGER_LOG_DIR");
    cmd
}

#[test]
fn help_lists_connection_flags() {
    let output = logger().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--host", "--port", "--log-dir", "--max-attempts", "--queue-capacity"] {
        assert!(stdout.contains(flag), "missing {flag} in:\n{stdout}");
    }
}

#[test]
fn unreachable_broker_exits_after_attempt_ceiling() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = tmp.path().join("logs");

    let output = logger()
        .env("RUST_LOG", "info")
        .args(["--host", "127.0.0.1", "--port", "1"])
        .args(["--max-attempts", "2"])
        .args(["--backoff-initial-ms", "10", "--backoff-max-ms", "20"])
        .arg("--log-dir")
        .arg(&logs)
        .arg("--config")
        .arg(tmp.path().join("none.toml"))
        .timeout(std::time::Duration::from_secs(30))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("connect attempt failed").count(), 2, "{stderr}");
    assert!(stderr.contains("unreachable after 2 attempts"), "{stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Starting MQTT logger - saving to"), "{stdout}");
    assert!(logs.is_dir());
}

#[test]
fn invalid_qos_is_rejected_before_connecting() {
    let tmp = tempfile::tempdir().unwrap();
    let output = logger()
        .args(["--qos", "3"])
        .arg("--config")
        .arg(tmp.path().join("none.toml"))
        .arg("--log-dir")
        .arg(tmp.path().join("logs"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("qos must be 0, 1 or 2"), "{stderr}");
    assert!(!tmp.path().join("logs").exists());
}

#[test]
fn broken_config_file_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tmp.path().join("logger.toml");
    std::fs::write(&cfg, "port = \"eighteen\"").unwrap();

    let output = logger().arg("--config").arg(&cfg).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("config (parse)"));
}
