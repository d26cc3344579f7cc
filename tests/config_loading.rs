// tests/config_loading.rs
// Env-var driven config resolution mutates process state, so these run
// serially.

use serial_test::serial;
use std::io::Write;

use engagement_pacer::config::{AppConfig, ENV_CONFIG_PATH};

#[test]
#[serial]
fn env_path_wins_and_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pacer.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
        data_dir = "custom-state"

        [quota]
        daily_normal = 60

        [pacing]
        conflict_hours = [14]
        "#
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, &path);
    let cfg = AppConfig::load_default().unwrap();
    std::env::remove_var(ENV_CONFIG_PATH);

    assert_eq!(cfg.data_dir, "custom-state");
    assert_eq!(cfg.quota.daily_normal, 60);
    assert_eq!(cfg.quota.daily_max, 80); // untouched default
    assert_eq!(cfg.pacing.conflict_hours, vec![14]);
    cfg.validate().unwrap();
}

#[test]
#[serial]
fn missing_env_path_is_fatal() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    let res = AppConfig::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(res.is_err());
}

#[test]
#[serial]
fn fallback_chain_without_env_loads_something_valid() {
    // Without the env var the loader takes the repo file if present, else
    // built-in defaults; both must validate.
    std::env::remove_var(ENV_CONFIG_PATH);
    let cfg = AppConfig::load_default().unwrap();
    cfg.validate().unwrap();
}
