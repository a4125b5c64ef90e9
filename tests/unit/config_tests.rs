use restorepoint::config::{GlobalConfig, STATE_DIR_ENV};
use restorepoint::AppError;
use serial_test::serial;

fn minimal_toml(workspace: &str) -> String {
    format!("workspace_root = '{workspace}'\n")
}

fn full_toml(workspace: &str) -> String {
    format!(
        r#"
workspace_root = '{workspace}'
state_dir = '{workspace}/state'

[limits]
max_snapshot_bytes = 2048
compression_threshold_bytes = 1024
max_import_bytes = 4096
file_read_timeout_seconds = 5
max_auto_saves = 3

[auto_save]
enabled = false
interval_minutes = 10
change_threshold = 8
change_cooldown_seconds = 60

[recovery]
recent_auto_save_seconds = 120
candidate_freshness_seconds = 15
emergency_max_age_seconds = 600

[workspace]
chats_file = "history.json"
settings_file = "prefs.json"
ignore = ["dist"]
"#
    )
}

#[test]
#[serial]
fn minimal_config_applies_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(&temp.path().display().to_string()))
        .expect("valid config");

    assert_eq!(config.limits.max_snapshot_bytes, 100 * 1024 * 1024);
    assert_eq!(config.limits.compression_threshold_bytes, 100 * 1024);
    assert_eq!(config.limits.max_import_bytes, 50 * 1024 * 1024);
    assert_eq!(config.limits.max_auto_saves, 5);
    assert_eq!(config.limits.file_read_timeout().as_secs(), 30);
    assert!(config.auto_save.enabled);
    assert_eq!(config.auto_save.interval_minutes, 5);
    assert_eq!(config.auto_save.change_threshold, 5);
    assert_eq!(config.auto_save.change_cooldown_seconds, 120);
    assert_eq!(config.recovery.recent_auto_save_seconds, 300);
    assert_eq!(config.recovery.candidate_freshness_seconds, 30);
    assert_eq!(config.recovery.emergency_max_age_seconds, 3600);

    let root = temp.path().canonicalize().expect("canonical");
    assert_eq!(config.workspace_root, root);
    assert_eq!(config.state_dir(), root.join(".restorepoint"));
    assert_eq!(config.chats_path(), root.join(".restorepoint/chats.json"));
}

#[test]
#[serial]
fn full_config_parses_every_section() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = temp.path().display().to_string();
    let config = GlobalConfig::from_toml_str(&full_toml(&workspace)).expect("valid config");

    assert_eq!(config.limits.max_snapshot_bytes, 2048);
    assert_eq!(config.limits.max_auto_saves, 3);
    assert!(!config.auto_save.enabled);
    assert_eq!(config.auto_save.interval_minutes, 10);
    assert_eq!(config.recovery.emergency_max_age_seconds, 600);
    assert_eq!(config.workspace.ignore, vec!["dist".to_owned()]);
    assert!(config.settings_path().ends_with("state/prefs.json"));
}

#[test]
#[serial]
fn zero_interval_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "{}\n[auto_save]\ninterval_minutes = 0\n",
        minimal_toml(&temp.path().display().to_string())
    );

    let result = GlobalConfig::from_toml_str(&raw);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial]
fn threshold_at_or_above_cap_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "{}\n[limits]\nmax_snapshot_bytes = 100\ncompression_threshold_bytes = 100\n",
        minimal_toml(&temp.path().display().to_string())
    );

    let result = GlobalConfig::from_toml_str(&raw);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial]
fn missing_workspace_is_rejected() {
    let result = GlobalConfig::for_workspace("/definitely/not/a/real/workspace");

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial]
fn malformed_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("workspace_root = ");

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial]
fn state_dir_env_overrides_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let override_dir = temp.path().join("elsewhere");
    std::env::set_var(STATE_DIR_ENV, &override_dir);

    let result = GlobalConfig::for_workspace(temp.path());
    std::env::remove_var(STATE_DIR_ENV);

    let config = result.expect("valid config");
    assert_eq!(config.state_dir(), override_dir);
}

#[test]
#[serial]
fn load_from_missing_file_fails() {
    let temp = tempfile::tempdir().expect("tempdir");

    let result = GlobalConfig::load_from_path(temp.path().join("restorepoint.toml"));

    assert!(matches!(result, Err(AppError::Config(_))));
}
