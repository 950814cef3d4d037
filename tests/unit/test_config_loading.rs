use autoshift::cli::Args;
use autoshift::core::config::{AutoshiftConfig, ConfigLoader, ConfigValidator};
use autoshift::core::types::ErrorCategory;
use autoshift::logging::config::LoggingConfig;
use autoshift::logging::{detect_context, ConsoleOutput, ExecutionContext};
use clap::Parser;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_autoshift_env() {
    for v in &[
        "AUTOSHIFT_LEDGER_DIR",
        "AUTOSHIFT_LEDGER_KEEP_HISTORY",
        "AUTOSHIFT_CONCURRENCY",
        "AUTOSHIFT_MAX_RETRIES",
        "AUTOSHIFT_DRY_RUN",
        "AUTOSHIFT_LOG_DIR",
        "AUTOSHIFT_LOG_LEVEL",
        "CI",
    ] {
        env::remove_var(v);
    }
}

/// Test integration of config loading with environment variables
#[test]
#[serial]
fn test_config_loading_integration() {
    clear_autoshift_env();
    let temp_dir = TempDir::new().unwrap();
    let workspace_path = temp_dir.path();

    let config_content = r#"
[ledger]
dir = "state/ledger"
keep_history = true

[run]
concurrency = 8
max_retries = 1
dry_run = false
"#;
    fs::write(workspace_path.join("autoshift.toml"), config_content).unwrap();

    let config = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(config.ledger.dir, PathBuf::from("state/ledger"));
    assert!(config.ledger.keep_history);
    assert_eq!(config.run.concurrency, Some(8));
    assert_eq!(config.run.max_retries, Some(1));
    assert_eq!(config.run.dry_run, Some(false));
    assert_eq!(
        ConfigLoader::ledger_dir(workspace_path, &config),
        workspace_path.join("state/ledger")
    );

    env::set_var("AUTOSHIFT_LEDGER_DIR", "/var/lib/autoshift");
    env::set_var("AUTOSHIFT_MAX_RETRIES", "4");
    env::set_var("AUTOSHIFT_DRY_RUN", "true");

    let config = ConfigLoader::load_from_workspace(workspace_path).unwrap();
    assert_eq!(
        ConfigLoader::ledger_dir(workspace_path, &config),
        PathBuf::from("/var/lib/autoshift")
    );
    assert_eq!(config.run.concurrency, Some(8));
    assert_eq!(config.run.max_retries, Some(4));
    assert_eq!(config.run.dry_run, Some(true));

    clear_autoshift_env();
}

#[test]
#[serial]
fn test_partial_config_keeps_defaults() {
    clear_autoshift_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("autoshift.toml"), "[run]\nmax_retries = 0\n").unwrap();

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    assert_eq!(config.ledger, AutoshiftConfig::default().ledger);
    assert_eq!(config.run.max_retries, Some(0));
    assert_eq!(config.run.concurrency, None);
    assert!(ConfigValidator::validate(&config).is_ok());
}

#[test]
#[serial]
fn test_unknown_types_are_config_errors() {
    clear_autoshift_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("autoshift.toml"),
        "[run]\nconcurrency = \"lots\"\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert!(err.message.contains("autoshift.toml"));
}

#[test]
#[serial]
fn test_env_zero_concurrency_fails_validation() {
    clear_autoshift_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("AUTOSHIFT_CONCURRENCY", "0");

    let config = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap();
    let err = ConfigValidator::validate(&config).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert!(!err.recovery_suggestions.is_empty());

    clear_autoshift_env();
}

#[test]
fn test_env_var_documentation_lists_every_override() {
    let docs = ConfigLoader::env_var_documentation();
    for var in [
        "AUTOSHIFT_LEDGER_DIR",
        "AUTOSHIFT_LEDGER_KEEP_HISTORY",
        "AUTOSHIFT_CONCURRENCY",
        "AUTOSHIFT_MAX_RETRIES",
        "AUTOSHIFT_DRY_RUN",
    ] {
        assert!(docs.iter().any(|line| line.starts_with(var)), "{} undocumented", var);
    }
}

#[test]
#[serial]
fn test_logging_config_precedence() {
    clear_autoshift_env();
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".autoshift/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("logging.toml"),
        "[logging]\ndefault_level = \"debug\"\nenable_file = false\nconsole_output = \"stdout\"\n",
    )
    .unwrap();

    let config = LoggingConfig::load(Some(temp_dir.path())).unwrap();
    assert_eq!(config.default_level, "debug");
    assert!(!config.enable_file);
    assert_eq!(config.console_output, Some(ConsoleOutput::Stdout));

    env::set_var("AUTOSHIFT_LOG_LEVEL", "autoshift=trace");
    let config = LoggingConfig::load(Some(temp_dir.path())).unwrap();
    assert_eq!(config.default_level, "autoshift=trace");

    clear_autoshift_env();
}

#[test]
#[serial]
fn test_execution_context_detection() {
    clear_autoshift_env();

    let run = Args::parse_from(["autoshift", "run", "schema.yaml"]);
    assert_eq!(detect_context(&run.command), ExecutionContext::LocalDev);

    let quiet = Args::parse_from(["autoshift", "run", "schema.yaml", "--quiet"]);
    assert_eq!(detect_context(&quiet.command), ExecutionContext::Batch);
    assert!(ExecutionContext::Batch.disables_console());

    env::set_var("CI", "true");
    let status = Args::parse_from(["autoshift", "status"]);
    assert_eq!(detect_context(&status.command), ExecutionContext::Batch);

    clear_autoshift_env();
}
