use serial_test::serial;
use std::env;
use std::fs::write;
use std::time::Duration;
use tempfile::NamedTempFile;

use target_crawler::load_config::{load_config, Secrets};
use target_crawler_core::producers::SourceConfig;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_secret_env() {
    for name in [
        "GITHUB_TOKEN",
        "GITHUB_APP_ID",
        "GITHUB_APP_INSTALLATION_ID",
        "GITHUB_APP_PRIVATE_KEY",
        "GITLAB_TOKEN",
        "DOCKERHUB_TOKEN",
        "ORCHESTRATOR_TOKEN",
    ] {
        env::remove_var(name);
    }
}

/// A minimal config gets the documented defaults.
#[tokio::test]
#[serial]
async fn test_load_config_applies_defaults() {
    let file = config_file(
        r#"
run:
  name: nightly
  profile: default-scan
orchestrator:
  api_url: https://kube.example:6443
  namespace: scans
source:
  type: github
  orgs: [acme, "tools, infra"]
  skip_forks: true
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.run.name, "nightly");
    assert_eq!(config.run.interval, Duration::from_secs(60));
    assert_eq!(config.run.pipeline_ttl, Duration::from_secs(168 * 3600));
    assert_eq!(config.run.queue_capacity, 1);
    assert_eq!(config.pagination.page_size, 100);
    assert_eq!(config.pagination.rate_limit_fallback, Duration::from_secs(3600));
    assert_eq!(config.orchestrator.namespace, "scans");
    assert!(config.orchestrator.ca_cert.is_none());
    match &config.source {
        SourceConfig::Github(source) => {
            assert_eq!(source.orgs, vec!["acme", "tools, infra"]);
            assert!(source.skip_forks);
        }
        other => panic!("expected a github source, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_load_config_reads_humantime_overrides() {
    let file = config_file(
        r#"
run:
  name: weekly
  profile: deep
  interval: 90s
  pipeline_ttl: 2days
  downloader_override: custom-git
pagination:
  page_size: 50
  rate_limit_fallback: 30m
orchestrator:
  api_url: https://kube.example
  namespace: scans
source:
  type: dockerhub
  orgs: [acme]
  recent_tag_limit: 3
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.run.interval, Duration::from_secs(90));
    assert_eq!(config.run.pipeline_ttl, Duration::from_secs(2 * 86400));
    assert_eq!(config.run.downloader_override.as_deref(), Some("custom-git"));
    assert_eq!(config.pagination.page_size, 50);
    assert_eq!(config.pagination.rate_limit_fallback, Duration::from_secs(1800));
    assert_eq!(config.source.name(), "dockerhub");
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_unknown_source_type() {
    let file = config_file(
        r#"
run:
  name: nightly
  profile: default-scan
orchestrator:
  api_url: https://kube.example
  namespace: scans
source:
  type: bitbucket
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(
        err.to_string().contains("Failed to parse config YAML"),
        "got: {err}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_rejects_invalid_run_settings() {
    let file = config_file(
        r#"
run:
  name: "  "
  profile: default-scan
orchestrator:
  api_url: https://kube.example
  namespace: scans
source:
  type: static-list
  targets: a
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(
        err.to_string().contains("Invalid configuration"),
        "got: {err}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let file = config_file("run: [unterminated");
    assert!(load_config(file.path()).is_err());
}

#[tokio::test]
#[serial]
async fn test_secrets_come_from_environment() {
    clear_secret_env();
    env::set_var("GITHUB_TOKEN", "ghp_env");
    env::set_var("GITLAB_TOKEN", "  ");
    env::set_var("DOCKERHUB_TOKEN", "dckr_env");

    let token_file = config_file("file-token\n");
    let file = config_file(&format!(
        r#"
run:
  name: nightly
  profile: default-scan
orchestrator:
  api_url: https://kube.example
  namespace: scans
  token_file: "{}"
source:
  type: gitlab
"#,
        token_file.path().display()
    ));

    let config = load_config(file.path()).expect("Config should load");
    let secrets = Secrets::from_env(&config.orchestrator).expect("Secrets should load");

    assert_eq!(secrets.providers.github.token.as_deref(), Some("ghp_env"));
    assert!(secrets.providers.github.app_id.is_none());
    assert!(secrets.providers.gitlab_token.is_none(), "blank values are ignored");
    assert_eq!(secrets.providers.dockerhub_token.as_deref(), Some("dckr_env"));
    assert_eq!(secrets.orchestrator_token.as_deref(), Some("file-token"));

    env::set_var("ORCHESTRATOR_TOKEN", "env-token");
    let secrets = Secrets::from_env(&config.orchestrator).unwrap();
    assert_eq!(secrets.orchestrator_token.as_deref(), Some("env-token"));

    clear_secret_env();
}

#[tokio::test]
#[serial]
async fn test_secrets_error_for_missing_token_file() {
    clear_secret_env();
    let file = config_file(
        r#"
run:
  name: nightly
  profile: default-scan
orchestrator:
  api_url: https://kube.example
  namespace: scans
  token_file: /nonexistent/target-crawler/token
source:
  type: gitlab
"#,
    );

    let config = load_config(file.path()).unwrap();
    let err = match Secrets::from_env(&config.orchestrator) {
        Ok(_) => panic!("expected a missing token file to fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("orchestrator token file"), "got: {err}");
}
