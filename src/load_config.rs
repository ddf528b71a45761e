/// `load_config` module: reads the static YAML run configuration and injects
/// provider and orchestrator secrets from the environment.
///
/// This is the only place where the user-supplied YAML is parsed. Secrets are
/// never read from the file; they come from environment variables (optionally
/// loaded from a `.env` file by `main`).
///
/// # Errors
/// Every failure is an `anyhow::Error` with the offending path or variable in
/// its message, surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use target_crawler_core::auth::GitHubCredentials;
use target_crawler_core::config::{PaginationSettings, RunConfig};
use target_crawler_core::producers::registry::ProviderCredentials;
use target_crawler_core::producers::SourceConfig;
use tracing::{debug, error, info};

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const GITHUB_APP_ID_ENV: &str = "GITHUB_APP_ID";
pub const GITHUB_APP_INSTALLATION_ID_ENV: &str = "GITHUB_APP_INSTALLATION_ID";
pub const GITHUB_APP_PRIVATE_KEY_ENV: &str = "GITHUB_APP_PRIVATE_KEY";
pub const GITLAB_TOKEN_ENV: &str = "GITLAB_TOKEN";
pub const DOCKERHUB_TOKEN_ENV: &str = "DOCKERHUB_TOKEN";
pub const ORCHESTRATOR_TOKEN_ENV: &str = "ORCHESTRATOR_TOKEN";

/// Service-account token mounted into every pod.
pub const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub pagination: PaginationSettings,
    pub orchestrator: OrchestratorSettings,
    pub source: SourceConfig,
}

/// Where pipelines are created.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    pub api_url: String,
    pub namespace: String,
    /// Extra PEM root certificate for the API server.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Bearer token file used when `ORCHESTRATOR_TOKEN` is unset.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// Secrets gathered from the environment.
pub struct Secrets {
    pub providers: ProviderCredentials,
    pub orchestrator_token: Option<String>,
}

impl Secrets {
    pub fn from_env(orchestrator: &OrchestratorSettings) -> Result<Self> {
        let providers = ProviderCredentials {
            github: GitHubCredentials {
                token: env_secret(GITHUB_TOKEN_ENV),
                app_id: env_secret(GITHUB_APP_ID_ENV),
                installation_id: env_secret(GITHUB_APP_INSTALLATION_ID_ENV),
                private_key: env_secret(GITHUB_APP_PRIVATE_KEY_ENV),
            },
            gitlab_token: env_secret(GITLAB_TOKEN_ENV),
            dockerhub_token: env_secret(DOCKERHUB_TOKEN_ENV),
        };
        let orchestrator_token = match env_secret(ORCHESTRATOR_TOKEN_ENV) {
            Some(token) => Some(token),
            None => read_token_file(orchestrator)?,
        };
        info!(
            github_token = providers.github.token.is_some(),
            github_app = providers.github.app_id.is_some(),
            gitlab_token = providers.gitlab_token.is_some(),
            dockerhub_token = providers.dockerhub_token.is_some(),
            orchestrator_token = orchestrator_token.is_some(),
            "Loaded secrets from environment"
        );
        Ok(Self {
            providers,
            orchestrator_token,
        })
    }
}

fn env_secret(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_token_file(orchestrator: &OrchestratorSettings) -> Result<Option<String>> {
    let (path, explicit) = match &orchestrator.token_file {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(IN_CLUSTER_TOKEN_PATH), false),
    };
    if !explicit && !path.exists() {
        debug!("no orchestrator token configured, submitting unauthenticated");
        return Ok(None);
    }
    let token = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read orchestrator token file {:?}", path))?;
    Ok(Some(token.trim().to_string()).filter(|t| !t.is_empty()))
}

/// Loads and validates a YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config
        .run
        .validate(&config.pagination)
        .with_context(|| format!("Invalid configuration in {:?}", path_ref))?;
    config.run.trace_loaded();
    info!(crawler = config.source.name(), namespace = %config.orchestrator.namespace, "Selected crawler");

    Ok(config)
}
