#![doc = "Job submission for the CLI: creates one Pipeline resource per dispatched target."]
//
//! # Pipeline client
//!
//! Implements [`JobCreator`] against the orchestration API. Each job becomes a
//! `Pipeline` resource POSTed to
//! `{api_url}/apis/ocular.crashoverride.run/v1beta1/namespaces/{namespace}/pipelines`,
//! named by the server from `search-{run}-`. The server-assigned name is the
//! returned [`JobHandle`].

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use target_crawler_core::clients::USER_AGENT;
use target_crawler_core::contract::{JobCreator, JobHandle, JobRequest};
use target_crawler_core::error::JobError;
use tracing::debug;

use crate::load_config::OrchestratorSettings;

pub const API_GROUP: &str = "ocular.crashoverride.run";
pub const API_VERSION: &str = "v1beta1";

pub const SEARCH_LABEL: &str = "ocular.crashoverride.run/search";
pub const CRAWLER_LABEL: &str = "ocular.crashoverride.run/crawler";
pub const RUN_ID_LABEL: &str = "ocular.crashoverride.run/run-id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineManifest {
    pub api_version: String,
    pub kind: &'static str,
    pub metadata: ManifestMetadata,
    pub spec: PipelineSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub generate_name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub profile_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_ref: Option<String>,
    pub ttl_seconds_after_finished: u64,
    pub target: PipelineTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_service_account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_service_account_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PipelineTarget {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PipelineManifest {
    pub fn for_request(namespace: &str, request: JobRequest) -> Self {
        let run = request.run;
        let labels = BTreeMap::from([
            (SEARCH_LABEL.to_string(), run.name.clone()),
            (CRAWLER_LABEL.to_string(), run.crawler.clone()),
            (RUN_ID_LABEL.to_string(), run.run_id.to_string()),
        ]);
        Self {
            api_version: format!("{API_GROUP}/{API_VERSION}"),
            kind: "Pipeline",
            metadata: ManifestMetadata {
                generate_name: format!("search-{}-", run.name),
                namespace: namespace.to_string(),
                labels,
            },
            spec: PipelineSpec {
                profile_ref: run.profile,
                downloader_ref: request.downloader,
                ttl_seconds_after_finished: run.ttl.as_secs(),
                target: PipelineTarget {
                    identifier: request.identifier,
                    version: request.version,
                },
                scan_service_account_name: run.scan_service_account,
                upload_service_account_name: run.upload_service_account,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedPipeline {
    metadata: CreatedMetadata,
}

#[derive(Debug, Deserialize)]
struct CreatedMetadata {
    name: String,
}

pub struct PipelineClient {
    http: reqwest::Client,
    endpoint: String,
    namespace: String,
    token: Option<String>,
}

impl PipelineClient {
    pub fn new(settings: &OrchestratorSettings, token: Option<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(path) = &settings.ca_cert {
            let pem = fs::read(path)
                .with_context(|| format!("Failed to read CA certificate {:?}", path))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA certificate {:?}", path))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().context("Failed to build orchestrator HTTP client")?;
        let endpoint = format!(
            "{}/apis/{API_GROUP}/{API_VERSION}/namespaces/{}/pipelines",
            settings.api_url.trim_end_matches('/'),
            settings.namespace
        );
        tracing::info!(endpoint = %endpoint, authenticated = token.is_some(), "Initialised pipeline client");
        Ok(Self {
            http,
            endpoint,
            namespace: settings.namespace.clone(),
            token,
        })
    }
}

#[async_trait]
impl JobCreator for PipelineClient {
    async fn create_job(&self, request: JobRequest) -> Result<JobHandle, JobError> {
        let manifest = PipelineManifest::for_request(&self.namespace, request);
        debug!(?manifest, "Submitting pipeline");

        let mut req = self.http.post(&self.endpoint).json(&manifest);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(JobError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let created: CreatedPipeline = resp.json().await?;
        Ok(JobHandle {
            name: created.metadata.name,
        })
    }
}
