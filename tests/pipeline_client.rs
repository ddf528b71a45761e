use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use target_crawler::load_config::OrchestratorSettings;
use target_crawler::pipeline_client::{PipelineClient, PipelineManifest};
use target_crawler_core::contract::{JobCreator, JobRequest, RunMetadata};
use target_crawler_core::error::JobError;

const PIPELINES_PATH: &str = "/apis/ocular.crashoverride.run/v1beta1/namespaces/scans/pipelines";

fn settings(api_url: String) -> OrchestratorSettings {
    OrchestratorSettings {
        api_url,
        namespace: "scans".into(),
        ca_cert: None,
        token_file: None,
    }
}

fn request(run_id: Uuid) -> JobRequest {
    JobRequest {
        identifier: "ghcr.io/acme/api".into(),
        version: Some("v1.2.0".into()),
        downloader: Some("docker".into()),
        run: RunMetadata {
            run_id,
            name: "nightly".into(),
            crawler: "ghcr".into(),
            profile: "default-scan".into(),
            ttl: Duration::from_secs(3600),
            scan_service_account: Some("scanner".into()),
            upload_service_account: None,
        },
    }
}

#[test]
fn test_manifest_carries_run_labels_and_target() {
    let run_id = Uuid::new_v4();
    let manifest = PipelineManifest::for_request("scans", request(run_id));
    let value = serde_json::to_value(&manifest).unwrap();

    assert_eq!(value["apiVersion"], "ocular.crashoverride.run/v1beta1");
    assert_eq!(value["kind"], "Pipeline");
    assert_eq!(value["metadata"]["generateName"], "search-nightly-");
    assert_eq!(
        value["metadata"]["labels"]["ocular.crashoverride.run/run-id"],
        run_id.to_string()
    );
    assert_eq!(value["spec"]["ttlSecondsAfterFinished"], 3600);
    assert_eq!(value["spec"]["scanServiceAccountName"], "scanner");
    assert!(value["spec"].get("uploadServiceAccountName").is_none());
}

#[tokio::test]
async fn test_create_job_posts_pipeline_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PIPELINES_PATH))
        .and(header("authorization", "Bearer orch-token"))
        .and(body_partial_json(json!({
            "kind": "Pipeline",
            "metadata": {
                "labels": {
                    "ocular.crashoverride.run/search": "nightly",
                    "ocular.crashoverride.run/crawler": "ghcr"
                }
            },
            "spec": {
                "profileRef": "default-scan",
                "downloaderRef": "docker",
                "target": {"identifier": "ghcr.io/acme/api", "version": "v1.2.0"}
            }
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"metadata": {"name": "search-nightly-abcde"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = PipelineClient::new(&settings(server.uri()), Some("orch-token".into())).unwrap();
    let handle = client.create_job(request(Uuid::new_v4())).await.unwrap();

    assert_eq!(handle.name, "search-nightly-abcde");
}

#[tokio::test]
async fn test_create_job_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PIPELINES_PATH))
        .respond_with(ResponseTemplate::new(422).set_body_string("profile not found"))
        .mount(&server)
        .await;

    let client = PipelineClient::new(&settings(format!("{}/", server.uri())), None).unwrap();
    let err = client.create_job(request(Uuid::new_v4())).await.unwrap_err();

    match err {
        JobError::Rejected { status, body } => {
            assert_eq!(status, 422);
            assert_eq!(body, "profile not found");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}
