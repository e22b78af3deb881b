//! Node service tests.
//!
//! The end-to-end publish/unpublish flow runs against a mock Keycloak; error
//! mapping and cancellation use an in-process provider.

use async_trait::async_trait;
use keycloak_csi::grpc::CLIENT_ID_KEY;
use keycloak_csi::proto::csi::v1::node_server::Node;
use keycloak_csi::proto::csi::v1::{
    NodeGetCapabilitiesRequest, NodeGetInfoRequest, NodePublishVolumeRequest,
    NodeUnpublishVolumeRequest,
};
use keycloak_csi::{server, CredentialFiles, NodeService};
use keycloak_secrets::{
    ClientSecret, ClientSecretProvider, KeycloakClient, KeycloakConfig, KeycloakError,
    KeycloakResult, RequestContext,
};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

enum Outcome {
    Secret(&'static [u8]),
    NotFound,
    Unavailable,
    Hang,
}

struct FakeProvider {
    outcome: Outcome,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientSecretProvider for FakeProvider {
    async fn fetch(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<ClientSecret> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Secret(bytes) => Ok(ClientSecret::new(bytes.to_vec())),
            Outcome::NotFound => Err(KeycloakError::ClientNotFound {
                client_name: client_name.to_string(),
            }),
            Outcome::Unavailable => Err(KeycloakError::remote(
                keycloak_secrets::Step::ClientLookup,
                503,
                "maintenance",
            )),
            Outcome::Hang => ctx
                .run(std::future::pending::<ClientSecret>())
                .await
                .map_err(KeycloakError::from),
        }
    }
}

fn publish_request(target: &Path, context: &[(&str, &str)]) -> Request<NodePublishVolumeRequest> {
    Request::new(NodePublishVolumeRequest {
        volume_id: "test-volume-id".to_string(),
        target_path: target.display().to_string(),
        volume_context: context
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<HashMap<_, _>>(),
        ..Default::default()
    })
}

fn unpublish_request(target: &Path) -> Request<NodeUnpublishVolumeRequest> {
    Request::new(NodeUnpublishVolumeRequest {
        volume_id: "test-volume-id".to_string(),
        target_path: target.display().to_string(),
    })
}

#[tokio::test]
async fn test_publish_and_unpublish_against_mock_keycloak() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "expires_in": 1,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/master/clients"))
        .and(query_param("clientId", "test-client-id"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "id": "test-client-uuid" }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/master/clients/test-client-uuid/client-secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "value": "test-client-secret" })),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let password = dir.path().join("password");
    std::fs::write(&password, "test-password").unwrap();
    let client = KeycloakClient::new(KeycloakConfig::new(
        server.uri(),
        "test-username",
        password,
    ))
    .unwrap();
    let node = NodeService::new(client, "test-node", TIMEOUT);

    let target = dir.path().join("target");
    node.node_publish_volume(publish_request(
        &target,
        &[(CLIENT_ID_KEY, "test-client-id")],
    ))
    .await
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(target.join("client-id")).unwrap(),
        "test-client-id"
    );
    assert_eq!(
        std::fs::read_to_string(target.join("client-secret")).unwrap(),
        "test-client-secret"
    );

    node.node_unpublish_volume(unpublish_request(&target))
        .await
        .unwrap();

    assert!(!target.join("client-id").exists());
    assert!(!target.join("client-secret").exists());
}

#[tokio::test]
async fn test_missing_client_id_is_failed_precondition_without_fetch() {
    let provider = FakeProvider::new(Outcome::Secret(b"unused"));
    let node = NodeService::new(Arc::clone(&provider), "test-node", TIMEOUT);
    let dir = TempDir::new().unwrap();

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[("other", "value")]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(status.message().contains("clientID"));

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "")]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    assert_eq!(provider.calls(), 0);
    assert!(!dir.path().join("client-id").exists());
}

#[tokio::test]
async fn test_missing_target_path_is_invalid_argument() {
    let provider = FakeProvider::new(Outcome::Secret(b"unused"));
    let node = NodeService::new(Arc::clone(&provider), "test-node", TIMEOUT);

    let status = node
        .node_publish_volume(publish_request(Path::new(""), &[(CLIENT_ID_KEY, "app")]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_publish_applies_configured_modes() {
    let provider = FakeProvider::new(Outcome::Secret(b"s3cr3t"));
    let node = NodeService::new(provider, "test-node", TIMEOUT)
        .with_files(CredentialFiles::new(0o444, 0o400));
    let dir = TempDir::new().unwrap();

    node.node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "app")]))
        .await
        .unwrap();

    let mode = |name: &str| {
        std::fs::metadata(dir.path().join(name))
            .unwrap()
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode("client-id"), 0o444);
    assert_eq!(mode("client-secret"), 0o400);
    assert_eq!(std::fs::read(dir.path().join("client-secret")).unwrap(), b"s3cr3t");
}

#[tokio::test]
async fn test_republish_overwrites_read_only_files() {
    let provider = FakeProvider::new(Outcome::Secret(b"s3cr3t"));
    let node = NodeService::new(Arc::clone(&provider), "test-node", TIMEOUT);
    let dir = TempDir::new().unwrap();

    for _ in 0..2 {
        node.node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "app")]))
            .await
            .unwrap();
    }
    assert_eq!(provider.calls(), 2);
    assert_eq!(std::fs::read(dir.path().join("client-secret")).unwrap(), b"s3cr3t");
}

#[tokio::test]
async fn test_unpublish_is_idempotent() {
    let node = NodeService::new(FakeProvider::new(Outcome::NotFound), "test-node", TIMEOUT);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("never-published");

    node.node_unpublish_volume(unpublish_request(&target))
        .await
        .unwrap();
    node.node_unpublish_volume(unpublish_request(&target))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_client_is_failed_precondition() {
    let node = NodeService::new(FakeProvider::new(Outcome::NotFound), "test-node", TIMEOUT);
    let dir = TempDir::new().unwrap();

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "ghost")]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(status.message().contains("ghost"));
    assert!(status.message().contains("correlation_id"));
    assert!(!dir.path().join("client-id").exists());
}

#[tokio::test]
async fn test_remote_failure_is_unavailable() {
    let node = NodeService::new(
        FakeProvider::new(Outcome::Unavailable),
        "test-node",
        TIMEOUT,
    );
    let dir = TempDir::new().unwrap();

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "app")]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("503"));
}

#[tokio::test]
async fn test_request_timeout_is_deadline_exceeded() {
    let node = NodeService::new(
        FakeProvider::new(Outcome::Hang),
        "test-node",
        Duration::from_millis(50),
    );
    let dir = TempDir::new().unwrap();

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "app")]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_publish() {
    let shutdown = CancellationToken::new();
    let node = NodeService::new(FakeProvider::new(Outcome::Hang), "test-node", TIMEOUT)
        .with_shutdown(shutdown.clone());
    let dir = TempDir::new().unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
    });

    let status = node
        .node_publish_volume(publish_request(dir.path(), &[(CLIENT_ID_KEY, "app")]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Cancelled);
}

#[tokio::test]
async fn test_node_info_and_capabilities() {
    let node = NodeService::new(FakeProvider::new(Outcome::NotFound), "node-7", TIMEOUT);

    let info = node
        .node_get_info(Request::new(NodeGetInfoRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(info.node_id, "node-7");

    let caps = node
        .node_get_capabilities(Request::new(NodeGetCapabilitiesRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert!(caps.capabilities.is_empty());
}

#[tokio::test]
async fn test_server_replaces_stale_socket_and_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("csi.sock");
    std::fs::write(&socket, b"stale").unwrap();

    let listener = server::bind(&socket).await.unwrap();
    assert!(socket.exists());

    let shutdown = CancellationToken::new();
    let node = NodeService::new(FakeProvider::new(Outcome::NotFound), "test-node", TIMEOUT);
    let handle = tokio::spawn(server::serve(listener, node, shutdown.clone()));

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
