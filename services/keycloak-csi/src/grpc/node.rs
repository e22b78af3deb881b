//! CSI Node service: publishes and unpublishes credential volumes.

use crate::error::{CsiError, CsiResult};
use crate::proto::csi::v1::node_server::Node;
use crate::proto::csi::v1::{
    NodeGetCapabilitiesRequest, NodeGetCapabilitiesResponse, NodeGetInfoRequest,
    NodeGetInfoResponse, NodePublishVolumeRequest, NodePublishVolumeResponse,
    NodeUnpublishVolumeRequest, NodeUnpublishVolumeResponse,
};
use crate::volume::CredentialFiles;
use keycloak_secrets::{ClientSecretProvider, RequestContext};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Volume context key carrying the client name.
pub const CLIENT_ID_KEY: &str = "clientID";

/// Node service publishing Keycloak client credentials as volume files.
pub struct NodeService<P> {
    provider: P,
    files: CredentialFiles,
    node_id: String,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl<P: ClientSecretProvider> NodeService<P> {
    /// Creates a node service fetching secrets from `provider`.
    pub fn new(provider: P, node_id: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            provider,
            files: CredentialFiles::default(),
            node_id: node_id.into(),
            request_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Uses the given file writer instead of the default modes.
    #[must_use]
    pub const fn with_files(mut self, files: CredentialFiles) -> Self {
        self.files = files;
        self
    }

    /// In-flight calls are cancelled when `token` is.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    fn request_context(&self) -> RequestContext {
        RequestContext::new(self.shutdown.child_token()).with_timeout(self.request_timeout)
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> CsiResult<()> {
        if req.target_path.is_empty() {
            return Err(CsiError::MissingField {
                field: "target_path",
            });
        }
        let client_name = req
            .volume_context
            .get(CLIENT_ID_KEY)
            .filter(|name| !name.is_empty())
            .ok_or(CsiError::MissingContext { key: CLIENT_ID_KEY })?;

        let ctx = self.request_context();
        let secret = self.provider.fetch(&ctx, client_name).await?;
        self.files
            .publish(&ctx, Path::new(&req.target_path), client_name, &secret)
            .await
    }

    async fn unpublish(&self, req: &NodeUnpublishVolumeRequest) -> CsiResult<()> {
        if req.target_path.is_empty() {
            return Err(CsiError::MissingField {
                field: "target_path",
            });
        }
        let ctx = self.request_context();
        self.files
            .unpublish(&ctx, Path::new(&req.target_path))
            .await
    }
}

/// Logs the outcome of a volume call and turns failures into a status.
fn respond<T>(
    result: CsiResult<()>,
    response: T,
    correlation_id: Uuid,
    started: Instant,
    action: &'static str,
) -> Result<Response<T>, Status> {
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok(()) => {
            info!(elapsed_ms, "{action} succeeded");
            Ok(Response::new(response))
        }
        Err(err) => {
            warn!(elapsed_ms, error = %err, code = ?err.grpc_code(), "{action} failed");
            Err(err.to_status(correlation_id))
        }
    }
}

#[tonic::async_trait]
impl<P: ClientSecretProvider + 'static> Node for NodeService<P> {
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "node_publish_volume",
            volume_id = %req.volume_id,
            target_path = %req.target_path,
            %correlation_id,
        );

        async {
            let started = Instant::now();
            let result = self.publish(&req).await;
            respond(result, NodePublishVolumeResponse {}, correlation_id, started, "publish")
        }
        .instrument(span)
        .await
    }

    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "node_unpublish_volume",
            volume_id = %req.volume_id,
            target_path = %req.target_path,
            %correlation_id,
        );

        async {
            let started = Instant::now();
            let result = self.unpublish(&req).await;
            respond(result, NodeUnpublishVolumeResponse {}, correlation_id, started, "unpublish")
        }
        .instrument(span)
        .await
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        Ok(Response::new(NodeGetCapabilitiesResponse {
            capabilities: Vec::new(),
        }))
    }

    async fn node_get_info(
        &self,
        _request: Request<NodeGetInfoRequest>,
    ) -> Result<Response<NodeGetInfoResponse>, Status> {
        Ok(Response::new(NodeGetInfoResponse {
            node_id: self.node_id.clone(),
            max_volumes_per_node: 0,
        }))
    }
}
