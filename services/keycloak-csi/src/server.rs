//! CSI endpoint wiring: Unix socket listener plus the tonic server.

use crate::grpc::{IdentityService, NodeService};
use crate::proto::csi::v1::identity_server::IdentityServer;
use crate::proto::csi::v1::node_server::NodeServer;
use anyhow::Context;
use keycloak_secrets::ClientSecretProvider;
use std::io::ErrorKind;
use std::path::Path;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info};

/// Binds the CSI socket, replacing a socket file left by a previous run.
///
/// # Errors
///
/// Fails when the stale socket cannot be removed or the bind fails.
pub async fn bind(endpoint: &Path) -> anyhow::Result<UnixListener> {
    match tokio::fs::remove_file(endpoint).await {
        Ok(()) => debug!(endpoint = %endpoint.display(), "Removed stale socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e)
                .with_context(|| format!("removing stale socket {}", endpoint.display()))
        }
    }

    if let Some(parent) = endpoint.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }

    let listener = UnixListener::bind(endpoint)
        .with_context(|| format!("binding CSI socket {}", endpoint.display()))?;
    info!(endpoint = %endpoint.display(), "CSI endpoint listening");
    Ok(listener)
}

/// Serves the identity and node services until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns the transport error that stopped the server.
pub async fn serve<P>(
    listener: UnixListener,
    node: NodeService<P>,
    shutdown: CancellationToken,
) -> Result<(), tonic::transport::Error>
where
    P: ClientSecretProvider + 'static,
{
    Server::builder()
        .add_service(IdentityServer::new(IdentityService))
        .add_service(NodeServer::new(node))
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
            shutdown.cancelled().await;
        })
        .await
}
