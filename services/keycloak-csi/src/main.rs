//! Keycloak CSI Driver - Main Entry Point

use anyhow::Context;
use keycloak_csi::observability::{init_tracing, TracingConfig};
use keycloak_csi::{server, shutdown, Config, CredentialFiles, NodeService};
use keycloak_secrets::KeycloakClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(
        &TracingConfig::default()
            .with_log_level(config.log_level.clone())
            .with_format(config.log_format),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node_id = %config.node_id,
        "Starting Keycloak CSI driver"
    );

    let client = KeycloakClient::new(config.keycloak_config())
        .context("creating Keycloak client")?;

    let root = CancellationToken::new();
    let node = NodeService::new(client, config.node_id.clone(), config.request_timeout())
        .with_files(CredentialFiles::new(
            config.client_id_file_mode,
            config.client_secret_file_mode,
        ))
        .with_shutdown(root.clone());

    let listener = server::bind(&config.csi_endpoint).await?;
    let _signals = shutdown::cancel_on(shutdown::wait_for_signal(), root.clone());

    shutdown::run_with_graceful_shutdown(
        server::serve(listener, node, root.clone()),
        root,
        config.shutdown_timeout(),
    )
    .await?;

    info!("Keycloak CSI driver stopped");
    Ok(())
}
