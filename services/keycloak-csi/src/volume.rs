//! Credential files under a volume target path
//!
//! A published volume is nothing more than two files in the target
//! directory; their presence is the mount state.

use crate::error::{CsiError, CsiResult, FsOp};
use keycloak_secrets::{ClientSecret, RequestContext};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File holding the client name as requested by the workload.
pub const CLIENT_ID_FILE: &str = "client-id";

/// File holding the raw client secret.
pub const CLIENT_SECRET_FILE: &str = "client-secret";

/// Writes and removes the credential files of a volume.
#[derive(Debug, Clone, Copy)]
pub struct CredentialFiles {
    client_id_mode: u32,
    client_secret_mode: u32,
}

impl Default for CredentialFiles {
    fn default() -> Self {
        Self {
            client_id_mode: 0o444,
            client_secret_mode: 0o440,
        }
    }
}

impl CredentialFiles {
    /// Uses the given modes for the `client-id` and `client-secret` files.
    #[must_use]
    pub const fn new(client_id_mode: u32, client_secret_mode: u32) -> Self {
        Self {
            client_id_mode,
            client_secret_mode,
        }
    }

    /// Materializes both files under `target`, creating the directory first.
    ///
    /// Files from an earlier publish are replaced. A failure part way through
    /// leaves already written files in place; [`Self::unpublish`] cleans up.
    ///
    /// # Errors
    ///
    /// Returns [`CsiError::Io`] when a filesystem step fails, or the
    /// interruption of `ctx`.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        target: &Path,
        client_name: &str,
        secret: &ClientSecret,
    ) -> CsiResult<()> {
        ctx.run(fs::create_dir_all(target))
            .await?
            .map_err(|e| CsiError::io(FsOp::CreateDir, target, e))?;

        write_read_only(
            ctx,
            &target.join(CLIENT_ID_FILE),
            client_name.as_bytes(),
            self.client_id_mode,
        )
        .await?;
        write_read_only(
            ctx,
            &target.join(CLIENT_SECRET_FILE),
            secret.expose_secret(),
            self.client_secret_mode,
        )
        .await
    }

    /// Removes both files (recursively) from `target`. Missing files are fine.
    ///
    /// # Errors
    ///
    /// Returns [`CsiError::Io`] for removal failures other than not found.
    pub async fn unpublish(&self, ctx: &RequestContext, target: &Path) -> CsiResult<()> {
        for name in [CLIENT_ID_FILE, CLIENT_SECRET_FILE] {
            remove_path(ctx, &target.join(name)).await?;
        }
        Ok(())
    }
}

async fn write_read_only(
    ctx: &RequestContext,
    path: &Path,
    contents: &[u8],
    mode: u32,
) -> CsiResult<()> {
    // A previous publish leaves a file we cannot open for writing.
    remove_path(ctx, path).await?;

    let write = async {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.sync_all().await
    };
    ctx.run(write)
        .await?
        .map_err(|e| CsiError::io(FsOp::Write, path, e))?;

    // The umask applies at creation time only.
    ctx.run(fs::set_permissions(path, std::fs::Permissions::from_mode(mode)))
        .await?
        .map_err(|e| CsiError::io(FsOp::SetPermissions, path, e))
}

async fn remove_path(ctx: &RequestContext, path: &Path) -> CsiResult<()> {
    let remove = async {
        match fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
            Ok(_) => fs::remove_file(path).await,
            Err(e) => Err(e),
        }
    };

    match ctx.run(remove).await? {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CsiError::io(FsOp::Remove, path, e)),
    }
}
