//! Keycloak CSI driver.
//!
//! Kubernetes CSI node plugin that mounts Keycloak client credentials into
//! pods as a `client-id` and a `client-secret` file.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;
pub mod server;
pub mod shutdown;
pub mod volume;

// Include generated protobuf code
#[allow(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
pub mod proto {
    pub mod csi {
        pub mod v1 {
            tonic::include_proto!("csi.v1");
        }
    }
}

pub use config::Config;
pub use error::{CsiError, CsiResult};
pub use grpc::{IdentityService, NodeService};
pub use volume::CredentialFiles;
