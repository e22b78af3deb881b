//! CSI gRPC service implementations
//!
//! `IdentityService` answers the static plugin queries, `NodeService`
//! publishes and unpublishes credential volumes.

mod identity;
mod node;

pub use identity::{IdentityService, PLUGIN_NAME};
pub use node::{NodeService, CLIENT_ID_KEY};
