//! Provider trait

use std::path::Path;

use crate::error::Result;
use crate::types::{DeployResult, ServiceKind};

/// A delivery backend
///
/// Every variant follows the same shape: build a mutable request for the
/// artifact, let the caller layer optional fields on top, then freeze and
/// transmit it. Configuration is validated before a provider is built.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Caller-mutable request handed to the mutator
    type Request: Send;

    /// Typed view of a successful deploy
    type Output: Send;

    /// Which backend this is
    fn service(&self) -> ServiceKind;

    /// Initial request for `path` with the required fields already set
    fn request(&self, path: &Path) -> Self::Request;

    /// Freeze and transmit a request
    async fn submit(&self, request: Self::Request) -> Result<DeployResult<Self::Output>>;

    /// Deploy `path`, letting `mutate` set optional fields first
    async fn deploy<F>(&self, path: &Path, mutate: F) -> Result<DeployResult<Self::Output>>
    where
        F: FnOnce(&mut Self::Request) + Send,
    {
        let mut request = self.request(path);
        mutate(&mut request);
        self.submit(request).await
    }
}
