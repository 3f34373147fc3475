use payloads::{ClientError, Identity, Resource};
use serde::Serialize;
use std::sync::Arc;

use crate::backend::Backend;
use crate::telemetry::error_chain;

/// Result of a write that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Inserted,
    /// Nobody is signed in. The backend was not contacted.
    Unauthenticated,
}

/// Sends single-row inserts into one resource.
///
/// A successful insert does not touch any view state. The change comes back
/// through the push channel of whichever hook instance watches the resource.
pub struct MutationIssuer<B> {
    backend: Arc<B>,
    resource: Resource,
}

impl<B: Backend> MutationIssuer<B> {
    pub fn new(backend: Arc<B>, resource: Resource) -> Self {
        Self { backend, resource }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Build a row for the signed-in identity and insert it. Failures are
    /// logged and returned to the caller, never retried.
    pub async fn insert<R: Serialize>(
        &self,
        identity: Option<&Identity>,
        build: impl FnOnce(&Identity) -> R + Send,
    ) -> Result<MutationOutcome, ClientError> {
        let Some(identity) = identity else {
            tracing::debug!(
                resource = %self.resource,
                "Skipping insert without a signed-in identity"
            );
            return Ok(MutationOutcome::Unauthenticated);
        };
        let row = serde_json::to_value(build(identity))?;

        match self.backend.insert(self.resource, row).await {
            Ok(()) => {
                tracing::debug!(resource = %self.resource, "Inserted row");
                Ok(MutationOutcome::Inserted)
            }
            Err(e) => {
                tracing::error!(
                    resource = %self.resource,
                    "Insert failed: {}",
                    error_chain(&e)
                );
                Err(e)
            }
        }
    }
}
