//! The seam between hooks and the managed backend.
//!
//! Hooks never reach for a global client. Each one is handed an `Arc<B>` of
//! some [`Backend`], which is a [`RestBackend`] in the application and an
//! in-memory double in tests.

mod rest;

pub use rest::RestBackend;

use derive_more::Display;
use payloads::{
    ChangeEvent, ClientError, EventFilter, Identity, Query, Resource,
};
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;

/// Buffer of undelivered change events per push channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identifies one open push channel on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("channel-{_0}")]
pub struct SubscriptionId(pub u64);

/// The receiving end of an open push channel.
pub struct ChangeFeed {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Data-access calls the hooks issue.
pub trait Backend: Send + Sync + 'static {
    /// Read rows matching the query.
    fn select(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Value>, ClientError>> + Send;

    /// Count rows matching the query's filters.
    fn count(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// Insert a single row.
    fn insert(
        &self,
        resource: Resource,
        row: Value,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Open a push channel for one resource.
    fn subscribe(
        &self,
        resource: Resource,
        events: EventFilter,
    ) -> impl Future<Output = Result<ChangeFeed, ClientError>> + Send;

    /// Close a push channel. Closing an unknown or already closed channel
    /// is a no-op.
    fn unsubscribe(&self, id: SubscriptionId);

    /// The currently authenticated identity, if any.
    fn current_user(
        &self,
    ) -> impl Future<Output = Result<Option<Identity>, ClientError>> + Send;
}
