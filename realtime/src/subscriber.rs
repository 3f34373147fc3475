//! The change subscriber: one push channel per mounted hook instance.

use payloads::{ChangeEvent, ClientError, Resource};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::backend::{Backend, SubscriptionId};
use crate::executor::{Channel, Fetch, QueryExecutor};
use crate::lifetime::LifetimeToken;
use crate::telemetry::log_error;

/// How a hook instance reacts to a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Re-run the fetch on every event, ignoring the payload.
    RefetchAll,
    /// Derive the new data from the payload when it is complete enough,
    /// refetching otherwise.
    PatchFromPayload,
}

/// An open push channel. Closed exactly once, by [`SubscriptionHandle::close`]
/// or on drop.
pub struct SubscriptionHandle<B: Backend> {
    id: SubscriptionId,
    resource: Resource,
    backend: Arc<B>,
    events: mpsc::Receiver<ChangeEvent>,
    closed: bool,
}

impl<B: Backend> SubscriptionHandle<B> {
    pub async fn open(
        backend: Arc<B>,
        channel: Channel,
    ) -> Result<Self, ClientError> {
        let feed = backend.subscribe(channel.resource, channel.events).await?;
        tracing::debug!(
            id = %feed.id,
            resource = %channel.resource,
            events = %channel.events,
            "Opened push channel"
        );
        Ok(Self {
            id: feed.id,
            resource: channel.resource,
            backend,
            events: feed.events,
            closed: false,
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The next change event, or `None` once the backend dropped the
    /// channel.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.events.close();
        self.backend.unsubscribe(self.id);
        tracing::debug!(
            id = %self.id,
            resource = %self.resource,
            "Closed push channel"
        );
    }
}

impl<B: Backend> Drop for SubscriptionHandle<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps a [`QueryExecutor`]'s cell in sync with one push channel.
pub struct ChangeSubscriber<B: Backend, F: Fetch> {
    executor: QueryExecutor<B, F>,
    policy: SyncPolicy,
}

impl<B: Backend, F: Fetch> ChangeSubscriber<B, F> {
    pub fn new(executor: QueryExecutor<B, F>, policy: SyncPolicy) -> Self {
        Self { executor, policy }
    }

    /// Open the channel and react to its events until `token` is cancelled
    /// or the backend drops the channel. A dropped channel is not reopened.
    pub async fn run(self, channel: Channel, token: LifetimeToken) {
        let backend = self.executor.backend().clone();
        // backends register a channel only once `subscribe` completes, so
        // abandoning it midway leaves nothing open
        let opened = tokio::select! {
            _ = token.cancelled() => return,
            opened = SubscriptionHandle::open(backend, channel) => opened,
        };
        let mut handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                log_error(anyhow::Error::from(e).context(format!(
                    "Subscribing to {} failed",
                    channel.resource
                )));
                return;
            }
        };
        if token.is_cancelled() {
            handle.close();
            return;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = handle.next() => match event {
                    Some(event) => self.on_event(event, &token),
                    None => {
                        tracing::warn!(
                            id = %handle.id(),
                            resource = %channel.resource,
                            "Push channel dropped"
                        );
                        break;
                    }
                },
            }
        }
        handle.close();
    }

    fn on_event(&self, event: ChangeEvent, token: &LifetimeToken) {
        tracing::debug!(
            resource = %event.resource,
            kind = %event.kind,
            policy = ?self.policy,
            "Change event"
        );
        if self.policy == SyncPolicy::RefetchAll {
            self.spawn_refetch(token);
            return;
        }
        if self.executor.apply_change(token, &event) {
            self.spawn_refetch(token);
        }
    }

    /// Refetches are detached and may overlap. The one started last wins
    /// regardless of the order they settle in.
    fn spawn_refetch(&self, token: &LifetimeToken) {
        let executor = self.executor.clone();
        let token = token.clone();
        tokio::spawn(async move {
            executor.run(&token).await;
        });
    }
}
