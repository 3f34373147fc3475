use payloads::{
    ChangeEvent, ClientError, EventFilter, Identity, Query, Resource,
    RestClient,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{Backend, ChangeFeed, EVENT_CHANNEL_CAPACITY, SubscriptionId};
use crate::telemetry::log_error;

/// [`Backend`] over the managed backend's HTTP endpoints.
///
/// Each push channel is pumped by its own task from the SSE stream into the
/// feed. A stream that ends is not reopened.
pub struct RestBackend {
    client: Arc<RestClient>,
    channels: Mutex<HashMap<SubscriptionId, AbortHandle>>,
    next_channel: AtomicU64,
}

impl RestBackend {
    pub fn new(client: RestClient) -> Self {
        Self {
            client: Arc::new(client),
            channels: Mutex::new(HashMap::new()),
            next_channel: AtomicU64::new(1),
        }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    fn channels(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, AbortHandle>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for RestBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, ClientError> {
        self.client.select(query).await
    }

    async fn count(&self, query: &Query) -> Result<u64, ClientError> {
        self.client.count(query).await
    }

    async fn insert(
        &self,
        resource: Resource,
        row: Value,
    ) -> Result<(), ClientError> {
        self.client.insert(resource, &row).await
    }

    async fn subscribe(
        &self,
        resource: Resource,
        events: EventFilter,
    ) -> Result<ChangeFeed, ClientError> {
        let mut stream = self.client.subscribe(resource, events).await?;
        let id =
            SubscriptionId(self.next_channel.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events_rx) =
            mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let pump = tokio::spawn(async move {
            while let Some(event) = stream.next_event().await {
                match event {
                    Ok(event) => {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(ClientError::Network(e)) => {
                        log_error(anyhow::Error::from(e).context(format!(
                            "Push channel {id} for {resource} failed"
                        )));
                        return;
                    }
                    // a malformed frame does not end the channel
                    Err(e) => log_error(anyhow::Error::from(e).context(
                        format!("Dropping unreadable event on {resource}"),
                    )),
                }
            }
            tracing::warn!(%id, %resource, "Push channel closed by backend");
        });
        self.channels().insert(id, pump.abort_handle());

        Ok(ChangeFeed {
            id,
            events: events_rx,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(pump) = self.channels().remove(&id) {
            pump.abort();
        }
    }

    async fn current_user(&self) -> Result<Option<Identity>, ClientError> {
        self.client.current_user().await
    }
}
