mod dashboard;
mod lifecycle;
mod message_stats;
mod notifications;
mod posts;
mod rest;
mod teams;

use anyhow::Context;
use payloads::Resource;
use realtime::{ViewState, ViewStateReader};
use std::time::Duration;
use test_helpers::MemoryBackend;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Wait until the backend has a push channel open for `resource`.
pub async fn wait_for_channel(
    backend: &MemoryBackend,
    resource: Resource,
) -> anyhow::Result<()> {
    timeout(WAIT, async {
        while backend.open_channels(resource) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .with_context(|| format!("No channel opened for {resource}"))
}

/// Wait until the state satisfies `predicate`.
pub async fn wait_for<T: Clone>(
    reader: &mut ViewStateReader<T>,
    predicate: impl FnMut(&ViewState<T>) -> bool,
) -> anyhow::Result<ViewState<T>> {
    timeout(WAIT, reader.wait_until(predicate))
        .await
        .context("Timed out waiting for view state")?
        .context("State cell dropped")
}

/// Wait until no fetch is in flight.
pub async fn settled<T: Clone>(
    reader: &mut ViewStateReader<T>,
) -> anyhow::Result<ViewState<T>> {
    wait_for(reader, |state| !state.is_busy()).await
}

/// Give detached tasks a chance to run.
pub async fn yield_a_while() {
    sleep(Duration::from_millis(50)).await;
}
