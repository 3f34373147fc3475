//! A mounted hook instance: view state, an initial fetch and the change
//! subscriber keeping it current.
//!
//! The control flow of every instance is
//!
//! ```text
//! mount -> fetch -> loading -> data -> open channel -> on event -> refetch
//!       -> data -> ... -> unmount -> close channel
//! ```
//!
//! Each mount owns a [`Lifetime`]. Ending it discards every write that is
//! still pending and stops the subscriber, which closes its channel.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::executor::{Fetch, QueryExecutor};
use crate::lifetime::{Lifetime, LifetimeToken};
use crate::subscriber::{ChangeSubscriber, SyncPolicy};
use crate::telemetry::log_error;
use crate::view_state::{LoadingPolicy, StateCell, ViewState, ViewStateReader};

/// Per-mount tuning of a [`LiveQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Overrides the fetch's preferred policy.
    pub policy: Option<SyncPolicy>,
    pub loading: LoadingPolicy,
}

struct Mount<B, F: Fetch> {
    lifetime: Lifetime,
    executor: QueryExecutor<B, F>,
    driver: Option<JoinHandle<()>>,
}

pub struct LiveQuery<B: Backend, F: Fetch> {
    backend: Arc<B>,
    options: SyncOptions,
    cell: StateCell<F::Output>,
    mount: Option<Mount<B, F>>,
}

impl<B: Backend, F: Fetch> LiveQuery<B, F> {
    /// Mount an instance. Must be called within a tokio runtime.
    ///
    /// Without a fetch (for example when a user-scoped hook has no identity
    /// to scope to) nothing is read or subscribed and the state settles
    /// immediately as empty and not loading.
    pub fn mount(
        backend: Arc<B>,
        fetch: Option<F>,
        options: SyncOptions,
    ) -> Self {
        let mut live = Self {
            backend,
            options,
            cell: StateCell::new(F::Output::default()),
            mount: None,
        };
        live.start(fetch);
        live
    }

    pub fn reader(&self) -> ViewStateReader<F::Output> {
        self.cell.reader()
    }

    pub fn state(&self) -> ViewState<F::Output> {
        self.cell.snapshot()
    }

    pub fn fetch(&self) -> Option<&F> {
        self.mount.as_ref().map(|mount| mount.executor.fetch())
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_some()
    }

    /// Run the fetch now and wait for it to settle. Returns whether the
    /// result was written.
    pub async fn refetch(&self) -> bool {
        match &self.mount {
            Some(mount) => mount.executor.run(&mount.lifetime.token()).await,
            None => false,
        }
    }

    /// Replace the fetch, e.g. after the identity it is scoped to changed.
    ///
    /// The previous channel is closed before the new one is opened, and the
    /// state starts over from empty and loading.
    pub async fn remount(&mut self, fetch: Option<F>) {
        self.stop().await;
        self.cell.reset(ViewState {
            data: F::Output::default(),
            loading: true,
            refreshing: false,
        });
        self.start(fetch);
    }

    /// Tear the instance down and wait until its channel is closed.
    pub async fn unmount(mut self) {
        self.stop().await;
    }

    fn start(&mut self, fetch: Option<F>) {
        let Some(fetch) = fetch else {
            self.cell.reset(ViewState::default());
            return;
        };
        let fetch = Arc::new(fetch);
        let lifetime = Lifetime::new();
        let executor = QueryExecutor::new(
            self.backend.clone(),
            fetch.clone(),
            self.cell.clone(),
            self.options.loading,
        );
        tracing::debug!(fetch = fetch.describe(), "Mounting");

        spawn_run(executor.clone(), lifetime.token());
        let driver = fetch.channel().map(|channel| {
            let policy = self
                .options
                .policy
                .unwrap_or_else(|| fetch.preferred_policy());
            let subscriber = ChangeSubscriber::new(executor.clone(), policy);
            tokio::spawn(subscriber.run(channel, lifetime.token()))
        });

        self.mount = Some(Mount {
            lifetime,
            executor,
            driver,
        });
    }

    async fn stop(&mut self) {
        let Some(mount) = self.mount.take() else {
            return;
        };
        tracing::debug!(
            fetch = mount.executor.fetch().describe(),
            "Unmounting"
        );
        mount.lifetime.cancel();
        if let Some(driver) = mount.driver {
            if let Err(e) = driver.await {
                log_error(
                    anyhow::Error::from(e)
                        .context("Change subscriber panicked"),
                );
            }
        }
    }
}

fn spawn_run<B: Backend, F: Fetch>(
    executor: QueryExecutor<B, F>,
    token: LifetimeToken,
) {
    tokio::spawn(async move {
        executor.run(&token).await;
    });
}
