use std::sync::Arc;
use tokio::sync::watch;

use crate::lifetime::LifetimeToken;

/// What the rendering layer sees of one hook instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState<T> {
    /// Result of the most recent successful fetch, replaced wholesale.
    pub data: T,
    /// True while the instance's first fetch is in flight (or every fetch,
    /// under [`LoadingPolicy::EveryFetch`]).
    pub loading: bool,
    /// True while a background refetch is in flight after data was shown.
    pub refreshing: bool,
}

impl<T> ViewState<T> {
    pub fn is_busy(&self) -> bool {
        self.loading || self.refreshing
    }
}

/// When the `loading` flag is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingPolicy {
    /// Only during the first fetch; later fetches raise `refreshing`.
    #[default]
    InitialOnly,
    /// During every fetch.
    EveryFetch,
}

/// The single mutable cell holding an instance's latest [`ViewState`].
///
/// All writes go through setters that take the writer's [`LifetimeToken`]
/// and become no-ops once it is cancelled.
pub struct StateCell<T> {
    state_tx: Arc<watch::Sender<ViewState<T>>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            state_tx: self.state_tx.clone(),
        }
    }
}

impl<T: Clone> StateCell<T> {
    /// A cell in the initial state: empty data, loading.
    pub fn new(data: T) -> Self {
        let (state_tx, _) = watch::channel(ViewState {
            data,
            loading: true,
            refreshing: false,
        });
        Self {
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn reader(&self) -> ViewStateReader<T> {
        ViewStateReader {
            state_rx: self.state_tx.subscribe(),
        }
    }

    pub fn snapshot(&self) -> ViewState<T> {
        self.state_tx.borrow().clone()
    }

    /// Apply a write unless the writer's lifetime has ended. Returns whether
    /// the write happened.
    pub fn update(
        &self,
        token: &LifetimeToken,
        f: impl FnOnce(&mut ViewState<T>),
    ) -> bool {
        if token.is_cancelled() {
            return false;
        }
        self.state_tx.send_modify(f);
        true
    }

    /// Like [`StateCell::update`], but readers are only notified when `f`
    /// reports a change.
    pub fn update_if(
        &self,
        token: &LifetimeToken,
        f: impl FnOnce(&mut ViewState<T>) -> bool,
    ) -> bool {
        if token.is_cancelled() {
            return false;
        }
        self.state_tx.send_if_modified(f)
    }

    /// Replace the whole state on behalf of the owner, between mounts.
    pub fn reset(&self, state: ViewState<T>) {
        self.state_tx.send_replace(state);
    }

    /// Set the in-flight flags, notifying readers only if they changed.
    pub fn set_flags(
        &self,
        token: &LifetimeToken,
        loading: bool,
        refreshing: bool,
    ) -> bool {
        if token.is_cancelled() {
            return false;
        }
        self.state_tx.send_if_modified(|state| {
            let changed =
                state.loading != loading || state.refreshing != refreshing;
            state.loading = loading;
            state.refreshing = refreshing;
            changed
        });
        true
    }
}

/// Read side of a [`StateCell`].
pub struct ViewStateReader<T> {
    state_rx: watch::Receiver<ViewState<T>>,
}

impl<T> Clone for ViewStateReader<T> {
    fn clone(&self) -> Self {
        Self {
            state_rx: self.state_rx.clone(),
        }
    }
}

impl<T: Clone> ViewStateReader<T> {
    /// The latest settled value. Marks it as seen.
    pub fn current(&mut self) -> ViewState<T> {
        self.state_rx.borrow_and_update().clone()
    }

    /// True if a write happened since the value was last seen.
    pub fn has_changed(&self) -> bool {
        self.state_rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next write. `None` once the cell is gone.
    pub async fn changed(&mut self) -> Option<ViewState<T>> {
        self.state_rx.changed().await.ok()?;
        Some(self.current())
    }

    /// Wait until the state satisfies `predicate`. `None` if the cell is
    /// dropped first.
    pub async fn wait_until(
        &mut self,
        predicate: impl FnMut(&ViewState<T>) -> bool,
    ) -> Option<ViewState<T>> {
        self.state_rx
            .wait_for(predicate)
            .await
            .ok()
            .map(|state| (*state).clone())
    }
}
