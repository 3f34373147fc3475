//! The query executor: one read against the backend, settled into a
//! [`StateCell`].

use payloads::query::SelectItem;
use payloads::{ChangeEvent, ClientError, EventFilter, EventKind, Query};
use payloads::{Record, Resource};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering as SortOrder;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::backend::Backend;
use crate::lifetime::LifetimeToken;
use crate::subscriber::SyncPolicy;
use crate::telemetry::log_error;
use crate::view_state::{LoadingPolicy, StateCell};

/// The push channel a fetch wants to be kept in sync with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub resource: Resource,
    pub events: EventFilter,
}

/// What a change payload means for the data currently shown.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    /// Replace the data with this value.
    Apply(T),
    /// The change is not visible through this fetch.
    Ignore,
    /// The payload is not enough to derive the new data.
    Refetch,
}

/// A read that produces one hook instance's data.
///
/// Implementations must be pure descriptions: calling [`Fetch::fetch`] twice
/// against an unchanged backend yields equal results.
pub trait Fetch: Send + Sync + 'static {
    type Output: Clone + Default + Send + Sync + 'static;

    fn fetch<B: Backend>(
        &self,
        backend: &B,
    ) -> impl Future<Output = Result<Self::Output, ClientError>> + Send;

    /// Short label for logs.
    fn describe(&self) -> String;

    fn channel(&self) -> Option<Channel> {
        None
    }

    /// Used unless the mount overrides it.
    fn preferred_policy(&self) -> SyncPolicy {
        SyncPolicy::RefetchAll
    }

    fn patch(
        &self,
        _current: &Self::Output,
        _event: &ChangeEvent,
    ) -> Patch<Self::Output> {
        Patch::Refetch
    }
}

/// Map fetched rows into records. One malformed row fails the whole read.
pub fn decode_rows<T: DeserializeOwned>(
    rows: Vec<Value>,
) -> Result<Vec<T>, ClientError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(ClientError::from))
        .collect()
}

/// A filtered, ordered and limited list of records from one resource.
pub struct ListQuery<T> {
    query: Query,
    events: Option<EventFilter>,
    policy: SyncPolicy,
    record: PhantomData<fn() -> T>,
}

impl<T: Record> ListQuery<T> {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            events: None,
            policy: SyncPolicy::RefetchAll,
            record: PhantomData,
        }
    }

    /// Keep the list in sync with changes of the queried resource.
    pub fn subscribe_to(mut self, events: EventFilter) -> Self {
        self.events = Some(events);
        self
    }

    /// Prefer patching the list from change payloads over refetching.
    pub fn patch_from_payload(mut self) -> Self {
        self.policy = SyncPolicy::PatchFromPayload;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    fn embeds_relations(&self) -> bool {
        self.query
            .select_items()
            .iter()
            .any(|item| matches!(item, SelectItem::Embed { .. }))
    }

    fn is_full(&self, len: usize) -> bool {
        self.query.limit.is_some_and(|limit| len >= limit)
    }

    /// Index at which `row` belongs in `items` under the query's order.
    fn position(&self, items: &[T], row: &Value) -> Option<usize> {
        let Some(order) = &self.query.order else {
            return Some(items.len());
        };
        for (index, item) in items.iter().enumerate() {
            let item = serde_json::to_value(item).ok()?;
            if order.compare(row, &item) == SortOrder::Less {
                return Some(index);
            }
        }
        Some(items.len())
    }

    fn patch_upsert(&self, current: &[T], row: &Value) -> Patch<Vec<T>> {
        let Ok(record) = serde_json::from_value::<T>(row.clone()) else {
            return Patch::Refetch;
        };
        let id = record.record_id();
        let existing = current.iter().position(|item| item.record_id() == id);
        let full = self.is_full(current.len());

        if !self.query.matches(row) {
            return match existing {
                None => Patch::Ignore,
                // a row outside the page would have to move in
                Some(_) if full => Patch::Refetch,
                Some(index) => {
                    let mut items = current.to_vec();
                    items.remove(index);
                    Patch::Apply(items)
                }
            };
        }

        let mut items = current.to_vec();
        if let Some(index) = existing {
            items.remove(index);
        }
        let Some(position) = self.position(&items, row) else {
            return Patch::Refetch;
        };
        if full && position == items.len() {
            return match (existing, &self.query.order) {
                (None, Some(_)) => Patch::Ignore,
                _ => Patch::Refetch,
            };
        }
        items.insert(position, record);
        if let Some(limit) = self.query.limit {
            items.truncate(limit);
        }
        Patch::Apply(items)
    }

    fn patch_delete(&self, current: &[T], old: &Value) -> Patch<Vec<T>> {
        let id = match old.get(T::KEY) {
            Some(Value::String(id)) => id.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => return Patch::Refetch,
        };
        let Some(index) = current.iter().position(|item| item.record_id() == id)
        else {
            return Patch::Ignore;
        };
        if self.is_full(current.len()) {
            return Patch::Refetch;
        }
        let mut items = current.to_vec();
        items.remove(index);
        Patch::Apply(items)
    }
}

impl<T: Record> Fetch for ListQuery<T> {
    type Output = Vec<T>;

    async fn fetch<B: Backend>(
        &self,
        backend: &B,
    ) -> Result<Vec<T>, ClientError> {
        decode_rows(backend.select(&self.query).await?)
    }

    fn describe(&self) -> String {
        format!("{} list", self.query.resource)
    }

    fn channel(&self) -> Option<Channel> {
        self.events.map(|events| Channel {
            resource: self.query.resource,
            events,
        })
    }

    fn preferred_policy(&self) -> SyncPolicy {
        self.policy
    }

    fn patch(&self, current: &Vec<T>, event: &ChangeEvent) -> Patch<Vec<T>> {
        // change payloads never carry embedded relations
        if event.resource != self.query.resource || self.embeds_relations() {
            return Patch::Refetch;
        }
        match (event.kind, &event.new, &event.old) {
            (EventKind::Insert | EventKind::Update, Some(row), _) => {
                self.patch_upsert(current, row)
            }
            (EventKind::Delete, _, Some(old)) => {
                self.patch_delete(current, old)
            }
            _ => Patch::Refetch,
        }
    }
}

/// Number of rows matching a query's filters.
pub struct CountQuery {
    query: Query,
    events: Option<EventFilter>,
    policy: SyncPolicy,
}

impl CountQuery {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            events: None,
            policy: SyncPolicy::RefetchAll,
        }
    }

    pub fn subscribe_to(mut self, events: EventFilter) -> Self {
        self.events = Some(events);
        self
    }

    /// Recount only for inserts whose payload matches the filters, instead
    /// of on every event.
    pub fn patch_from_payload(mut self) -> Self {
        self.policy = SyncPolicy::PatchFromPayload;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl Fetch for CountQuery {
    type Output = u64;

    async fn fetch<B: Backend>(&self, backend: &B) -> Result<u64, ClientError> {
        backend.count(&self.query).await
    }

    fn describe(&self) -> String {
        format!("{} count", self.query.resource)
    }

    fn channel(&self) -> Option<Channel> {
        self.events.map(|events| Channel {
            resource: self.query.resource,
            events,
        })
    }

    fn preferred_policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Matching inserts recount. The count is never derived from a payload.
    fn patch(&self, _current: &u64, event: &ChangeEvent) -> Patch<u64> {
        match (event.kind, &event.new) {
            (EventKind::Insert, Some(row)) if !self.query.matches(row) => {
                Patch::Ignore
            }
            _ => Patch::Refetch,
        }
    }
}

/// Runs one [`Fetch`] and settles each result into the instance's cell.
pub struct QueryExecutor<B, F: Fetch> {
    backend: Arc<B>,
    fetch: Arc<F>,
    cell: StateCell<F::Output>,
    loading: LoadingPolicy,
    /// Set once any run of this mount has settled.
    settled: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    /// Sequence number of the latest run started.
    started: Arc<AtomicU64>,
    /// Sequence number of the run whose data is in the cell.
    shown: Arc<AtomicU64>,
}

impl<B, F: Fetch> Clone for QueryExecutor<B, F> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            fetch: self.fetch.clone(),
            cell: self.cell.clone(),
            loading: self.loading,
            settled: self.settled.clone(),
            in_flight: self.in_flight.clone(),
            started: self.started.clone(),
            shown: self.shown.clone(),
        }
    }
}

impl<B: Backend, F: Fetch> QueryExecutor<B, F> {
    pub fn new(
        backend: Arc<B>,
        fetch: Arc<F>,
        cell: StateCell<F::Output>,
        loading: LoadingPolicy,
    ) -> Self {
        Self {
            backend,
            fetch,
            cell,
            loading,
            settled: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicU64::new(0)),
            shown: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn fetch(&self) -> &F {
        &self.fetch
    }

    pub fn cell(&self) -> &StateCell<F::Output> {
        &self.cell
    }

    /// Fetch once and write the outcome. On failure the previous data stays
    /// and only the in-flight flags are cleared. Data read before the data
    /// already shown was read is discarded, so overlapping runs cannot
    /// roll the cell back.
    ///
    /// Returns whether the outcome was written, which is false once `token`
    /// is cancelled.
    pub async fn run(&self, token: &LifetimeToken) -> bool {
        let sequence = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let first = !self.settled.load(Ordering::SeqCst);
        let (loading, refreshing) = match self.loading {
            LoadingPolicy::EveryFetch => (true, false),
            LoadingPolicy::InitialOnly if first => (true, false),
            LoadingPolicy::InitialOnly => (false, true),
        };
        self.cell.set_flags(token, loading, refreshing);

        let result = self.fetch.fetch(self.backend.as_ref()).await;

        let data = match result {
            Ok(data) => Some(data),
            Err(e) => {
                log_error(
                    anyhow::Error::from(e).context(format!(
                        "Fetching {} failed",
                        self.fetch.describe()
                    )),
                );
                None
            }
        };

        // settled under the cell's lock so a concurrent patch sees either
        // this run in flight or its data in place
        let mut overtaken = false;
        let applied = self.cell.update(token, |state| {
            let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            if let Some(data) = data {
                if sequence > self.shown.load(Ordering::SeqCst) {
                    state.data = data;
                    self.shown.store(sequence, Ordering::SeqCst);
                } else {
                    overtaken = true;
                }
            }
            if remaining == 0 {
                state.loading = false;
                state.refreshing = false;
            }
        });
        if overtaken {
            tracing::debug!(
                fetch = self.fetch.describe(),
                "Discarding fetch result overtaken by a newer one"
            );
        }
        if applied {
            self.settled.store(true, Ordering::SeqCst);
        } else {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(
                fetch = self.fetch.describe(),
                "Discarding fetch result after unmount"
            );
        }
        applied
    }

    /// Apply a change payload to the data shown. Returns true when the
    /// change still needs a refetch.
    ///
    /// Patches are only applied while no run is in flight and turn into
    /// refetches otherwise.
    pub fn apply_change(
        &self,
        token: &LifetimeToken,
        event: &ChangeEvent,
    ) -> bool {
        let mut refetch = false;
        self.cell.update_if(token, |state| {
            let busy = self.in_flight.load(Ordering::SeqCst) > 0;
            match self.fetch.patch(&state.data, event) {
                Patch::Apply(_) if busy => {
                    refetch = true;
                    false
                }
                Patch::Apply(data) => {
                    state.data = data;
                    true
                }
                Patch::Ignore => false,
                Patch::Refetch => {
                    refetch = true;
                    false
                }
            }
        });
        refetch
    }
}
