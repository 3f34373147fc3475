//! An in-process [`Backend`] for tests.
//!
//! Tables are plain JSON rows evaluated with the same [`Query`] semantics
//! the REST dialect uses. Every insert is broadcast on the open channels of
//! its resource, and every call is counted so tests can assert on how the
//! hooks talk to the backend.

use payloads::query::SelectItem;
use payloads::{
    ChangeEvent, ClientError, EventFilter, Identity, Query, Resource,
};
use realtime::backend::{
    Backend, ChangeFeed, EVENT_CHANNEL_CAPACITY, SubscriptionId,
};
use realtime::time::TimeSource;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Calls observed by a [`MemoryBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub selects: usize,
    pub counts: usize,
    pub inserts: usize,
    pub identity_lookups: usize,
    pub channels_opened: usize,
    pub channels_closed: usize,
    /// Closes of channels that were never open or already closed.
    pub unknown_closes: usize,
    pub peak_open_channels: usize,
}

impl BackendStats {
    pub fn open_channels(&self) -> usize {
        self.channels_opened - self.channels_closed
    }

    /// Everything except closing channels.
    pub fn calls(&self) -> usize {
        self.selects
            + self.counts
            + self.inserts
            + self.identity_lookups
            + self.channels_opened
    }
}

/// Keeps one read pending until released or dropped.
pub struct ReadGate {
    release_tx: oneshot::Sender<()>,
}

impl ReadGate {
    pub fn release(self) {
        let _ = self.release_tx.send(());
    }
}

struct PendingGate {
    release_rx: oneshot::Receiver<()>,
    /// Compute the result when the read is issued rather than on release.
    stale: bool,
}

struct OpenChannel {
    resource: Resource,
    events: EventFilter,
    events_tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct State {
    tables: HashMap<Resource, Vec<Value>>,
    channels: HashMap<SubscriptionId, OpenChannel>,
    next_channel: u64,
    identity: Option<Identity>,
    failing_reads: usize,
    failing_writes: usize,
    failing_subscribes: usize,
    gates: VecDeque<PendingGate>,
    stats: BackendStats,
}

impl State {
    fn table(&self, resource: Resource) -> &[Value] {
        self.tables.get(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    fn broadcast(&self, event: ChangeEvent) {
        for (id, channel) in &self.channels {
            if channel.resource != event.resource
                || !channel.events.accepts(event.kind)
            {
                continue;
            }
            if let Err(e) = channel.events_tx.try_send(event.clone()) {
                tracing::warn!(%id, "Dropping change event: {e}");
            }
        }
    }
}

enum Relation {
    /// The row holds the key of one related row.
    ManyToOne(&'static str),
    /// Related rows hold the key of this row.
    OneToMany(&'static str),
}

fn relation(from: Resource, to: Resource) -> Option<Relation> {
    match (from, to) {
        (Resource::Posts, Resource::Profiles) => {
            Some(Relation::ManyToOne("user_id"))
        }
        (Resource::Posts, Resource::PostLikes)
        | (Resource::Posts, Resource::PostComments) => {
            Some(Relation::OneToMany("post_id"))
        }
        (Resource::TeamMembers, Resource::Teams) => {
            Some(Relation::ManyToOne("team_id"))
        }
        _ => None,
    }
}

pub fn bad_request(message: impl Into<String>) -> ClientError {
    ClientError::APIError(StatusCode::BAD_REQUEST, message.into())
}

fn injected_failure() -> ClientError {
    ClientError::APIError(
        StatusCode::SERVICE_UNAVAILABLE,
        "Injected failure".to_string(),
    )
}

pub struct MemoryBackend {
    state: Mutex<State>,
    time_source: TimeSource,
    pending_reads_tx: watch::Sender<usize>,
}

impl MemoryBackend {
    pub fn new(time_source: TimeSource) -> Self {
        let (pending_reads_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(State::default()),
            time_source,
            pending_reads_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn time_source(&self) -> &TimeSource {
        &self.time_source
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.lock().identity = identity;
    }

    /// Add rows without emitting change events.
    pub fn seed(
        &self,
        resource: Resource,
        rows: impl IntoIterator<Item = Value>,
    ) -> Result<(), ClientError> {
        let rows = rows
            .into_iter()
            .map(|row| self.complete_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.lock().tables.entry(resource).or_default().extend(rows);
        Ok(())
    }

    pub fn rows(&self, resource: Resource) -> Vec<Value> {
        self.lock().table(resource).to_vec()
    }

    /// Merge `changes` into the row with the given id and emit an update.
    pub fn update_row(
        &self,
        resource: Resource,
        id: &str,
        changes: Value,
    ) -> Option<Value> {
        let mut state = self.lock();
        let row = state
            .tables
            .get_mut(&resource)?
            .iter_mut()
            .find(|row| row_id(row) == Some(id))?;
        let old = row.clone();
        if let (Value::Object(fields), Value::Object(changes)) =
            (&mut *row, changes)
        {
            fields.extend(changes);
        }
        let new = row.clone();
        state.broadcast(ChangeEvent::update(
            resource,
            old,
            new.clone(),
            self.time_source.now(),
        ));
        Some(new)
    }

    /// Remove the row with the given id and emit a delete.
    pub fn delete_row(&self, resource: Resource, id: &str) -> Option<Value> {
        let mut state = self.lock();
        let table = state.tables.get_mut(&resource)?;
        let index = table.iter().position(|row| row_id(row) == Some(id))?;
        let old = table.remove(index);
        state.broadcast(ChangeEvent::delete(
            resource,
            old.clone(),
            self.time_source.now(),
        ));
        Some(old)
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    pub fn fail_next_subscribes(&self, count: usize) {
        self.lock().failing_subscribes = count;
    }

    /// Hold the next read pending until the gate is released. The result
    /// reflects the tables at release time.
    pub fn gate_next_read(&self) -> ReadGate {
        self.push_gate(false)
    }

    /// Hold the next read pending like a slow response: its result reflects
    /// the tables when the read was issued and is delivered on release.
    pub fn stall_next_read(&self) -> ReadGate {
        self.push_gate(true)
    }

    fn push_gate(&self, stale: bool) -> ReadGate {
        let (release_tx, release_rx) = oneshot::channel();
        self.lock().gates.push_back(PendingGate { release_rx, stale });
        ReadGate { release_tx }
    }

    /// Wait until at least `count` reads are held by gates.
    pub async fn wait_for_pending_reads(&self, count: usize) {
        let mut pending_rx = self.pending_reads_tx.subscribe();
        let _ = pending_rx.wait_for(|pending| *pending >= count).await;
    }

    pub fn stats(&self) -> BackendStats {
        self.lock().stats
    }

    pub fn open_channels(&self, resource: Resource) -> usize {
        self.lock()
            .channels
            .values()
            .filter(|channel| channel.resource == resource)
            .count()
    }

    fn complete_row(&self, row: Value) -> Result<Value, ClientError> {
        let Value::Object(mut fields) = row else {
            return Err(bad_request("Rows must be JSON objects"));
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields.entry("created_at").or_insert_with(|| {
            Value::String(self.time_source.now().to_string())
        });
        Ok(Value::Object(fields))
    }

    async fn read<T>(
        &self,
        count_call: impl FnOnce(&mut BackendStats),
        compute: impl Fn(&State) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let (early, gate) = {
            let mut state = self.lock();
            count_call(&mut state.stats);
            let gate = state.gates.pop_front();
            let early = if state.failing_reads > 0 {
                state.failing_reads -= 1;
                Some(Err(injected_failure()))
            } else if gate.as_ref().is_some_and(|gate| gate.stale) {
                Some(compute(&state))
            } else {
                None
            };
            (early, gate)
        };
        if let Some(gate) = gate {
            self.pending_reads_tx.send_modify(|pending| *pending += 1);
            // a dropped gate releases too
            let _ = gate.release_rx.await;
            self.pending_reads_tx.send_modify(|pending| *pending -= 1);
        }
        match early {
            Some(result) => result,
            None => compute(&self.lock()),
        }
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn select_rows(
    state: &State,
    query: &Query,
) -> Result<Vec<Value>, ClientError> {
    let mut rows: Vec<&Value> = state
        .table(query.resource)
        .iter()
        .filter(|row| query.matches(row))
        .collect();
    if let Some(order) = &query.order {
        rows.sort_by(|a, b| order.compare(a, b));
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    let items = query.select_items();
    rows.into_iter()
        .map(|row| project(state, query.resource, row, &items))
        .collect()
}

fn project(
    state: &State,
    resource: Resource,
    row: &Value,
    items: &[SelectItem],
) -> Result<Value, ClientError> {
    let mut projected = Map::new();
    for item in items {
        match item {
            SelectItem::All => {
                if let Value::Object(fields) = row {
                    projected.extend(fields.clone());
                }
            }
            SelectItem::Column(column) => {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                projected.insert(column.clone(), value);
            }
            SelectItem::Embed { resource: name, columns } => {
                let related: Resource =
                    name.parse().map_err(|e| bad_request(format!("{e}")))?;
                let embedded = embed(state, resource, row, related, columns)?;
                projected.insert(name.clone(), embedded);
            }
        }
    }
    Ok(Value::Object(projected))
}

fn embed(
    state: &State,
    resource: Resource,
    row: &Value,
    related: Resource,
    columns: &[SelectItem],
) -> Result<Value, ClientError> {
    let candidates = state.table(related);
    match relation(resource, related) {
        Some(Relation::ManyToOne(foreign_key)) => {
            let key = row.get(foreign_key).filter(|key| !key.is_null());
            match candidates
                .iter()
                .find(|candidate| key.is_some() && candidate.get("id") == key)
            {
                Some(found) => project(state, related, found, columns),
                None => Ok(Value::Null),
            }
        }
        Some(Relation::OneToMany(foreign_key)) => {
            let id = row.get("id").filter(|id| !id.is_null());
            candidates
                .iter()
                .filter(|candidate| {
                    id.is_some() && candidate.get(foreign_key) == id
                })
                .map(|candidate| project(state, related, candidate, columns))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        None => Err(bad_request(format!(
            "Could not find a relationship between {resource} and {related}"
        ))),
    }
}

impl Backend for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, ClientError> {
        self.read(
            |stats| stats.selects += 1,
            |state| select_rows(state, query),
        )
        .await
    }

    async fn count(&self, query: &Query) -> Result<u64, ClientError> {
        self.read(
            |stats| stats.counts += 1,
            |state| {
                let count = state
                    .table(query.resource)
                    .iter()
                    .filter(|row| query.matches(row))
                    .count();
                Ok(count as u64)
            },
        )
        .await
    }

    async fn insert(
        &self,
        resource: Resource,
        row: Value,
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.stats.inserts += 1;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(injected_failure());
        }
        let row = self.complete_row(row)?;
        state.tables.entry(resource).or_default().push(row.clone());
        state.broadcast(ChangeEvent::insert(
            resource,
            row,
            self.time_source.now(),
        ));
        Ok(())
    }

    async fn subscribe(
        &self,
        resource: Resource,
        events: EventFilter,
    ) -> Result<ChangeFeed, ClientError> {
        let mut state = self.lock();
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return Err(injected_failure());
        }
        state.next_channel += 1;
        let id = SubscriptionId(state.next_channel);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        state.channels.insert(
            id,
            OpenChannel {
                resource,
                events,
                events_tx,
            },
        );
        state.stats.channels_opened += 1;
        state.stats.peak_open_channels =
            state.stats.peak_open_channels.max(state.channels.len());
        Ok(ChangeFeed {
            id,
            events: events_rx,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.lock();
        if state.channels.remove(&id).is_some() {
            state.stats.channels_closed += 1;
        } else {
            state.stats.unknown_closes += 1;
        }
    }

    async fn current_user(&self) -> Result<Option<Identity>, ClientError> {
        let mut state = self.lock();
        state.stats.identity_lookups += 1;
        Ok(state.identity.clone())
    }
}
