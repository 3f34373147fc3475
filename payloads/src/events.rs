use derive_more::Display;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::Resource;

/// The kind of mutation a change event reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    #[display("INSERT")]
    Insert,
    #[display("UPDATE")]
    Update,
    #[display("DELETE")]
    Delete,
}

/// Which events a push channel delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventFilter {
    #[display("INSERT")]
    Insert,
    #[display("UPDATE")]
    Update,
    #[display("DELETE")]
    Delete,
    #[display("*")]
    Any,
}

impl EventFilter {
    pub fn accepts(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (EventFilter::Any, _)
                | (EventFilter::Insert, EventKind::Insert)
                | (EventFilter::Update, EventKind::Update)
                | (EventFilter::Delete, EventKind::Delete)
        )
    }
}

impl FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(EventFilter::Insert),
            "UPDATE" => Ok(EventFilter::Update),
            "DELETE" => Ok(EventFilter::Delete),
            "*" => Ok(EventFilter::Any),
            other => Err(format!("Unsupported event filter '{other}'")),
        }
    }
}

/// A change notification delivered on a push channel.
///
/// `new` carries the row after an insert or update, `old` the row before an
/// update or delete. Payloads never include embedded relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub resource: Resource,
    pub kind: EventKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
    pub committed_at: Timestamp,
}

impl ChangeEvent {
    pub fn insert(resource: Resource, row: Value, at: Timestamp) -> Self {
        Self {
            resource,
            kind: EventKind::Insert,
            new: Some(row),
            old: None,
            committed_at: at,
        }
    }

    pub fn update(
        resource: Resource,
        old: Value,
        new: Value,
        at: Timestamp,
    ) -> Self {
        Self {
            resource,
            kind: EventKind::Update,
            new: Some(new),
            old: Some(old),
            committed_at: at,
        }
    }

    pub fn delete(resource: Resource, old: Value, at: Timestamp) -> Self {
        Self {
            resource,
            kind: EventKind::Delete,
            new: None,
            old: Some(old),
            committed_at: at,
        }
    }
}
