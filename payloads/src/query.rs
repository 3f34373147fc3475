//! Description of a single read against an external table.
//!
//! A [`Query`] is built once per hook instance and reused verbatim for every
//! fetch. It renders to PostgREST-style parameters for the HTTP client and
//! can also be evaluated directly against JSON rows, which is what the
//! in-memory backend and payload patching rely on.

use derive_more::Display;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

/// A named external collection of rows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    #[display("teams")]
    Teams,
    #[display("team_members")]
    TeamMembers,
    #[display("posts")]
    Posts,
    #[display("post_likes")]
    PostLikes,
    #[display("post_comments")]
    PostComments,
    #[display("profiles")]
    Profiles,
    #[display("notifications")]
    Notifications,
    #[display("activities")]
    Activities,
    #[display("channel_messages")]
    ChannelMessages,
    #[display("notes")]
    Notes,
    #[display("ai_conversations")]
    AiConversations,
}

impl Resource {
    pub const ALL: [Resource; 11] = [
        Resource::Teams,
        Resource::TeamMembers,
        Resource::Posts,
        Resource::PostLikes,
        Resource::PostComments,
        Resource::Profiles,
        Resource::Notifications,
        Resource::Activities,
        Resource::ChannelMessages,
        Resource::Notes,
        Resource::AiConversations,
    ];
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown resource '{0}'")]
pub struct UnknownResource(pub String);

impl FromStr for Resource {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|resource| resource.to_string() == s)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FilterOp {
    #[display("eq")]
    Eq,
    #[display("neq")]
    Neq,
    #[display("gte")]
    Gte,
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "neq" => Ok(FilterOp::Neq),
            "gte" => Ok(FilterOp::Gte),
            other => Err(format!("Unsupported filter operator '{other}'")),
        }
    }
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// A value that fails to serialize is logged and replaced by null, which
    /// no row matches.
    pub fn new(column: &str, op: FilterOp, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            tracing::error!(column, %op, "Filter value did not serialize: {e}");
            Value::Null
        });
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    /// Evaluate the predicate against a row. A missing or null column never
    /// matches, like SQL comparisons against NULL.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let ordering = compare_values(actual, &self.value);
        match self.op {
            FilterOp::Eq => ordering == Some(Ordering::Equal),
            FilterOp::Neq => {
                matches!(ordering, Some(Ordering::Less | Ordering::Greater))
            }
            FilterOp::Gte => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }

    /// Parse the `op.value` form used in query strings.
    pub fn parse_param(column: &str, param: &str) -> Result<Self, String> {
        let (op, value) = param
            .split_once('.')
            .ok_or_else(|| format!("Malformed filter '{column}={param}'"))?;
        Ok(Self {
            column: column.to_string(),
            op: op.parse()?,
            value: Value::String(value.to_string()),
        })
    }

    fn to_param(&self) -> (String, String) {
        (self.column.clone(), format!("{}.{}", self.op, render(&self.value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[display("asc")]
    Ascending,
    #[display("desc")]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    /// Parse the `column.direction` form used in query strings.
    pub fn parse_param(param: &str) -> Result<Self, String> {
        let (column, direction) = match param.rsplit_once('.') {
            Some((column, "asc")) => (column, Direction::Ascending),
            Some((column, "desc")) => (column, Direction::Descending),
            _ => (param, Direction::Ascending),
        };
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }

    /// Compare two rows by the order column. Rows missing the column sort
    /// last regardless of direction.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let a = a.get(&self.column).filter(|v| !v.is_null());
        let b = b.get(&self.column).filter(|v| !v.is_null());
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                match self.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            }
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// `*`
    All,
    Column(String),
    /// A related resource embedded into each row, e.g. `profiles(username)`.
    Embed {
        resource: String,
        columns: Vec<SelectItem>,
    },
}

/// Parse a select list such as `*, profiles(username, avatar_url)`.
pub fn parse_select(select: &str) -> Vec<SelectItem> {
    split_top_level(select)
        .into_iter()
        .filter_map(|item| {
            let item = item.trim();
            if item.is_empty() {
                None
            } else if item == "*" {
                Some(SelectItem::All)
            } else if let Some((name, rest)) = item.split_once('(') {
                let inner = rest.strip_suffix(')').unwrap_or(rest);
                Some(SelectItem::Embed {
                    resource: name.trim().to_string(),
                    columns: parse_select(inner),
                })
            } else {
                Some(SelectItem::Column(item.to_string()))
            }
        })
        .collect()
}

fn split_top_level(select: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in select.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&select[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&select[start..]);
    items
}

/// A read against one resource: select list, filters, ordering and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub resource: Resource,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Serialize) -> Self {
        self.filters.push(Filter::new(column, FilterOp::Eq, value));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Serialize) -> Self {
        self.filters.push(Filter::new(column, FilterOp::Neq, value));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Serialize) -> Self {
        self.filters.push(Filter::new(column, FilterOp::Gte, value));
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the row satisfies every filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }

    pub fn select_items(&self) -> Vec<SelectItem> {
        parse_select(&self.columns)
    }

    /// Query string parameters in the PostgREST dialect.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), compact(&self.columns))];
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(order) = &self.order {
            params.push((
                "order".to_string(),
                format!("{}.{}", order.column, order.direction),
            ));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Rebuild a query from query string parameters.
    pub fn from_params(
        resource: Resource,
        params: &[(String, String)],
    ) -> Result<Self, String> {
        let mut query = Query::new(resource);
        for (key, value) in params {
            match key.as_str() {
                "select" => query.columns = value.clone(),
                "order" => query.order = Some(Order::parse_param(value)?),
                "limit" => {
                    query.limit = Some(value.parse().map_err(|_| {
                        format!("Invalid limit '{value}'")
                    })?)
                }
                column => {
                    query.filters.push(Filter::parse_param(column, value)?)
                }
            }
        }
        Ok(query)
    }
}

fn compact(columns: &str) -> String {
    columns.chars().filter(|c| !c.is_whitespace()).collect()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare two JSON scalars. Strings that both parse as timestamps compare
/// as instants, numbers compare numerically. Mixed or null values are
/// incomparable unless they are equal.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => {
            match (a.parse::<Timestamp>(), b.parse::<Timestamp>()) {
                (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        // query string values arrive as strings
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        (Value::Bool(a), Value::String(b)) => {
            Some(a.cmp(&b.parse::<bool>().ok()?))
        }
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}
