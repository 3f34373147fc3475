pub mod api_client;
pub mod events;
pub mod query;
pub mod requests;

pub use api_client::{ChangeStream, ClientError, RestClient};
pub use events::{ChangeEvent, EventFilter, EventKind};
pub use query::{Direction, Filter, FilterOp, Order, Query, Resource};

use derive_more::Display;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id type wrappers help ensure we don't mix up ids for different tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TeamId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActivityId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

/// A row the client holds a read-only copy of.
///
/// The identity is a stable opaque string so that rows of any table can be
/// matched against change payloads without knowing the id type.
pub trait Record:
    Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static
{
    /// Column holding the identity in change payloads.
    const KEY: &'static str = "id";

    fn record_id(&self) -> String;
}

/// The currently authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub avatar_url: Option<String>,
    pub is_private: Option<bool>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub member_count: Option<u32>,
}

impl Record for Team {
    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

/// A `team_members` row with its team embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: TeamId,
    /// Missing when the team is not visible to the current user.
    pub teams: Option<Team>,
}

impl Record for TeamMembership {
    const KEY: &'static str = "team_id";

    fn record_id(&self) -> String {
        self.team_id.to_string()
    }
}

/// Teams shown on the dashboard: recently created teams plus the teams the
/// current user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamsView {
    pub teams: Vec<Team>,
    pub user_teams: Vec<Team>,
}

/// Public profile details embedded into a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl PostAuthor {
    /// Display name if set, username otherwise.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Reference to an embedded row that only carries its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub profiles: Option<PostAuthor>,
    #[serde(default)]
    pub post_likes: Vec<RowRef>,
    #[serde(default)]
    pub post_comments: Vec<RowRef>,
}

impl Post {
    pub fn like_count(&self) -> usize {
        self.post_likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.post_comments.len()
    }
}

impl Record for Post {
    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: Timestamp,
}

impl Record for Notification {
    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Message,
    Note,
    TeamJoin,
    #[serde(other)]
    Other,
}

/// An entry of the "recent activity" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub created_at: Timestamp,
}

impl Record for Activity {
    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
}

impl Record for ChannelMessage {
    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

/// Per-user totals shown on the profile page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub teams_joined: u64,
    pub notes_created: u64,
    pub posts_created: u64,
    pub ai_conversations: u64,
}
