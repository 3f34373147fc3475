//! Mock data for the collaboration suite
//!
//! Used by the dev-server and by tests that want a populated backend:
//! - Three users (Alice, Bob, Charlie) with profiles
//! - Teams, some of which Alice belongs to
//! - A feed of posts with likes and comments
//! - Notifications, recent activity and channel messages for Alice

use anyhow::Result;
use jiff::{Span, Timestamp};
use payloads::{Identity, Resource};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::memory::MemoryBackend;
use crate::{alice, bob, charlie};

pub struct DevDataset {
    pub alice: Identity,
    pub bob: Identity,
    pub charlie: Identity,
    pub design_team: Uuid,
    pub platform_team: Uuid,
    pub general_channel: Uuid,
    pub posts: Vec<Uuid>,
}

fn hours_ago(now: Timestamp, hours: i64) -> Result<String> {
    Ok(now.checked_sub(Span::new().hours(hours))?.to_string())
}

impl DevDataset {
    /// Seeds the backend without emitting change events.
    pub fn create(backend: &MemoryBackend) -> Result<Self> {
        let now = backend.time_source().now();
        let (alice, bob, charlie) = (alice(), bob(), charlie());

        tracing::info!("👤 Creating profiles for Alice, Bob and Charlie");
        backend.seed(
            Resource::Profiles,
            [
                profile(&alice, "alice", Some("Alice Liddell")),
                profile(&bob, "bob", Some("Bob Builder")),
                profile(&charlie, "charlie", None),
            ],
        )?;

        tracing::info!("👥 Creating teams");
        let design_team = Uuid::new_v4();
        let platform_team = Uuid::new_v4();
        let research_team = Uuid::new_v4();
        backend.seed(
            Resource::Teams,
            [
                team(design_team, "Design", "design", hours_ago(now, 72)?),
                team(
                    platform_team,
                    "Platform",
                    "engineering",
                    hours_ago(now, 48)?,
                ),
                team(research_team, "Research", "science", hours_ago(now, 6)?),
            ],
        )?;
        backend.seed(
            Resource::TeamMembers,
            [
                member(design_team, &alice),
                member(platform_team, &alice),
                member(platform_team, &bob),
                member(research_team, &charlie),
            ],
        )?;

        tracing::info!("📝 Creating the feed");
        let posts = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        backend.seed(
            Resource::Posts,
            [
                post(
                    posts[0],
                    &bob,
                    "Shipped the new onboarding flow",
                    hours_ago(now, 30)?,
                ),
                post(
                    posts[1],
                    &charlie,
                    "Reading group moves to Thursdays",
                    hours_ago(now, 5)?,
                ),
                post(
                    posts[2],
                    &alice,
                    "Looking for feedback on the design kit",
                    hours_ago(now, 1)?,
                ),
            ],
        )?;
        backend.seed(
            Resource::PostLikes,
            [
                json!({ "post_id": posts[0], "user_id": alice.id }),
                json!({ "post_id": posts[0], "user_id": charlie.id }),
                json!({ "post_id": posts[2], "user_id": bob.id }),
            ],
        )?;
        backend.seed(
            Resource::PostComments,
            [json!({
                "post_id": posts[2],
                "user_id": bob.id,
                "content": "Happy to review it tomorrow",
            })],
        )?;

        tracing::info!("🔔 Creating notifications and activity for Alice");
        backend.seed(
            Resource::Notifications,
            [
                json!({
                    "user_id": alice.id,
                    "kind": "mention",
                    "title": "Bob mentioned you in #general",
                    "body": "Can you take a look?",
                    "read": false,
                    "created_at": hours_ago(now, 2)?,
                }),
                json!({
                    "user_id": alice.id,
                    "kind": "team_invite",
                    "title": "You joined Platform",
                    "body": null,
                    "read": true,
                    "created_at": hours_ago(now, 48)?,
                }),
            ],
        )?;
        backend.seed(
            Resource::Activities,
            [
                activity(
                    &alice,
                    "team_join",
                    "Joined Platform",
                    hours_ago(now, 48)?,
                ),
                activity(
                    &alice,
                    "note",
                    "Created note \"Sprint goals\"",
                    hours_ago(now, 20)?,
                ),
                activity(
                    &alice,
                    "message",
                    "Posted in #general",
                    hours_ago(now, 3)?,
                ),
            ],
        )?;

        tracing::info!("💬 Creating channel messages");
        let general_channel = Uuid::new_v4();
        backend.seed(
            Resource::ChannelMessages,
            [
                message(
                    general_channel,
                    &alice,
                    "Morning all",
                    hours_ago(now, 26)?,
                ),
                message(
                    general_channel,
                    &alice,
                    "Standup in 5",
                    hours_ago(now, 3)?,
                ),
                message(general_channel, &bob, "On my way", hours_ago(now, 2)?),
            ],
        )?;
        backend.seed(
            Resource::Notes,
            [json!({ "user_id": alice.id, "title": "Sprint goals" })],
        )?;
        backend.seed(
            Resource::AiConversations,
            [json!({ "user_id": alice.id, "title": "Release notes draft" })],
        )?;

        Ok(Self {
            alice,
            bob,
            charlie,
            design_team,
            platform_team,
            general_channel,
            posts,
        })
    }

    pub fn print_summary(&self) {
        tracing::info!("📋 Available test data:");
        tracing::info!(
            "   👤 Alice ({}): member of Design ({}) and Platform ({})",
            self.alice.id,
            self.design_team,
            self.platform_team
        );
        tracing::info!("   👤 Bob ({}): member of Platform", self.bob.id);
        tracing::info!(
            "   👤 Charlie ({}): member of Research",
            self.charlie.id
        );
        tracing::info!("   📝 {} posts in the feed", self.posts.len());
        tracing::info!("   💬 #general channel ({})", self.general_channel);
        tracing::info!("   🔑 Access tokens are the user ids above");
    }
}

fn profile(identity: &Identity, username: &str, name: Option<&str>) -> Value {
    json!({
        "id": identity.id,
        "username": username,
        "display_name": name,
        "avatar_url": null,
    })
}

fn team(id: Uuid, name: &str, category: &str, created_at: String) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": format!("The {name} team"),
        "category": category,
        "avatar_url": null,
        "is_private": false,
        "created_at": created_at,
    })
}

fn member(team_id: Uuid, identity: &Identity) -> Value {
    json!({ "team_id": team_id, "user_id": identity.id })
}

fn post(
    id: Uuid,
    author: &Identity,
    content: &str,
    created_at: String,
) -> Value {
    json!({
        "id": id,
        "user_id": author.id,
        "content": content,
        "image_url": null,
        "created_at": created_at,
    })
}

fn activity(
    identity: &Identity,
    kind: &str,
    description: &str,
    created_at: String,
) -> Value {
    json!({
        "user_id": identity.id,
        "type": kind,
        "description": description,
        "created_at": created_at,
    })
}

fn message(
    channel_id: Uuid,
    author: &Identity,
    content: &str,
    created_at: String,
) -> Value {
    json!({
        "channel_id": channel_id,
        "user_id": author.id,
        "content": content,
        "created_at": created_at,
    })
}
