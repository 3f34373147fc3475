use payloads::{
    ClientError, Identity, ProfileStats, Query, Resource, UserId,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::Fetch;
use crate::live_query::{LiveQuery, SyncOptions};

/// Totals for the profile page, counted concurrently. Not kept live.
#[derive(Debug, Clone)]
pub struct ProfileStatsQuery {
    user_id: UserId,
}

impl ProfileStatsQuery {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn owned_by(resource: Resource, user_id: UserId) -> Query {
        Query::new(resource).select("id").eq("user_id", user_id)
    }
}

impl Fetch for ProfileStatsQuery {
    type Output = ProfileStats;

    async fn fetch<B: Backend>(
        &self,
        backend: &B,
    ) -> Result<ProfileStats, ClientError> {
        let teams = Self::owned_by(Resource::TeamMembers, self.user_id);
        let notes = Self::owned_by(Resource::Notes, self.user_id);
        let posts = Self::owned_by(Resource::Posts, self.user_id);
        let conversations =
            Self::owned_by(Resource::AiConversations, self.user_id);

        let (teams_joined, notes_created, posts_created, ai_conversations) =
            tokio::try_join!(
                backend.count(&teams),
                backend.count(&notes),
                backend.count(&posts),
                backend.count(&conversations),
            )?;
        Ok(ProfileStats {
            teams_joined,
            notes_created,
            posts_created,
            ai_conversations,
        })
    }

    fn describe(&self) -> String {
        format!("profile stats of {}", self.user_id)
    }
}

pub type ProfileStatsHook<B> = LiveQuery<B, ProfileStatsQuery>;

pub fn use_profile_stats<B: Backend>(
    backend: Arc<B>,
    identity: Option<&Identity>,
    options: SyncOptions,
) -> ProfileStatsHook<B> {
    LiveQuery::mount(
        backend,
        identity.map(|identity| ProfileStatsQuery::new(identity.id)),
        options,
    )
}
