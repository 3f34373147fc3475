use payloads::{
    ClientError, Direction, EventFilter, Identity, Query, Resource, Team,
    TeamMembership, TeamsView, UserId,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::{Channel, Fetch, decode_rows};
use crate::live_query::{LiveQuery, SyncOptions};

/// Number of recently created teams shown next to the user's own.
const RECENT_TEAMS: usize = 6;

/// Recent teams plus the teams one user is a member of.
///
/// Membership payloads carry no team rows, so changes always refetch.
#[derive(Debug, Clone)]
pub struct TeamsQuery {
    user_id: UserId,
}

impl TeamsQuery {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn recent_teams() -> Query {
        Query::new(Resource::Teams)
            .order("created_at", Direction::Descending)
            .limit(RECENT_TEAMS)
    }

    pub fn memberships(user_id: UserId) -> Query {
        Query::new(Resource::TeamMembers)
            .select("team_id, teams(*)")
            .eq("user_id", user_id)
    }
}

impl Fetch for TeamsQuery {
    type Output = TeamsView;

    async fn fetch<B: Backend>(
        &self,
        backend: &B,
    ) -> Result<TeamsView, ClientError> {
        let recent = Self::recent_teams();
        let memberships = Self::memberships(self.user_id);
        let (teams, memberships) = tokio::try_join!(
            backend.select(&recent),
            backend.select(&memberships),
        )?;

        let memberships: Vec<TeamMembership> = decode_rows(memberships)?;
        Ok(TeamsView {
            teams: decode_rows::<Team>(teams)?,
            // teams hidden from the user come back as null
            user_teams: memberships
                .into_iter()
                .filter_map(|membership| membership.teams)
                .collect(),
        })
    }

    fn describe(&self) -> String {
        format!("teams of {}", self.user_id)
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel {
            resource: Resource::TeamMembers,
            events: EventFilter::Any,
        })
    }
}

pub type TeamsHook<B> = LiveQuery<B, TeamsQuery>;

/// Teams for the dashboard. Stays empty without an identity.
pub fn use_teams<B: Backend>(
    backend: Arc<B>,
    identity: Option<&Identity>,
    options: SyncOptions,
) -> TeamsHook<B> {
    LiveQuery::mount(
        backend,
        identity.map(|identity| TeamsQuery::new(identity.id)),
        options,
    )
}
