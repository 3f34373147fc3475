use jiff::Timestamp;
use payloads::Identity;
use std::sync::Arc;

use super::use_activities::{ActivitiesHook, activities_query, use_activities};
use super::use_message_stats::{MessageStatsHook, use_message_stats};
use super::use_teams::{TeamsHook, TeamsQuery, use_teams};
use crate::backend::Backend;
use crate::live_query::SyncOptions;

/// Everything the dashboard shows, mounted and unmounted together.
pub struct Dashboard<B: Backend> {
    pub teams: TeamsHook<B>,
    pub activities: ActivitiesHook<B>,
    pub messages: MessageStatsHook<B>,
}

impl<B: Backend> Dashboard<B> {
    pub fn is_loading(&self) -> bool {
        self.teams.state().loading
            || self.activities.state().loading
            || self.messages.state().loading
    }

    /// Rescope every part to a new identity.
    pub async fn set_identity(&mut self, identity: Option<Identity>) {
        let user_id = identity.as_ref().map(|identity| identity.id);
        tokio::join!(
            self.teams.remount(user_id.map(TeamsQuery::new)),
            self.activities.remount(user_id.map(activities_query)),
            self.messages.set_identity(identity),
        );
    }

    pub async fn unmount(self) {
        tokio::join!(
            self.teams.unmount(),
            self.activities.unmount(),
            self.messages.unmount(),
        );
    }
}

pub fn use_dashboard<B: Backend>(
    backend: Arc<B>,
    identity: Option<Identity>,
    today: Timestamp,
    options: SyncOptions,
) -> Dashboard<B> {
    Dashboard {
        teams: use_teams(backend.clone(), identity.as_ref(), options),
        activities: use_activities(backend.clone(), identity.as_ref(), options),
        messages: use_message_stats(backend, identity, today, options),
    }
}
