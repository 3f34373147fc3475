use payloads::{Activity, Direction, EventFilter, Identity, Query, Resource};
use payloads::UserId;
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::ListQuery;
use crate::live_query::{LiveQuery, SyncOptions};

const RECENT_ACTIVITY_LIMIT: usize = 10;

/// "Recent activity" of one user, newest first.
pub fn activities_query(user_id: UserId) -> ListQuery<Activity> {
    ListQuery::new(
        Query::new(Resource::Activities)
            .eq("user_id", user_id)
            .order("created_at", Direction::Descending)
            .limit(RECENT_ACTIVITY_LIMIT),
    )
    .subscribe_to(EventFilter::Insert)
    .patch_from_payload()
}

pub type ActivitiesHook<B> = LiveQuery<B, ListQuery<Activity>>;

pub fn use_activities<B: Backend>(
    backend: Arc<B>,
    identity: Option<&Identity>,
    options: SyncOptions,
) -> ActivitiesHook<B> {
    LiveQuery::mount(
        backend,
        identity.map(|identity| activities_query(identity.id)),
        options,
    )
}
