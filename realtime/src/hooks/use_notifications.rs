use payloads::{Direction, EventFilter, Identity, Notification, Query};
use payloads::{Resource, UserId};
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::ListQuery;
use crate::live_query::{LiveQuery, SyncOptions};

const NOTIFICATION_LIMIT: usize = 50;

/// The latest notifications addressed to one user, newest first.
pub fn notifications_query(user_id: UserId) -> ListQuery<Notification> {
    ListQuery::new(
        Query::new(Resource::Notifications)
            .eq("user_id", user_id)
            .order("created_at", Direction::Descending)
            .limit(NOTIFICATION_LIMIT),
    )
    .subscribe_to(EventFilter::Insert)
    .patch_from_payload()
}

pub type NotificationsHook<B> = LiveQuery<B, ListQuery<Notification>>;

pub fn use_notifications<B: Backend>(
    backend: Arc<B>,
    identity: Option<&Identity>,
    options: SyncOptions,
) -> NotificationsHook<B> {
    LiveQuery::mount(
        backend,
        identity.map(|identity| notifications_query(identity.id)),
        options,
    )
}
