use jiff::Timestamp;
use payloads::requests::NewChannelMessage;
use payloads::{
    ChannelId, ClientError, EventFilter, Identity, Query, Resource, UserId,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::CountQuery;
use crate::live_query::{LiveQuery, SyncOptions};
use crate::mutation::{MutationIssuer, MutationOutcome};
use crate::view_state::{ViewState, ViewStateReader};

/// Messages one user sent since `since`.
///
/// Only inserts whose payload belongs to the user trigger a recount, so
/// messages of other users never cause a read.
pub fn messages_today_query(user_id: UserId, since: Timestamp) -> CountQuery {
    CountQuery::new(
        Query::new(Resource::ChannelMessages)
            .eq("user_id", user_id)
            .gte("created_at", since),
    )
    .subscribe_to(EventFilter::Insert)
    .patch_from_payload()
}

pub struct MessageStatsHook<B: Backend> {
    live: LiveQuery<B, CountQuery>,
    issuer: MutationIssuer<B>,
    identity: Option<Identity>,
    since: Timestamp,
}

impl<B: Backend> MessageStatsHook<B> {
    pub fn live(&self) -> &LiveQuery<B, CountQuery> {
        &self.live
    }

    pub fn reader(&self) -> ViewStateReader<u64> {
        self.live.reader()
    }

    pub fn state(&self) -> ViewState<u64> {
        self.live.state()
    }

    pub fn messages_today(&self) -> u64 {
        self.live.state().data
    }

    pub async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<MutationOutcome, ClientError> {
        self.issuer
            .insert(self.identity.as_ref(), |identity| NewChannelMessage {
                channel_id,
                user_id: identity.id,
                content: content.to_string(),
            })
            .await
    }

    pub async fn set_identity(&mut self, identity: Option<Identity>) {
        let since = self.since;
        let fetch = identity
            .as_ref()
            .map(|identity| messages_today_query(identity.id, since));
        self.live.remount(fetch).await;
        self.identity = identity;
    }

    pub async fn unmount(self) {
        self.live.unmount().await;
    }
}

/// Count of the user's messages since the start of the day `since` marks.
pub fn use_message_stats<B: Backend>(
    backend: Arc<B>,
    identity: Option<Identity>,
    since: Timestamp,
    options: SyncOptions,
) -> MessageStatsHook<B> {
    let fetch = identity
        .as_ref()
        .map(|identity| messages_today_query(identity.id, since));
    MessageStatsHook {
        live: LiveQuery::mount(backend.clone(), fetch, options),
        issuer: MutationIssuer::new(backend, Resource::ChannelMessages),
        identity,
        since,
    }
}
