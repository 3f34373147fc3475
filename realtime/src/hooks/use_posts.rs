use payloads::requests::NewPost;
use payloads::{
    ClientError, Direction, EventFilter, Identity, Post, Query, Resource,
};
use std::sync::Arc;

use crate::backend::Backend;
use crate::executor::ListQuery;
use crate::live_query::{LiveQuery, SyncOptions};
use crate::mutation::{MutationIssuer, MutationOutcome};
use crate::view_state::{ViewState, ViewStateReader};

const FEED_LIMIT: usize = 20;

/// The social feed: newest posts with author, likes and comments embedded.
pub fn posts_query() -> ListQuery<Post> {
    ListQuery::new(
        Query::new(Resource::Posts)
            .select(
                "*, profiles (username, display_name, avatar_url), \
                 post_likes (id), post_comments (id)",
            )
            .order("created_at", Direction::Descending)
            .limit(FEED_LIMIT),
    )
    .subscribe_to(EventFilter::Insert)
}

/// The feed plus the ability to post into it.
///
/// A new post shows up only once its insert event triggered a refetch.
pub struct PostsHook<B: Backend> {
    live: LiveQuery<B, ListQuery<Post>>,
    issuer: MutationIssuer<B>,
    identity: Option<Identity>,
}

impl<B: Backend> PostsHook<B> {
    pub fn live(&self) -> &LiveQuery<B, ListQuery<Post>> {
        &self.live
    }

    pub fn reader(&self) -> ViewStateReader<Vec<Post>> {
        self.live.reader()
    }

    pub fn state(&self) -> ViewState<Vec<Post>> {
        self.live.state()
    }

    /// Publish a post as the signed-in user. An empty image url is stored
    /// as null.
    pub async fn create_post(
        &self,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<MutationOutcome, ClientError> {
        self.issuer
            .insert(self.identity.as_ref(), |identity| NewPost {
                user_id: identity.id,
                content: content.to_string(),
                image_url: image_url
                    .filter(|url| !url.is_empty())
                    .map(str::to_string),
            })
            .await
    }

    /// The feed is not scoped to the user, so only posting is affected.
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub async fn unmount(self) {
        self.live.unmount().await;
    }
}

pub fn use_posts<B: Backend>(
    backend: Arc<B>,
    identity: Option<Identity>,
    options: SyncOptions,
) -> PostsHook<B> {
    PostsHook {
        live: LiveQuery::mount(backend.clone(), Some(posts_query()), options),
        issuer: MutationIssuer::new(backend, Resource::Posts),
        identity,
    }
}
