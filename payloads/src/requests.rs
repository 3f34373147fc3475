use serde::{Deserialize, Serialize};

use crate::{ChannelId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: UserId,
    pub content: String,
    /// Serialized as null when absent.
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChannelMessage {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub content: String,
}
