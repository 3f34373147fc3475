//! One hook per view of the collaboration suite. Each is a thin
//! configuration of [`LiveQuery`](crate::LiveQuery): what to read, which
//! channel to watch, and how events are applied.

pub mod use_activities;
pub mod use_dashboard;
pub mod use_message_stats;
pub mod use_notifications;
pub mod use_posts;
pub mod use_profile_stats;
pub mod use_teams;

pub use use_activities::{ActivitiesHook, activities_query, use_activities};
pub use use_dashboard::{Dashboard, use_dashboard};
pub use use_message_stats::{
    MessageStatsHook, messages_today_query, use_message_stats,
};
pub use use_notifications::{
    NotificationsHook, notifications_query, use_notifications,
};
pub use use_posts::{PostsHook, posts_query, use_posts};
pub use use_profile_stats::{
    ProfileStatsHook, ProfileStatsQuery, use_profile_stats,
};
pub use use_teams::{TeamsHook, TeamsQuery, use_teams};
