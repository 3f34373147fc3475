use jiff::tz::TimeZone;
use payloads::{ProfileStats, Resource};
use realtime::Backend;
use realtime::hooks::{use_dashboard, use_profile_stats};
use serde_json::json;
use test_helpers::mock::DevDataset;
use test_helpers::{alice, memory_backend};

use crate::{settled, wait_for, wait_for_channel, yield_a_while};

#[tokio::test]
async fn profile_stats_are_counted_once() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook =
        use_profile_stats(backend.clone(), Some(&alice()), Default::default());
    let state = settled(&mut hook.reader()).await?;

    assert_eq!(
        state.data,
        ProfileStats {
            teams_joined: 2,
            notes_created: 1,
            posts_created: 1,
            ai_conversations: 1,
        }
    );
    yield_a_while().await;
    let stats = backend.stats();
    assert_eq!(stats.counts, 4);
    assert_eq!(stats.channels_opened, 0);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn dashboard_mounts_and_unmounts_together() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;
    let today = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let dashboard =
        use_dashboard(backend.clone(), Some(alice()), today, Default::default());
    assert!(dashboard.is_loading());

    let teams = settled(&mut dashboard.teams.reader()).await?;
    let mut activities_reader = dashboard.activities.reader();
    let activities = settled(&mut activities_reader).await?;
    let messages = settled(&mut dashboard.messages.reader()).await?;
    assert!(!dashboard.is_loading());

    assert_eq!(teams.data.user_teams.len(), 2);
    assert_eq!(activities.data.len(), 3);
    assert_eq!(activities.data[0].description, "Posted in #general");
    assert_eq!(messages.data, 1);

    for resource in [
        Resource::TeamMembers,
        Resource::Activities,
        Resource::ChannelMessages,
    ] {
        wait_for_channel(&backend, resource).await?;
    }
    assert_eq!(backend.stats().open_channels(), 3);

    backend
        .insert(
            Resource::Activities,
            json!({
                "user_id": alice().id,
                "type": "post",
                "description": "Shared a post",
            }),
        )
        .await?;
    let activities =
        wait_for(&mut activities_reader, |state| state.data.len() == 4)
            .await?;
    assert_eq!(activities.data[0].description, "Shared a post");

    dashboard.unmount().await;
    let stats = backend.stats();
    assert_eq!(stats.open_channels(), 0);
    assert_eq!(stats.channels_closed, 3);
    assert_eq!(stats.unknown_closes, 0);
    Ok(())
}

#[tokio::test]
async fn signing_out_empties_the_dashboard() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;
    let today = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let mut dashboard =
        use_dashboard(backend.clone(), Some(alice()), today, Default::default());
    settled(&mut dashboard.activities.reader()).await?;

    dashboard.set_identity(None).await;

    assert!(!dashboard.is_loading());
    assert!(dashboard.teams.state().data.user_teams.is_empty());
    assert!(dashboard.activities.state().data.is_empty());
    assert_eq!(dashboard.messages.messages_today(), 0);
    assert_eq!(backend.stats().open_channels(), 0);

    dashboard.unmount().await;
    assert_eq!(backend.stats().unknown_closes, 0);
    Ok(())
}
