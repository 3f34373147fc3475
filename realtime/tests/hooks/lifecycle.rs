//! Channel accounting and teardown of hook instances.

use payloads::{EventFilter, Resource};
use realtime::hooks::{TeamsQuery, use_notifications, use_posts, use_teams};
use realtime::{Channel, LoadingPolicy, SubscriptionHandle, SyncOptions};
use test_helpers::mock::DevDataset;
use test_helpers::{alice, bob, memory_backend};

use crate::{settled, wait_for_channel, yield_a_while};

#[tokio::test]
async fn unmount_closes_the_channel_exactly_once() -> anyhow::Result<()> {
    let backend = memory_backend();
    let hook =
        use_notifications(backend.clone(), Some(&alice()), Default::default());
    settled(&mut hook.reader()).await?;
    wait_for_channel(&backend, Resource::Notifications).await?;

    hook.unmount().await;

    let stats = backend.stats();
    assert_eq!(stats.channels_opened, 1);
    assert_eq!(stats.channels_closed, 1);
    assert_eq!(stats.unknown_closes, 0);
    assert_eq!(stats.open_channels(), 0);
    Ok(())
}

#[tokio::test]
async fn handles_close_once_whether_closed_or_dropped() -> anyhow::Result<()> {
    let backend = memory_backend();
    let channel = Channel {
        resource: Resource::Posts,
        events: EventFilter::Insert,
    };

    let closed = SubscriptionHandle::open(backend.clone(), channel).await?;
    let dropped = SubscriptionHandle::open(backend.clone(), channel).await?;
    assert_ne!(closed.id(), dropped.id());
    assert_eq!(backend.open_channels(Resource::Posts), 2);

    closed.close();
    drop(dropped);

    let stats = backend.stats();
    assert_eq!(stats.channels_closed, 2);
    assert_eq!(stats.unknown_closes, 0);
    assert_eq!(stats.peak_open_channels, 2);
    Ok(())
}

#[tokio::test]
async fn remount_never_holds_two_channels() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let mut hook = use_teams(backend.clone(), Some(&alice()), Default::default());
    settled(&mut hook.reader()).await?;
    wait_for_channel(&backend, Resource::TeamMembers).await?;

    hook.remount(Some(TeamsQuery::new(bob().id))).await;
    let state = settled(&mut hook.reader()).await?;
    wait_for_channel(&backend, Resource::TeamMembers).await?;
    assert_eq!(state.data.user_teams.len(), 1);
    assert_eq!(state.data.user_teams[0].name, "Platform");

    let stats = backend.stats();
    assert_eq!(stats.peak_open_channels, 1);
    assert_eq!(stats.channels_opened, 2);
    assert_eq!(stats.channels_closed, 1);

    hook.unmount().await;
    let stats = backend.stats();
    assert_eq!(stats.channels_closed, 2);
    assert_eq!(stats.unknown_closes, 0);
    Ok(())
}

#[tokio::test]
async fn unmount_during_first_fetch_discards_the_result() -> anyhow::Result<()>
{
    let backend = memory_backend();
    DevDataset::create(&backend)?;
    let gate = backend.gate_next_read();

    let hook =
        use_notifications(backend.clone(), Some(&alice()), Default::default());
    let mut reader = hook.reader();
    backend.wait_for_pending_reads(1).await;

    hook.unmount().await;
    gate.release();
    yield_a_while().await;

    // the read completed but nothing was written
    assert_eq!(backend.stats().selects, 1);
    let state = reader.current();
    assert!(state.loading);
    assert!(state.data.is_empty());
    assert_eq!(backend.stats().open_channels(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_subscribe_keeps_the_fetched_data() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;
    backend.fail_next_subscribes(1);

    let hook =
        use_notifications(backend.clone(), Some(&alice()), Default::default());
    let state = settled(&mut hook.reader()).await?;
    yield_a_while().await;

    assert_eq!(state.data.len(), 2);
    assert_eq!(hook.state(), state);
    assert_eq!(backend.stats().channels_opened, 0);

    hook.unmount().await;
    assert_eq!(backend.stats().channels_closed, 0);
    assert_eq!(backend.stats().unknown_closes, 0);
    Ok(())
}

#[tokio::test]
async fn refetch_without_writes_is_idempotent() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook = use_posts(backend.clone(), None, Default::default());
    let first = settled(&mut hook.reader()).await?;

    assert!(hook.live().refetch().await);
    let second = hook.state();
    assert_eq!(first.data, second.data);
    assert!(!second.is_busy());

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn later_fetches_raise_refreshing_by_default() -> anyhow::Result<()> {
    let cases = [
        (LoadingPolicy::InitialOnly, false, true),
        (LoadingPolicy::EveryFetch, true, false),
    ];
    for (loading_policy, loading, refreshing) in cases {
        let backend = memory_backend();
        DevDataset::create(&backend)?;
        let options = SyncOptions {
            loading: loading_policy,
            ..Default::default()
        };
        let hook = use_notifications(backend.clone(), Some(&alice()), options);
        settled(&mut hook.reader()).await?;

        let gate = backend.gate_next_read();
        let (written, during) = tokio::join!(hook.refetch(), async {
            backend.wait_for_pending_reads(1).await;
            let during = hook.state();
            gate.release();
            during
        });

        assert!(written);
        assert_eq!(during.loading, loading, "{loading_policy:?}");
        assert_eq!(during.refreshing, refreshing, "{loading_policy:?}");
        assert_eq!(during.data.len(), 2);
        assert!(!hook.state().is_busy());

        hook.unmount().await;
    }
    Ok(())
}
