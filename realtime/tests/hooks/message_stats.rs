use jiff::Span;
use jiff::tz::TimeZone;
use payloads::{ChannelId, Resource};
use realtime::hooks::use_message_stats;
use realtime::{Backend, MutationOutcome};
use serde_json::json;
use test_helpers::mock::DevDataset;
use test_helpers::{alice, bob, memory_backend};

use crate::{settled, wait_for, wait_for_channel, yield_a_while};

#[tokio::test]
async fn counts_only_own_messages_since_midnight() -> anyhow::Result<()> {
    let backend = memory_backend();
    let dataset = DevDataset::create(&backend)?;
    let today = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let hook = use_message_stats(
        backend.clone(),
        Some(alice()),
        today,
        Default::default(),
    );
    let mut reader = hook.reader();
    // one of Alice's two messages was sent yesterday
    assert_eq!(settled(&mut reader).await?.data, 1);
    wait_for_channel(&backend, Resource::ChannelMessages).await?;

    backend
        .insert(
            Resource::ChannelMessages,
            json!({
                "channel_id": dataset.general_channel,
                "user_id": bob().id,
                "content": "Not Alice",
            }),
        )
        .await?;
    let outcome = hook
        .send_message(ChannelId(dataset.general_channel), "Hi all")
        .await?;
    assert_eq!(outcome, MutationOutcome::Inserted);

    wait_for(&mut reader, |state| state.data == 2).await?;
    yield_a_while().await;
    assert_eq!(hook.messages_today(), 2);
    // only Alice's own message caused a recount
    assert_eq!(backend.stats().counts, 2);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn message_sent_during_first_count_is_not_lost() -> anyhow::Result<()> {
    let backend = memory_backend();
    let dataset = DevDataset::create(&backend)?;
    let today = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let first_count = backend.stall_next_read();
    let hook = use_message_stats(
        backend.clone(),
        Some(alice()),
        today,
        Default::default(),
    );
    let mut reader = hook.reader();
    backend.wait_for_pending_reads(1).await;
    wait_for_channel(&backend, Resource::ChannelMessages).await?;

    hook.send_message(ChannelId(dataset.general_channel), "Still counting")
        .await?;
    wait_for(&mut reader, |state| state.data == 2).await?;

    // answers with the single message sent before it was issued
    first_count.release();
    let state = settled(&mut reader).await?;
    yield_a_while().await;
    assert_eq!(state.data, 2);
    assert_eq!(hook.messages_today(), 2);
    assert_eq!(backend.stats().counts, 2);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn a_new_day_starts_from_zero() -> anyhow::Result<()> {
    let backend = memory_backend();
    let dataset = DevDataset::create(&backend)?;

    backend.time_source().advance(Span::new().hours(24));
    let tomorrow = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let hook = use_message_stats(
        backend.clone(),
        Some(alice()),
        tomorrow,
        Default::default(),
    );
    let mut reader = hook.reader();
    assert_eq!(settled(&mut reader).await?.data, 0);
    wait_for_channel(&backend, Resource::ChannelMessages).await?;

    hook.send_message(ChannelId(dataset.general_channel), "Good morning")
        .await?;
    assert_eq!(wait_for(&mut reader, |state| state.data == 1).await?.data, 1);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn changing_identity_rescopes_the_count() -> anyhow::Result<()> {
    let backend = memory_backend();
    let dataset = DevDataset::create(&backend)?;
    let today = backend.time_source().start_of_day(&TimeZone::UTC)?;

    let mut hook = use_message_stats(
        backend.clone(),
        Some(alice()),
        today,
        Default::default(),
    );
    assert_eq!(settled(&mut hook.reader()).await?.data, 1);
    wait_for_channel(&backend, Resource::ChannelMessages).await?;

    hook.set_identity(None).await;
    let state = hook.state();
    assert_eq!(state.data, 0);
    assert!(!state.loading);
    assert_eq!(backend.stats().open_channels(), 0);

    let calls = backend.stats().calls();
    let outcome = hook
        .send_message(ChannelId(dataset.general_channel), "Signed out")
        .await?;
    assert_eq!(outcome, MutationOutcome::Unauthenticated);
    assert_eq!(backend.stats().calls(), calls);

    hook.set_identity(Some(bob())).await;
    assert_eq!(settled(&mut hook.reader()).await?.data, 1);
    wait_for_channel(&backend, Resource::ChannelMessages).await?;
    assert_eq!(backend.stats().peak_open_channels, 1);

    hook.unmount().await;
    assert_eq!(backend.stats().open_channels(), 0);
    assert_eq!(backend.stats().unknown_closes, 0);
    Ok(())
}
