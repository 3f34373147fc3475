use payloads::Resource;
use realtime::hooks::use_notifications;
use realtime::{Backend, SyncOptions, SyncPolicy};
use serde_json::json;
use test_helpers::{alice, bob, memory_backend};

use crate::{settled, wait_for, wait_for_channel, yield_a_while};

#[tokio::test]
async fn empty_mount_then_insert_under_both_policies() -> anyhow::Result<()> {
    for policy in [SyncPolicy::RefetchAll, SyncPolicy::PatchFromPayload] {
        let backend = memory_backend();
        let options = SyncOptions {
            policy: Some(policy),
            ..Default::default()
        };
        let hook = use_notifications(backend.clone(), Some(&alice()), options);
        let mut reader = hook.reader();

        let initial = reader.current();
        assert!(initial.loading);
        assert!(initial.data.is_empty());

        let state = settled(&mut reader).await?;
        assert!(!state.loading);
        assert!(state.data.is_empty());

        wait_for_channel(&backend, Resource::Notifications).await?;
        backend
            .insert(
                Resource::Notifications,
                json!({
                    "user_id": alice().id,
                    "kind": "mention",
                    "title": "You were mentioned",
                    "body": null,
                }),
            )
            .await?;

        let state = wait_for(&mut reader, |state| {
            state.data.len() == 1 && !state.is_busy()
        })
        .await?;
        assert_eq!(state.data[0].title, "You were mentioned");
        assert_eq!(state.data[0].user_id, alice().id);

        let expected_selects = match policy {
            SyncPolicy::RefetchAll => 2,
            SyncPolicy::PatchFromPayload => 1,
        };
        assert_eq!(backend.stats().selects, expected_selects);

        hook.unmount().await;
    }
    Ok(())
}

#[tokio::test]
async fn notifications_of_other_users_are_not_shown() -> anyhow::Result<()> {
    let backend = memory_backend();
    let hook =
        use_notifications(backend.clone(), Some(&alice()), Default::default());
    let mut reader = hook.reader();
    settled(&mut reader).await?;
    wait_for_channel(&backend, Resource::Notifications).await?;

    for (user_id, title) in [(bob().id, "For Bob"), (alice().id, "For Alice")] {
        backend
            .insert(
                Resource::Notifications,
                json!({ "user_id": user_id, "kind": "system", "title": title }),
            )
            .await?;
    }

    let state = wait_for(&mut reader, |state| !state.data.is_empty()).await?;
    yield_a_while().await;
    assert_eq!(hook.state().data, state.data);
    assert_eq!(state.data.len(), 1);
    assert_eq!(state.data[0].title, "For Alice");
    // both events were applied from their payloads
    assert_eq!(backend.stats().selects, 1);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn no_identity_means_no_fetch_and_no_channel() -> anyhow::Result<()> {
    let backend = memory_backend();
    let hook = use_notifications(backend.clone(), None, Default::default());

    let state = hook.state();
    assert!(!state.loading);
    assert!(state.data.is_empty());
    assert!(!hook.is_mounted());

    yield_a_while().await;
    assert_eq!(backend.stats().calls(), 0);
    assert_eq!(backend.stats().channels_opened, 0);

    hook.unmount().await;
    assert_eq!(backend.stats().channels_closed, 0);
    Ok(())
}

#[tokio::test]
async fn insert_during_first_fetch_survives_its_stale_result()
-> anyhow::Result<()> {
    let backend = memory_backend();
    let first_read = backend.stall_next_read();
    let options = SyncOptions {
        policy: Some(SyncPolicy::PatchFromPayload),
        ..Default::default()
    };
    let hook = use_notifications(backend.clone(), Some(&alice()), options);
    let mut reader = hook.reader();
    backend.wait_for_pending_reads(1).await;
    wait_for_channel(&backend, Resource::Notifications).await?;

    backend
        .insert(
            Resource::Notifications,
            json!({ "user_id": alice().id, "kind": "system", "title": "New" }),
        )
        .await?;
    wait_for(&mut reader, |state| state.data.len() == 1).await?;

    // answers with the empty table it saw when issued
    first_read.release();
    let state = settled(&mut reader).await?;
    yield_a_while().await;
    assert_eq!(hook.state(), state);
    assert_eq!(state.data.len(), 1);
    assert_eq!(state.data[0].title, "New");
    assert!(!state.loading);
    assert_eq!(backend.stats().selects, 2);

    hook.unmount().await;
    Ok(())
}
