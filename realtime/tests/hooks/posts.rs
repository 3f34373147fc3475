use payloads::Resource;
use realtime::hooks::use_posts;
use realtime::{Backend, MutationOutcome};
use serde_json::json;
use test_helpers::mock::DevDataset;
use test_helpers::{alice, memory_backend};

use crate::{settled, wait_for, wait_for_channel, yield_a_while};

#[tokio::test]
async fn failed_first_fetch_settles_empty() -> anyhow::Result<()> {
    let backend = memory_backend();
    backend.fail_next_reads(1);

    let hook = use_posts(backend.clone(), None, Default::default());
    let mut reader = hook.reader();
    assert!(reader.current().loading);

    let state = settled(&mut reader).await?;
    assert!(!state.loading);
    assert!(state.data.is_empty());
    assert_eq!(backend.stats().selects, 1);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn feed_embeds_authors_likes_and_comments() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook = use_posts(backend.clone(), Some(alice()), Default::default());
    let state = settled(&mut hook.reader()).await?;

    assert_eq!(state.data.len(), 3);
    let newest = &state.data[0];
    assert_eq!(newest.content, "Looking for feedback on the design kit");
    assert_eq!(
        newest.profiles.as_ref().map(|author| author.username.as_str()),
        Some("alice")
    );
    assert_eq!(newest.like_count(), 1);
    assert_eq!(newest.comment_count(), 1);
    assert_eq!(state.data[2].like_count(), 2);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn created_post_arrives_through_refetch() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook = use_posts(backend.clone(), Some(alice()), Default::default());
    let mut reader = hook.reader();
    settled(&mut reader).await?;
    wait_for_channel(&backend, Resource::Posts).await?;

    let outcome = hook.create_post("Hello from the hooks", Some("")).await?;
    assert_eq!(outcome, MutationOutcome::Inserted);

    // the mutation leaves the state alone until the event comes back
    let state = wait_for(&mut reader, |state| {
        state.data.len() == 4 && !state.is_busy()
    })
    .await?;
    let post = &state.data[0];
    assert_eq!(post.content, "Hello from the hooks");
    assert_eq!(post.user_id, alice().id);
    assert_eq!(post.image_url, None);
    assert_eq!(post.profiles.as_ref().map(|a| a.name()), Some("Alice Liddell"));
    assert_eq!(backend.stats().inserts, 1);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn unauthenticated_post_never_reaches_the_backend() -> anyhow::Result<()>
{
    let backend = memory_backend();
    let hook = use_posts(backend.clone(), None, Default::default());
    settled(&mut hook.reader()).await?;

    let calls = backend.stats().calls();
    let outcome = hook.create_post("Anyone there?", None).await?;

    assert_eq!(outcome, MutationOutcome::Unauthenticated);
    assert_eq!(backend.stats().calls(), calls);
    assert!(backend.rows(Resource::Posts).is_empty());

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn failed_insert_is_returned_to_the_caller() -> anyhow::Result<()> {
    let backend = memory_backend();
    let hook = use_posts(backend.clone(), Some(alice()), Default::default());
    settled(&mut hook.reader()).await?;

    backend.fail_next_writes(1);
    let result = hook.create_post("Will not make it", None).await;

    assert!(result.is_err());
    assert!(backend.rows(Resource::Posts).is_empty());
    assert!(hook.state().data.is_empty());

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn overlapping_refetches_end_with_the_full_set() -> anyhow::Result<()> {
    let backend = memory_backend();
    let hook = use_posts(backend.clone(), Some(alice()), Default::default());
    let mut reader = hook.reader();
    settled(&mut reader).await?;
    wait_for_channel(&backend, Resource::Posts).await?;

    // each refetch answers with the rows present when it was issued
    let mut stalls = Vec::new();
    for (pending, content) in [(1, "First"), (2, "Second")] {
        stalls.push(backend.stall_next_read());
        backend
            .insert(
                Resource::Posts,
                json!({ "user_id": alice().id, "content": content }),
            )
            .await?;
        backend.wait_for_pending_reads(pending).await;
    }
    assert!(reader.current().refreshing);

    let (older, newer) = (stalls.remove(0), stalls.remove(0));
    newer.release();
    wait_for(&mut reader, |state| state.data.len() == 2).await?;
    older.release();

    let state = settled(&mut reader).await?;
    yield_a_while().await;
    assert_eq!(hook.state(), state);
    let backing = backend.rows(Resource::Posts);
    assert_eq!(state.data.len(), backing.len());
    assert_eq!(state.data.len(), 2);
    assert_eq!(backend.stats().selects, 3);

    hook.unmount().await;
    Ok(())
}
