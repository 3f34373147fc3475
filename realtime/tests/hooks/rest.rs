//! The hooks against the HTTP stub, through the production backend.

use payloads::{ProfileStats, Resource};
use realtime::hooks::{use_notifications, use_posts, use_profile_stats};
use realtime::{Backend, MutationOutcome, Session};
use serde_json::json;
use std::sync::Arc;
use test_helpers::mock::DevDataset;
use test_helpers::{alice, bob, spawn_app};

use crate::{settled, wait_for, wait_for_channel};

#[tokio::test]
async fn session_resolves_from_the_access_token() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let signed_in = Session::resolve(&app.rest_backend(Some(&alice()))).await;
    assert_eq!(signed_in, Session::SignedIn(alice()));
    assert_eq!(signed_in.user_id(), Some(alice().id));

    let anonymous = Session::resolve(&app.rest_backend(None)).await;
    assert_eq!(anonymous, Session::SignedOut);
    assert!(!anonymous.is_authenticated());

    let backend = app.rest_backend(Some(&bob()));
    app.sessions.sign_out(&bob().id.to_string());
    assert_eq!(Session::resolve(&backend).await, Session::SignedOut);
    Ok(())
}

#[tokio::test]
async fn notifications_stream_over_http() -> anyhow::Result<()> {
    let app = spawn_app().await;
    DevDataset::create(&app.backend)?;
    let backend = Arc::new(app.rest_backend(Some(&alice())));

    let hook = use_notifications(backend, Some(&alice()), Default::default());
    let mut reader = hook.reader();
    let state = settled(&mut reader).await?;
    assert_eq!(state.data.len(), 2);
    assert_eq!(state.data[0].title, "Bob mentioned you in #general");

    wait_for_channel(&app.backend, Resource::Notifications).await?;
    app.backend
        .insert(
            Resource::Notifications,
            json!({
                "user_id": alice().id,
                "kind": "system",
                "title": "Welcome back",
            }),
        )
        .await?;

    let state = wait_for(&mut reader, |state| state.data.len() == 3).await?;
    assert_eq!(state.data[0].title, "Welcome back");

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn posting_over_http_comes_back_on_the_feed() -> anyhow::Result<()> {
    let app = spawn_app().await;
    DevDataset::create(&app.backend)?;
    let backend = Arc::new(app.rest_backend(Some(&alice())));

    let hook = use_posts(backend, Some(alice()), Default::default());
    let mut reader = hook.reader();
    let state = settled(&mut reader).await?;
    assert_eq!(state.data.len(), 3);
    assert_eq!(state.data[0].comment_count(), 1);
    wait_for_channel(&app.backend, Resource::Posts).await?;

    let outcome = hook
        .create_post("Posted through the stub", Some("https://img"))
        .await?;
    assert_eq!(outcome, MutationOutcome::Inserted);

    let state = wait_for(&mut reader, |state| state.data.len() == 4).await?;
    assert_eq!(state.data[0].content, "Posted through the stub");
    assert_eq!(state.data[0].image_url.as_deref(), Some("https://img"));
    assert_eq!(app.backend.rows(Resource::Posts).len(), 4);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn counts_use_the_content_range_header() -> anyhow::Result<()> {
    let app = spawn_app().await;
    DevDataset::create(&app.backend)?;
    let backend = Arc::new(app.rest_backend(Some(&alice())));

    let hook = use_profile_stats(backend, Some(&alice()), Default::default());
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
    assert_eq!(app.backend.stats().counts, 4);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn backend_errors_surface_on_mutations() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let backend = Arc::new(app.rest_backend(Some(&alice())));
    let hook = use_posts(backend, Some(alice()), Default::default());
    settled(&mut hook.reader()).await?;

    app.backend.fail_next_writes(1);
    let result = hook.create_post("Rejected", None).await;

    assert!(result.is_err());
    assert!(app.backend.rows(Resource::Posts).is_empty());

    hook.unmount().await;
    Ok(())
}
