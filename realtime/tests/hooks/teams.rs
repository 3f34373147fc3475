use payloads::Resource;
use realtime::Backend;
use realtime::hooks::use_teams;
use serde_json::{Value, json};
use test_helpers::mock::DevDataset;
use test_helpers::{alice, memory_backend};

use crate::{settled, wait_for, wait_for_channel};

fn names(teams: &[payloads::Team]) -> Vec<&str> {
    teams.iter().map(|team| team.name.as_str()).collect()
}

#[tokio::test]
async fn recent_teams_and_own_memberships() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook = use_teams(backend.clone(), Some(&alice()), Default::default());
    let mut reader = hook.reader();
    let state = settled(&mut reader).await?;

    assert_eq!(names(&state.data.teams), ["Research", "Platform", "Design"]);
    let mut own = names(&state.data.user_teams);
    own.sort();
    assert_eq!(own, ["Design", "Platform"]);

    // joining a team is reflected after the refetch the event triggers
    wait_for_channel(&backend, Resource::TeamMembers).await?;
    let research = backend
        .rows(Resource::Teams)
        .into_iter()
        .find(|team| team["name"] == "Research")
        .and_then(|team| team.get("id").cloned())
        .unwrap_or(Value::Null);
    backend
        .insert(
            Resource::TeamMembers,
            json!({ "team_id": research, "user_id": alice().id }),
        )
        .await?;

    let state = wait_for(&mut reader, |state| {
        state.data.user_teams.len() == 3 && !state.is_busy()
    })
    .await?;
    assert_eq!(state.data.teams.len(), 3);
    assert_eq!(backend.stats().selects, 4);

    hook.unmount().await;
    Ok(())
}

#[tokio::test]
async fn teams_stay_empty_when_signed_out() -> anyhow::Result<()> {
    let backend = memory_backend();
    DevDataset::create(&backend)?;

    let hook = use_teams(backend.clone(), None, Default::default());
    let state = hook.state();

    assert!(!state.loading);
    assert!(state.data.teams.is_empty());
    assert!(state.data.user_teams.is_empty());
    assert_eq!(backend.stats().calls(), 0);

    hook.unmount().await;
    Ok(())
}
