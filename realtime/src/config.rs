use anyhow::{Context, bail};
use secrecy::SecretString;

use crate::live_query::SyncOptions;
use crate::subscriber::SyncPolicy;
use crate::view_state::LoadingPolicy;

pub struct Config {
    /// Base address of the managed backend, e.g. "http://127.0.0.1:54321"
    pub backend_url: String,
    /// Public API key sent with every request
    pub api_key: SecretString,
    /// Access token of a signed-in user. Without it every hook that needs
    /// an identity stays empty.
    pub access_token: Option<SecretString>,
    /// "auto" leaves the choice to each hook
    pub sync_policy: Option<SyncPolicy>,
    pub loading_policy: LoadingPolicy,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let sync_policy = parse_sync_policy(
            var("SYNC_POLICY").as_deref().unwrap_or("auto"),
        )
        .context("Invalid SYNC_POLICY")?;
        let loading_policy = parse_loading_policy(
            var("LOADING_POLICY").as_deref().unwrap_or("initial"),
        )
        .context("Invalid LOADING_POLICY")?;

        Ok(Config {
            backend_url: var("BACKEND_URL").context("BACKEND_URL is not set")?,
            api_key: var("BACKEND_API_KEY")
                .context("BACKEND_API_KEY is not set")?
                .into(),
            access_token: var("BACKEND_ACCESS_TOKEN")
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
            sync_policy,
            loading_policy,
            log_filter: var("LOG_FILTER").unwrap_or_else(|| "info".into()),
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            policy: self.sync_policy,
            loading: self.loading_policy,
        }
    }
}

fn parse_sync_policy(value: &str) -> anyhow::Result<Option<SyncPolicy>> {
    Ok(match value.trim() {
        "auto" => None,
        "refetch" => Some(SyncPolicy::RefetchAll),
        "patch" => Some(SyncPolicy::PatchFromPayload),
        other => bail!("expected auto, refetch or patch, got '{other}'"),
    })
}

fn parse_loading_policy(value: &str) -> anyhow::Result<LoadingPolicy> {
    Ok(match value.trim() {
        "initial" => LoadingPolicy::InitialOnly,
        "every" => LoadingPolicy::EveryFetch,
        other => bail!("expected initial or every, got '{other}'"),
    })
}
