use payloads::{Identity, UserId};

use crate::backend::Backend;
use crate::telemetry::log_error;

/// Who is signed in, as far as the hooks know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(Identity),
}

impl Session {
    /// Ask the backend for the current identity. A failed lookup is logged
    /// and treated like being signed out.
    pub async fn resolve<B: Backend>(backend: &B) -> Session {
        match backend.current_user().await {
            Ok(Some(identity)) => Session::SignedIn(identity),
            Ok(None) => Session::SignedOut,
            Err(e) => {
                log_error(
                    anyhow::Error::from(e)
                        .context("Failed to resolve the current identity"),
                );
                Session::SignedOut
            }
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::SignedIn(identity) => Some(identity),
            Session::SignedOut | Session::Unknown => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity().map(|identity| identity.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }
}
